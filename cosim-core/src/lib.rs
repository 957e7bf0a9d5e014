pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod coupling;
pub mod cosim;
mod example_components;
pub mod field;
pub mod marshal;
pub mod model;
pub mod recorder;
pub mod signals;

pub mod errors;
