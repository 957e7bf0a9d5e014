//! Builtin black-box models for the co-simulation loop.
//!
//! These stand in for packaged models when no model runtime is available and
//! are the models the demos and end to end tests couple to each other.

pub mod loader;
pub mod models;

pub use loader::BuiltinModels;
