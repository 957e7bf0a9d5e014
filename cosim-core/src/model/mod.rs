//! The black-box model being co-simulated.
//!
//! A [`ModelInstance`] is the narrow contract an instantiated model package
//! provides: value access by reference, a single step and optional state
//! capture.
//! A [`ModelAdapter`] wraps an instance for the loop. It owns the fixed input
//! and output channel mappings and hides which model interface generation the
//! instance implements.
//! The generation specific variant is chosen once by [`instantiate_adapter`].

mod adapter;
mod generations;
mod instance;
mod loader;
mod start_values;

// Public re-exports
pub use adapter::ModelAdapter;
pub use generations::{instantiate_adapter, Fmi1, Fmi2, Fmi3, FmuAdapter, Generation};
pub use instance::{ModelDescription, ModelGeneration, ModelInstance, ModelVariable};
pub use loader::ModelPackageLoader;
pub use start_values::StartValues;
