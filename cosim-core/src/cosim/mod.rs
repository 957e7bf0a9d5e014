//! The co-simulation loop.
//!
//! A [`CoSimulation`] couples one model with one coupling participant.
//! Every coupling window the model reads the participant's data, is stepped
//! once by the window size the participant dictates and writes its outputs
//! back. Under an implicit scheme the model state is checkpointed at the start
//! of a window and restored whenever the participant rejects the attempt, so
//! a window may be retried several times before it is committed.
//!
//! Only committed windows are recorded.

mod builder;
mod runtime;
mod session;

#[cfg(test)]
mod tests;

// Public re-exports
pub use builder::CoSimulationBuilder;
pub use runtime::{CoSimulation, RunSummary};
