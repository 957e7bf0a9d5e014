//! The instantiated model package contract.

use crate::clock::{FloatValue, Time};
use crate::errors::{CosimError, CosimResult};
use crate::field::ValueReference;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Model interface generation of an instance.
///
/// The generation decides how start values are applied and whether the
/// model state can be captured and replayed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelGeneration {
    #[serde(rename = "1.0")]
    Fmi1,
    #[serde(rename = "2.0")]
    Fmi2,
    #[serde(rename = "3.0")]
    Fmi3,
}

impl ModelGeneration {
    pub fn version(&self) -> &'static str {
        match self {
            ModelGeneration::Fmi1 => "1.0",
            ModelGeneration::Fmi2 => "2.0",
            ModelGeneration::Fmi3 => "3.0",
        }
    }

    /// Whether start values are applied between entering and exiting
    /// initialization mode.
    pub const fn has_initialization_mode(&self) -> bool {
        !matches!(self, ModelGeneration::Fmi1)
    }

    /// Whether the generation defines state capture and replay.
    pub const fn supports_state_replay(&self) -> bool {
        !matches!(self, ModelGeneration::Fmi1)
    }
}

impl fmt::Display for ModelGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FMI {}", self.version())
    }
}

/// A named model variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVariable {
    pub name: String,
    pub value_reference: ValueReference,
}

impl ModelVariable {
    pub fn new(name: impl Into<String>, value_reference: ValueReference) -> Self {
        Self {
            name: name.into(),
            value_reference,
        }
    }
}

/// Static information about a model, known before it is stepped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescription {
    pub model_name: String,
    pub generation: ModelGeneration,
    /// Whether the model implements state capture and replay.
    pub can_get_and_set_state: bool,
    pub variables: Vec<ModelVariable>,
}

impl ModelDescription {
    pub fn value_reference(&self, name: &str) -> Option<ValueReference> {
        self.variables
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| variable.value_reference)
    }
}

/// An instantiated, ready to initialize model.
///
/// Implementations are black boxes. Failures are reported through
/// [`CosimError`]; an error from [`ModelInstance::do_step`] is treated as a
/// rejected or diverged step.
pub trait ModelInstance: fmt::Debug {
    fn description(&self) -> &ModelDescription;

    fn enter_initialization_mode(&mut self) -> CosimResult<()> {
        Ok(())
    }

    fn exit_initialization_mode(&mut self) -> CosimResult<()> {
        Ok(())
    }

    fn set_real(
        &mut self,
        references: &[ValueReference],
        values: &[FloatValue],
    ) -> CosimResult<()>;

    fn get_real(&self, references: &[ValueReference]) -> CosimResult<Vec<FloatValue>>;

    /// Advance the model from `t` by exactly `dt`.
    fn do_step(&mut self, t: Time, dt: Time) -> CosimResult<()>;

    /// Capture the full internal state.
    fn get_state(&mut self) -> CosimResult<Box<dyn Any>> {
        Err(CosimError::ModelAccess(format!(
            "model '{}' cannot capture its state",
            self.description().model_name
        )))
    }

    /// Replace the internal state with one produced by [`ModelInstance::get_state`].
    fn set_state(&mut self, _state: &dyn Any) -> CosimResult<()> {
        Err(CosimError::ModelAccess(format!(
            "model '{}' cannot restore its state",
            self.description().model_name
        )))
    }

    /// Terminate the instance and release everything it holds.
    fn terminate(&mut self) -> CosimResult<()> {
        Ok(())
    }
}
