use cosim_core::clock::{FloatValue, Time};
use cosim_core::errors::{CosimError, CosimResult};
use cosim_core::field::ValueReference;
use cosim_core::model::{ModelDescription, ModelGeneration, ModelInstance, ModelVariable};
use serde::{Deserialize, Serialize};
use std::any::Any;

const VR_TIME: ValueReference = 0;
const VR_READ_DATA: ValueReference = 1;
const VR_WRITE_DATA: ValueReference = 2;
const VR_INCREMENT: ValueReference = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncrementParameters {
    /// Added to the input on every step
    pub increment: FloatValue,
}

impl Default for IncrementParameters {
    fn default() -> Self {
        Self { increment: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct IncrementState {
    time: Time,
    read_data: FloatValue,
    write_data: FloatValue,
    increment: FloatValue,
}

/// Stateless feed-through model: every step sets `write_data = read_data + increment`.
///
/// Variables: `time`, `read_data`, `write_data` and `increment`.
/// Two of these coupled to each other count up by the increment each window,
/// which makes the exchange easy to follow in a result file.
#[derive(Debug)]
pub struct IncrementModel {
    description: ModelDescription,
    state: IncrementState,
}

impl IncrementModel {
    pub fn from_parameters(parameters: IncrementParameters) -> Self {
        let variables = vec![
            ModelVariable::new("time", VR_TIME),
            ModelVariable::new("read_data", VR_READ_DATA),
            ModelVariable::new("write_data", VR_WRITE_DATA),
            ModelVariable::new("increment", VR_INCREMENT),
        ];
        Self {
            description: ModelDescription {
                model_name: "Increment".to_string(),
                generation: ModelGeneration::Fmi3,
                can_get_and_set_state: true,
                variables,
            },
            state: IncrementState {
                time: 0.0,
                read_data: 0.0,
                write_data: 0.0,
                increment: parameters.increment,
            },
        }
    }
}

impl Default for IncrementModel {
    fn default() -> Self {
        Self::from_parameters(IncrementParameters::default())
    }
}

impl ModelInstance for IncrementModel {
    fn description(&self) -> &ModelDescription {
        &self.description
    }

    fn set_real(
        &mut self,
        references: &[ValueReference],
        values: &[FloatValue],
    ) -> CosimResult<()> {
        if references.len() != values.len() {
            return Err(CosimError::ModelAccess(format!(
                "{} references but {} values",
                references.len(),
                values.len()
            )));
        }
        for (reference, value) in references.iter().zip(values) {
            match *reference {
                VR_READ_DATA => self.state.read_data = *value,
                VR_WRITE_DATA => self.state.write_data = *value,
                VR_INCREMENT => self.state.increment = *value,
                r => {
                    return Err(CosimError::ModelAccess(format!(
                        "variable {} of model 'Increment' cannot be set",
                        r
                    )))
                }
            }
        }
        Ok(())
    }

    fn get_real(&self, references: &[ValueReference]) -> CosimResult<Vec<FloatValue>> {
        references
            .iter()
            .map(|reference| match *reference {
                VR_TIME => Ok(self.state.time),
                VR_READ_DATA => Ok(self.state.read_data),
                VR_WRITE_DATA => Ok(self.state.write_data),
                VR_INCREMENT => Ok(self.state.increment),
                r => Err(CosimError::ModelAccess(format!(
                    "model 'Increment' has no variable {}",
                    r
                ))),
            })
            .collect()
    }

    fn do_step(&mut self, t: Time, dt: Time) -> CosimResult<()> {
        self.state.write_data = self.state.read_data + self.state.increment;
        self.state.time = t + dt;
        Ok(())
    }

    fn get_state(&mut self) -> CosimResult<Box<dyn Any>> {
        Ok(Box::new(self.state))
    }

    fn set_state(&mut self, state: &dyn Any) -> CosimResult<()> {
        self.state = *state
            .downcast_ref::<IncrementState>()
            .ok_or_else(|| CosimError::ModelAccess("foreign state token".to_string()))?;
        Ok(())
    }
}
