use crate::checkpoint::StateToken;
use crate::clock::{FloatValue, Time};
use crate::errors::{CosimError, CosimResult};
use crate::field::{ChannelMapping, ValueReference};
use crate::model::ModelGeneration;
use std::fmt;

/// The model as seen by the co-simulation loop.
///
/// Inputs and outputs are addressed through fixed channel mappings, so the
/// loop only deals with ordered value sequences.
pub trait ModelAdapter: fmt::Debug {
    fn generation(&self) -> ModelGeneration;

    fn model_name(&self) -> &str;

    /// Look up a variable of the underlying model by name.
    fn value_reference(&self, name: &str) -> Option<ValueReference>;

    fn inputs(&self) -> &ChannelMapping;

    fn outputs(&self) -> &ChannelMapping;

    /// Assign ordered values to the input channel mapping.
    fn set_inputs(&mut self, values: &[FloatValue]) -> CosimResult<()>;

    /// Assign values to arbitrary variables, e.g. exogenous signals.
    fn set_values(
        &mut self,
        references: &[ValueReference],
        values: &[FloatValue],
    ) -> CosimResult<()>;

    fn get_values(&self, references: &[ValueReference]) -> CosimResult<Vec<FloatValue>>;

    /// Read the output channel mapping.
    fn get_outputs(&self) -> CosimResult<Vec<FloatValue>> {
        self.get_values(self.outputs().references())
    }

    /// Advance by exactly `dt` starting at `t`.
    fn step(&mut self, t: Time, dt: Time) -> CosimResult<()>;

    /// Whether the state can be captured and replayed.
    ///
    /// This is fixed once the model is instantiated.
    fn supports_state_checkpoint(&self) -> bool;

    /// Fail with a capability error explaining why the state cannot be
    /// captured, if it cannot.
    fn ensure_state_checkpoint(&self) -> CosimResult<()> {
        if self.supports_state_checkpoint() {
            Ok(())
        } else {
            Err(CosimError::Capability {
                reason: format!("model '{}' cannot reset its state", self.model_name()),
            })
        }
    }

    fn snapshot_state(&mut self) -> CosimResult<StateToken>;

    /// Restore the state captured by the most recent [`ModelAdapter::snapshot_state`].
    fn restore_state(&mut self, token: StateToken) -> CosimResult<()>;

    /// Terminate and free the model. Calling this more than once is a no-op.
    fn release(&mut self) -> CosimResult<()>;
}
