//! Generation specific model adapters.
//!
//! Each supported model interface generation gets a marker type implementing
//! [`Generation`]. [`FmuAdapter`] is generic over the marker and reads the
//! generation's capabilities from it, so the loop never branches on the
//! generation itself.

use crate::checkpoint::StateToken;
use crate::clock::{FloatValue, Time};
use crate::errors::{CosimError, CosimResult};
use crate::field::{ChannelMapping, ValueReference};
use crate::model::{ModelAdapter, ModelGeneration, ModelInstance, StartValues};
use log::{debug, error};
use std::fmt;
use std::marker::PhantomData;

/// Capability tag for a model interface generation.
pub trait Generation: fmt::Debug + 'static {
    const GENERATION: ModelGeneration;
}

#[derive(Debug)]
pub struct Fmi1;

#[derive(Debug)]
pub struct Fmi2;

#[derive(Debug)]
pub struct Fmi3;

impl Generation for Fmi1 {
    const GENERATION: ModelGeneration = ModelGeneration::Fmi1;
}

impl Generation for Fmi2 {
    const GENERATION: ModelGeneration = ModelGeneration::Fmi2;
}

impl Generation for Fmi3 {
    const GENERATION: ModelGeneration = ModelGeneration::Fmi3;
}

/// Adapter for a model instance of generation `G`.
pub struct FmuAdapter<G: Generation> {
    instance: Box<dyn ModelInstance>,
    inputs: ChannelMapping,
    outputs: ChannelMapping,
    /// Number of snapshots taken so far
    snapshots: u64,
    /// Serial of the snapshot that may currently be restored
    restorable: Option<u64>,
    released: bool,
    generation: PhantomData<G>,
}

impl<G: Generation> FmuAdapter<G> {
    /// Resolve the channel mappings and initialize the instance with `start_values`.
    ///
    /// Generations with an initialization mode apply the start values between
    /// entering and exiting it; older generations apply them directly.
    pub fn instantiate(
        mut instance: Box<dyn ModelInstance>,
        input_names: &[String],
        output_names: &[String],
        start_values: &StartValues,
    ) -> CosimResult<Self> {
        let description = instance.description();
        if description.generation != G::GENERATION {
            return Err(CosimError::configuration(format!(
                "Model '{}' implements {} but was loaded as {}",
                description.model_name,
                description.generation,
                G::GENERATION
            )));
        }

        let inputs = ChannelMapping::resolve(input_names, |name| description.value_reference(name))?;
        let outputs =
            ChannelMapping::resolve(output_names, |name| description.value_reference(name))?;

        if G::GENERATION.has_initialization_mode() {
            instance.enter_initialization_mode()?;
            start_values.apply(instance.as_mut())?;
            instance.exit_initialization_mode()?;
        } else {
            start_values.apply(instance.as_mut())?;
        }
        debug!(
            "Initialized {} model '{}' with {} start values",
            G::GENERATION,
            instance.description().model_name,
            start_values.iter().count()
        );

        Ok(Self {
            instance,
            inputs,
            outputs,
            snapshots: 0,
            restorable: None,
            released: false,
            generation: PhantomData,
        })
    }

    fn ensure_checkpoint_support(&self) -> CosimResult<()> {
        if !G::GENERATION.supports_state_replay() {
            return Err(CosimError::Capability {
                reason: format!(
                    "models implementing {} cannot reset their state. \
                     Please update the model to FMI 2.0 or FMI 3.0",
                    G::GENERATION
                ),
            });
        }
        if !self.instance.description().can_get_and_set_state {
            return Err(CosimError::Capability {
                reason: format!(
                    "model '{}' cannot reset its state. \
                     Please implement state capture and replay in the model \
                     and declare the capability in its description",
                    self.model_name()
                ),
            });
        }
        Ok(())
    }
}

impl<G: Generation> fmt::Debug for FmuAdapter<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmuAdapter")
            .field("generation", &G::GENERATION)
            .field("instance", &self.instance)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("released", &self.released)
            .finish()
    }
}

impl<G: Generation> ModelAdapter for FmuAdapter<G> {
    fn generation(&self) -> ModelGeneration {
        G::GENERATION
    }

    fn model_name(&self) -> &str {
        &self.instance.description().model_name
    }

    fn value_reference(&self, name: &str) -> Option<ValueReference> {
        self.instance.description().value_reference(name)
    }

    fn inputs(&self) -> &ChannelMapping {
        &self.inputs
    }

    fn outputs(&self) -> &ChannelMapping {
        &self.outputs
    }

    fn set_inputs(&mut self, values: &[FloatValue]) -> CosimResult<()> {
        if values.len() != self.inputs.len() {
            return Err(CosimError::DataShape {
                field: format!("{} inputs", self.model_name()),
                declared: self.inputs.len(),
                actual: values.len(),
            });
        }
        self.instance.set_real(self.inputs.references(), values)
    }

    fn set_values(
        &mut self,
        references: &[ValueReference],
        values: &[FloatValue],
    ) -> CosimResult<()> {
        self.instance.set_real(references, values)
    }

    fn get_values(&self, references: &[ValueReference]) -> CosimResult<Vec<FloatValue>> {
        self.instance.get_real(references)
    }

    fn step(&mut self, t: Time, dt: Time) -> CosimResult<()> {
        self.instance.do_step(t, dt).map_err(|err| match err {
            CosimError::ModelStep { .. } => err,
            other => CosimError::ModelStep {
                t,
                dt,
                reason: other.to_string(),
            },
        })
    }

    fn supports_state_checkpoint(&self) -> bool {
        self.ensure_checkpoint_support().is_ok()
    }

    fn ensure_state_checkpoint(&self) -> CosimResult<()> {
        self.ensure_checkpoint_support()
    }

    fn snapshot_state(&mut self) -> CosimResult<StateToken> {
        self.ensure_checkpoint_support()?;
        let state = self.instance.get_state()?;
        self.snapshots += 1;
        self.restorable = Some(self.snapshots);
        Ok(StateToken::new(self.snapshots, state))
    }

    fn restore_state(&mut self, token: StateToken) -> CosimResult<()> {
        self.ensure_checkpoint_support()?;
        if self.restorable != Some(token.serial()) {
            return Err(CosimError::InvalidStateToken {
                serial: token.serial(),
                expected: self.restorable,
            });
        }
        self.instance.set_state(token.state())?;
        self.restorable = None;
        Ok(())
    }

    fn release(&mut self) -> CosimResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        debug!("Releasing model '{}'", self.model_name());
        self.instance.terminate()
    }
}

impl<G: Generation> Drop for FmuAdapter<G> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!("Failed to release model '{}': {}", self.model_name(), err);
        }
    }
}

/// Wrap `instance` in the adapter matching its declared generation.
pub fn instantiate_adapter(
    instance: Box<dyn ModelInstance>,
    input_names: &[String],
    output_names: &[String],
    start_values: &StartValues,
) -> CosimResult<Box<dyn ModelAdapter>> {
    let adapter: Box<dyn ModelAdapter> = match instance.description().generation {
        ModelGeneration::Fmi1 => Box::new(FmuAdapter::<Fmi1>::instantiate(
            instance,
            input_names,
            output_names,
            start_values,
        )?),
        ModelGeneration::Fmi2 => Box::new(FmuAdapter::<Fmi2>::instantiate(
            instance,
            input_names,
            output_names,
            start_values,
        )?),
        ModelGeneration::Fmi3 => Box::new(FmuAdapter::<Fmi3>::instantiate(
            instance,
            input_names,
            output_names,
            start_values,
        )?),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::example_components::TestModel;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn adapter(model: TestModel) -> Box<dyn ModelAdapter> {
        instantiate_adapter(
            Box::new(model),
            &names(&["u0"]),
            &names(&["y0"]),
            &StartValues::new().with_value("gain", 2.0),
        )
        .unwrap()
    }

    #[test]
    fn factory_selects_generation() {
        for generation in [
            ModelGeneration::Fmi1,
            ModelGeneration::Fmi2,
            ModelGeneration::Fmi3,
        ] {
            let adapter = adapter(TestModel::new(generation));
            assert_eq!(adapter.generation(), generation);
        }
    }

    #[test]
    fn initialization_mode_only_for_newer_generations() {
        let model = TestModel::new(ModelGeneration::Fmi1);
        let observed = model.observed();
        let _adapter = adapter(model);
        assert_eq!(observed.borrow().initialization_mode_entered, 0);

        let model = TestModel::new(ModelGeneration::Fmi3);
        let observed = model.observed();
        let _adapter = adapter(model);
        assert_eq!(observed.borrow().initialization_mode_entered, 1);
        assert!(observed.borrow().start_values_in_initialization_mode);
    }

    #[test]
    fn unknown_channel_name() {
        let err = instantiate_adapter(
            Box::new(TestModel::new(ModelGeneration::Fmi2)),
            &names(&["not-a-variable"]),
            &names(&["y0"]),
            &StartValues::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CosimError::Configuration(_)));
    }

    #[test]
    fn mismatched_generation_marker() {
        let err = FmuAdapter::<Fmi2>::instantiate(
            Box::new(TestModel::new(ModelGeneration::Fmi3)),
            &names(&["u0"]),
            &names(&["y0"]),
            &StartValues::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CosimError::Configuration(_)));
    }

    #[test]
    fn step_and_outputs() {
        let mut adapter = adapter(TestModel::new(ModelGeneration::Fmi2));
        adapter.set_inputs(&[1.5]).unwrap();
        adapter.step(0.0, 0.5).unwrap();
        // x += gain * u * dt
        assert_eq!(adapter.get_outputs().unwrap(), vec![1.5]);

        let err = adapter.set_inputs(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, CosimError::DataShape { .. }));
    }

    #[test]
    fn failed_step_is_a_model_step_error() {
        let mut adapter = adapter(TestModel::new(ModelGeneration::Fmi2).failing_at_step(1));
        adapter.set_inputs(&[1.0]).unwrap();
        let err = adapter.step(0.0, 0.1).unwrap_err();
        assert!(matches!(err, CosimError::ModelStep { t, dt, .. } if t == 0.0 && dt == 0.1));
    }

    #[test]
    fn capability_flags() {
        assert!(!adapter(TestModel::new(ModelGeneration::Fmi1)).supports_state_checkpoint());
        assert!(adapter(TestModel::new(ModelGeneration::Fmi2)).supports_state_checkpoint());
        assert!(!adapter(TestModel::new(ModelGeneration::Fmi3).without_state_support())
            .supports_state_checkpoint());

        let mut fmi1 = adapter(TestModel::new(ModelGeneration::Fmi1));
        let err = fmi1.snapshot_state().unwrap_err();
        assert!(matches!(err, CosimError::Capability { .. }));
        assert!(err.to_string().contains("FMI 1.0"));
    }

    #[test]
    fn checkpoint_round_trip() {
        let mut adapter = adapter(TestModel::new(ModelGeneration::Fmi2));
        adapter.set_inputs(&[1.0]).unwrap();
        adapter.step(0.0, 1.0).unwrap();

        let checkpoint = Checkpoint::capture(adapter.as_mut(), 1.0).unwrap();
        adapter.step(1.0, 1.0).unwrap();
        assert_eq!(adapter.get_outputs().unwrap(), vec![4.0]);

        let t_cp = checkpoint.restore(adapter.as_mut()).unwrap();
        assert_eq!(t_cp, 1.0);
        assert_eq!(adapter.get_outputs().unwrap(), vec![2.0]);
    }

    #[test]
    fn stale_token_is_rejected() {
        let mut adapter = adapter(TestModel::new(ModelGeneration::Fmi2));
        let first = adapter.snapshot_state().unwrap();
        let second = adapter.snapshot_state().unwrap();

        let err = adapter.restore_state(first).unwrap_err();
        assert!(matches!(
            err,
            CosimError::InvalidStateToken {
                serial: 1,
                expected: Some(2)
            }
        ));

        adapter.restore_state(second).unwrap();
    }

    #[test]
    fn release_terminates_once() {
        let model = TestModel::new(ModelGeneration::Fmi2);
        let observed = model.observed();
        let mut adapter = adapter(model);

        adapter.release().unwrap();
        adapter.release().unwrap();
        drop(adapter);
        assert_eq!(observed.borrow().terminated, 1);
    }

    #[test]
    fn drop_releases() {
        let model = TestModel::new(ModelGeneration::Fmi3);
        let observed = model.observed();
        drop(adapter(model));
        assert_eq!(observed.borrow().terminated, 1);
    }
}
