//! Builder for a [`CoSimulation`].

use crate::clock::Time;
use crate::config::{CouplingSettings, FieldSettings, ModelSettings};
use crate::coupling::CouplingParticipant;
use crate::errors::{CosimError, CosimResult};
use crate::field::{ChannelMapping, DataField};
use crate::model::ModelAdapter;
use crate::recorder::{Recorder, ResultRecorder};
use crate::signals::SignalInput;
use log::{debug, warn};

use super::runtime::{CoSimulation, SignalBinding};

/// Assemble a co-simulation from a model, a coupling participant and the
/// exchanged fields.
///
/// All validation happens in [`CoSimulationBuilder::build`], before anything
/// is exchanged with the participant:
/// - field dimensionalities are fixed, taking the participant's knowledge of
///   the fields into account
/// - the model's channel mappings must have one channel per field component
/// - signal and recorded variable names must exist in the model
#[derive(Default)]
pub struct CoSimulationBuilder {
    model: Option<Box<dyn ModelAdapter>>,
    participant: Option<Box<dyn CouplingParticipant>>,
    mesh_name: Option<String>,
    read_field: Option<FieldSettings>,
    write_field: Option<FieldSettings>,
    signals: Option<Box<dyn SignalInput>>,
    recorder: Option<Box<dyn ResultRecorder>>,
    recorded_variables: Option<Vec<String>>,
    start_time: Time,
}

impl CoSimulationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model being coupled. Its input mapping receives the read field
    /// and its output mapping provides the write field.
    pub fn with_model(mut self, model: Box<dyn ModelAdapter>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_participant(mut self, participant: Box<dyn CouplingParticipant>) -> Self {
        self.participant = Some(participant);
        self
    }

    pub fn with_mesh_name(mut self, mesh_name: impl Into<String>) -> Self {
        self.mesh_name = Some(mesh_name.into());
        self
    }

    pub fn with_read_field(mut self, field: FieldSettings) -> Self {
        self.read_field = Some(field);
        self
    }

    pub fn with_write_field(mut self, field: FieldSettings) -> Self {
        self.write_field = Some(field);
        self
    }

    /// Driving signals applied before every step.
    pub fn with_signals(mut self, signals: Box<dyn SignalInput>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Replace the default in-memory [`Recorder`].
    pub fn with_recorder(mut self, recorder: Box<dyn ResultRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Model variables sampled for every committed window.
    ///
    /// Defaults to the model's output mapping.
    pub fn with_recorded_variables(mut self, names: Vec<String>) -> Self {
        self.recorded_variables = Some(names);
        self
    }

    pub fn with_start_time(mut self, start_time: Time) -> Self {
        self.start_time = start_time;
        self
    }

    /// Take the mesh, fields, signals and recorded variables from settings.
    pub fn with_settings(
        mut self,
        model_settings: &ModelSettings,
        coupling_settings: &CouplingSettings,
    ) -> CosimResult<Self> {
        let params = &coupling_settings.coupling_params;
        self = self
            .with_mesh_name(params.mesh_name.clone())
            .with_read_field(params.read_data.clone())
            .with_write_field(params.write_data.clone())
            .with_recorded_variables(model_settings.recorded_variables().to_vec());
        if let Some(table) = model_settings.signal_table()? {
            self = self.with_signals(Box::new(table));
        }
        Ok(self)
    }

    fn resolve_field(
        participant: &mut dyn CouplingParticipant,
        mesh_name: &str,
        field: Option<FieldSettings>,
        mapping: &ChannelMapping,
        role: &str,
    ) -> CosimResult<DataField> {
        let settings = field.ok_or_else(|| {
            CosimError::configuration(format!("No {} field was declared", role))
        })?;
        let reported = participant.data_dimensions(mesh_name, &settings.name);
        let field = settings.resolve(reported)?;
        mapping.check_matches(&field)?;
        debug!("{} field: {}", role, field);
        Ok(field)
    }

    /// Validate the configuration and create the co-simulation.
    pub fn build(self) -> CosimResult<CoSimulation> {
        let model = self
            .model
            .ok_or_else(|| CosimError::configuration("No model was provided"))?;
        let mut participant = self
            .participant
            .ok_or_else(|| CosimError::configuration("No coupling participant was provided"))?;
        let mesh_name = match self.mesh_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(CosimError::configuration("No mesh name was provided")),
        };

        let read_field = Self::resolve_field(
            participant.as_mut(),
            &mesh_name,
            self.read_field,
            model.inputs(),
            "read",
        )?;
        let write_field = Self::resolve_field(
            participant.as_mut(),
            &mesh_name,
            self.write_field,
            model.outputs(),
            "write",
        )?;

        let signals = match self.signals {
            Some(input) => {
                let mapping = ChannelMapping::resolve(input.names(), |name| {
                    model.value_reference(name)
                })?;
                for (name, reference) in mapping.names().iter().zip(mapping.references()) {
                    if model.inputs().references().contains(reference) {
                        warn!(
                            "Signal '{}' drives a coupled input and is overridden by the read field '{}'",
                            name,
                            read_field.name()
                        );
                    }
                }
                Some(SignalBinding {
                    input,
                    references: mapping.references().to_vec(),
                })
            }
            None => None,
        };

        let recorded_names = self
            .recorded_variables
            .unwrap_or_else(|| model.outputs().names().to_vec());
        let recorded = ChannelMapping::resolve(&recorded_names, |name| model.value_reference(name))?;
        let recorder = self
            .recorder
            .unwrap_or_else(|| Box::new(Recorder::new(recorded_names)) as Box<dyn ResultRecorder>);

        Ok(CoSimulation {
            model,
            participant,
            mesh_name,
            read_field,
            write_field,
            signals,
            recorder,
            recorded: recorded.references().to_vec(),
            start_time: self.start_time,
            started: false,
        })
    }
}
