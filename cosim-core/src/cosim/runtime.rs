use crate::checkpoint::Checkpoint;
use crate::clock::{SimulationClock, Time};
use crate::coupling::CouplingParticipant;
use crate::errors::{CosimError, CosimResult};
use crate::field::{DataField, ValueReference, VertexBinding};
use crate::marshal::DataMarshaller;
use crate::model::ModelAdapter;
use crate::recorder::{ResultRecorder, ResultTable};
use crate::signals::SignalInput;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::session::{ModelSession, ParticipantSession};

/// Counters describing a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Time after the last committed window
    pub final_time: Time,
    pub committed_windows: usize,
    /// Number of window attempts that were rolled back
    pub rollbacks: usize,
    pub checkpoints_taken: usize,
}

/// Driving signals together with the model variables they are applied to.
#[derive(Debug)]
pub(crate) struct SignalBinding {
    pub input: Box<dyn SignalInput>,
    pub references: Vec<ValueReference>,
}

impl SignalBinding {
    fn apply(&self, model: &mut dyn ModelAdapter, t: Time) -> CosimResult<()> {
        let values = self.input.values_at(t);
        model.set_values(&self.references, &values)
    }
}

/// Borrowed view of everything the loop needs besides the two sessions.
struct Exchange<'a> {
    read_field: &'a DataField,
    write_field: &'a DataField,
    marshaller: DataMarshaller,
    signals: Option<&'a SignalBinding>,
    recorder: &'a mut dyn ResultRecorder,
    recorded: &'a [ValueReference],
}

impl Exchange<'_> {
    fn record(&mut self, model: &dyn ModelAdapter, t: Time) -> CosimResult<()> {
        let values = model.get_values(self.recorded)?;
        self.recorder.sample(t, &values, false);
        Ok(())
    }

    /// Write the model's initial outputs if the participant asks for them.
    fn write_initial_data(
        &self,
        participant: &mut dyn CouplingParticipant,
        model: &dyn ModelAdapter,
        binding: VertexBinding,
    ) -> CosimResult<()> {
        if !participant.requires_initial_data()? {
            return Ok(());
        }
        let outputs = model.get_outputs()?;
        let buffer = self.marshaller.to_coupling_buffer(self.write_field, &outputs)?;
        debug!("Writing initial data for '{}'", self.write_field.name());
        participant.write_initial_data(self.write_field, binding, &buffer)
    }

    /// One attempt at a window: read, step and write, returning the window size.
    fn attempt(
        &self,
        participant: &mut dyn CouplingParticipant,
        model: &mut dyn ModelAdapter,
        binding: VertexBinding,
        t: Time,
    ) -> CosimResult<Time> {
        let dt = participant.max_time_step_size()?;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(CosimError::protocol(format!(
                "participant '{}' proposed a window of {}",
                participant.name(),
                dt
            )));
        }

        let buffer = participant.read_data(self.read_field, binding, dt)?;
        let inputs = self.marshaller.to_model_inputs(self.read_field, &buffer)?;

        // Coupled inputs are set last and win on a shared variable
        if let Some(signals) = self.signals {
            signals.apply(model, t)?;
        }
        model.set_inputs(&inputs)?;
        model.step(t, dt)?;

        let outputs = model.get_outputs()?;
        let buffer = self.marshaller.to_coupling_buffer(self.write_field, &outputs)?;
        participant.write_data(self.write_field, binding, &buffer)?;
        Ok(dt)
    }

    fn run(
        &mut self,
        participant: &mut dyn CouplingParticipant,
        model: &mut dyn ModelAdapter,
        mesh_name: &str,
        start_time: Time,
    ) -> CosimResult<RunSummary> {
        let dimensions = participant.mesh_dimensions(mesh_name)?;
        let binding = participant.set_mesh_vertex(mesh_name, &vec![0.0; dimensions])?;

        self.write_initial_data(participant, model, binding)?;
        participant.initialize()?;

        let mut clock = SimulationClock::start(start_time);
        let mut summary = RunSummary::default();
        self.record(model, clock.time())?;

        while participant.is_coupling_ongoing()? {
            let mut checkpoint = if participant.requires_writing_checkpoint()? {
                model.ensure_state_checkpoint()?;
                summary.checkpoints_taken += 1;
                let checkpoint = Checkpoint::capture(model, clock.time())?;
                participant.checkpoint_written()?;
                Some(checkpoint)
            } else {
                None
            };

            let mut iteration = 0;
            loop {
                let dt = self.attempt(participant, model, binding, clock.time())?;
                clock.advance(dt);
                participant.advance(dt)?;

                // Explicit windows always commit
                let rollback = match checkpoint {
                    Some(_) => participant.requires_reading_checkpoint()?,
                    None => false,
                };
                if !rollback {
                    break;
                }

                let previous = checkpoint.take().ok_or_else(|| {
                    CosimError::protocol("rollback requested without a checkpoint")
                })?;
                let t_cp = previous.restore(model)?;
                participant.checkpoint_read()?;
                clock.rollback(t_cp);
                iteration += 1;
                summary.rollbacks += 1;
                debug!(
                    "Window at t={} rolled back (iteration {})",
                    t_cp, iteration
                );

                // The restored checkpoint is consumed; the retry needs its own
                summary.checkpoints_taken += 1;
                checkpoint = Some(Checkpoint::capture(model, t_cp)?);
            }

            drop(checkpoint);
            summary.committed_windows += 1;
            debug!(
                "Committed window {} at t={} (dt={}, {} rollbacks)",
                summary.committed_windows,
                clock.time(),
                clock.window_size(),
                iteration
            );
            self.record(model, clock.time())?;
        }

        self.record(model, clock.time())?;
        summary.final_time = clock.time();
        Ok(summary)
    }
}

/// A model coupled to a participant, ready to run.
///
/// Built with [`super::CoSimulationBuilder`]. A co-simulation runs once;
/// the participant is finalized and the model released when the run ends,
/// whether it succeeds or not.
pub struct CoSimulation {
    pub(super) model: Box<dyn ModelAdapter>,
    pub(super) participant: Box<dyn CouplingParticipant>,
    pub(super) mesh_name: String,
    pub(super) read_field: DataField,
    pub(super) write_field: DataField,
    pub(super) signals: Option<SignalBinding>,
    pub(super) recorder: Box<dyn ResultRecorder>,
    pub(super) recorded: Vec<ValueReference>,
    pub(super) start_time: Time,
    pub(super) started: bool,
}

impl fmt::Debug for CoSimulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoSimulation")
            .field("model", &self.model)
            .field("participant", &self.participant.name())
            .field("mesh_name", &self.mesh_name)
            .field("read_field", &self.read_field)
            .field("write_field", &self.write_field)
            .field("signals", &self.signals)
            .field("start_time", &self.start_time)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl CoSimulation {
    pub fn read_field(&self) -> &DataField {
        &self.read_field
    }

    pub fn write_field(&self) -> &DataField {
        &self.write_field
    }

    pub fn participant_name(&self) -> &str {
        self.participant.name()
    }

    /// Run the coupled simulation until the participant ends the coupling.
    pub fn run(&mut self) -> CosimResult<RunSummary> {
        if self.started {
            return Err(CosimError::protocol("a co-simulation can only be run once"));
        }
        self.started = true;
        info!(
            "Starting co-simulation of model '{}' ({}) as participant '{}'",
            self.model.model_name(),
            self.model.generation(),
            self.participant.name()
        );

        let mut participant = ParticipantSession::new(self.participant.as_mut());
        let mut model = ModelSession::new(self.model.as_mut());
        let mut exchange = Exchange {
            read_field: &self.read_field,
            write_field: &self.write_field,
            marshaller: DataMarshaller::new(),
            signals: self.signals.as_ref(),
            recorder: self.recorder.as_mut(),
            recorded: &self.recorded,
        };

        let summary = exchange.run(&mut *participant, &mut *model, &self.mesh_name, self.start_time)?;
        participant.finalize()?;
        model.release()?;

        info!(
            "Co-simulation finished at t={} after {} windows ({} rollbacks)",
            summary.final_time, summary.committed_windows, summary.rollbacks
        );
        Ok(summary)
    }

    /// Everything recorded so far.
    pub fn result(&self) -> ResultTable {
        self.recorder.result()
    }
}
