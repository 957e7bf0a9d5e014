//! Couples the local model with a peer model stepped in the same process.
//!
//! The local participant goes first in every window: it reads the peer's
//! latest outputs, steps, writes, and the peer is then stepped with the
//! written data inside [`CouplingParticipant::advance`].
//! Under the implicit scheme this is a fixed point iteration. The peer is
//! checkpointed at the start of each window and the window is repeated until
//! the written data stops changing.

use crate::checkpoint::Checkpoint;
use crate::clock::{FloatValue, SimulationClock, Time};
use crate::coupling::{CouplingParticipant, CouplingScheme};
use crate::errors::{CosimError, CosimResult};
use crate::field::{DataField, VertexBinding};
use crate::marshal::{CouplingBuffer, DataMarshaller};
use crate::model::ModelAdapter;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Convergence criteria of the implicit scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitSettings {
    /// Attempts per window after which the window is accepted anyway.
    pub max_iterations: usize,
    /// Largest change of any written component between two attempts that
    /// counts as converged.
    pub tolerance: FloatValue,
}

impl Default for ImplicitSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug)]
pub struct SerialCoupling {
    name: String,
    peer: Box<dyn ModelAdapter>,
    scheme: CouplingScheme,
    implicit: ImplicitSettings,
    window: Time,
    end_time: Time,
    mesh_dimensions: usize,
    data_names: Option<(String, String)>,
    marshaller: DataMarshaller,
    exchange_initial_data: bool,

    clock: SimulationClock,
    initialized: bool,
    finalized: bool,
    /// Peer outputs delivered by the next read
    peer_outputs: Vec<FloatValue>,
    /// Local initial outputs, applied to the peer's inputs in `initialize`
    initial_data: Option<Vec<FloatValue>>,
    /// Data written by the local participant in the current attempt
    written: Option<Vec<FloatValue>>,
    /// Data written in the previous attempt of the current window
    previous_attempt: Option<Vec<FloatValue>>,
    checkpoint: Option<Checkpoint>,
    checkpoint_requested: bool,
    iteration: usize,
    rolled_back: bool,
}

impl SerialCoupling {
    /// Couple with `peer` and commit every window after one exchange.
    pub fn explicit(
        name: impl Into<String>,
        peer: Box<dyn ModelAdapter>,
        window: Time,
        end_time: Time,
    ) -> CosimResult<Self> {
        Self::new(
            name.into(),
            peer,
            CouplingScheme::Explicit,
            ImplicitSettings::default(),
            window,
            end_time,
        )
    }

    /// Couple with `peer` and repeat every window until it converges.
    ///
    /// Fails if the peer cannot checkpoint its state.
    pub fn implicit(
        name: impl Into<String>,
        peer: Box<dyn ModelAdapter>,
        window: Time,
        end_time: Time,
        settings: ImplicitSettings,
    ) -> CosimResult<Self> {
        if !peer.supports_state_checkpoint() {
            return Err(CosimError::Capability {
                reason: format!("peer model '{}' cannot reset its state", peer.model_name()),
            });
        }
        if settings.max_iterations == 0 {
            return Err(CosimError::configuration(
                "Implicit coupling needs at least one iteration per window",
            ));
        }
        Self::new(
            name.into(),
            peer,
            CouplingScheme::Implicit,
            settings,
            window,
            end_time,
        )
    }

    fn new(
        name: String,
        peer: Box<dyn ModelAdapter>,
        scheme: CouplingScheme,
        implicit: ImplicitSettings,
        window: Time,
        end_time: Time,
    ) -> CosimResult<Self> {
        if !(window > 0.0) {
            return Err(CosimError::configuration(format!(
                "Coupling window must be positive, got {}",
                window
            )));
        }
        if !(end_time > 0.0) {
            return Err(CosimError::configuration(format!(
                "Coupling end time must be positive, got {}",
                end_time
            )));
        }
        Ok(Self {
            name,
            peer,
            scheme,
            implicit,
            window,
            end_time,
            mesh_dimensions: 3,
            data_names: None,
            marshaller: DataMarshaller::new(),
            exchange_initial_data: false,
            clock: SimulationClock::start(0.0),
            initialized: false,
            finalized: false,
            peer_outputs: Vec::new(),
            initial_data: None,
            written: None,
            previous_attempt: None,
            checkpoint: None,
            checkpoint_requested: false,
            iteration: 0,
            rolled_back: false,
        })
    }

    pub fn with_mesh_dimensions(mut self, dimensions: usize) -> Self {
        self.mesh_dimensions = dimensions;
        self
    }

    /// Names of the fields read and written by the local participant.
    ///
    /// Lets [`CouplingParticipant::data_dimensions`] report the peer's
    /// channel counts for them.
    pub fn with_data_names(mut self, read: impl Into<String>, write: impl Into<String>) -> Self {
        self.data_names = Some((read.into(), write.into()));
        self
    }

    /// Ask for the local model's initial outputs before initialization.
    ///
    /// They are set as the peer's inputs before the peer's own initial
    /// outputs are read, so a peer with direct feedthrough starts from them.
    pub fn with_initial_data(mut self) -> Self {
        self.exchange_initial_data = true;
        self
    }

    pub fn scheme(&self) -> CouplingScheme {
        self.scheme
    }

    pub fn peer(&self) -> &dyn ModelAdapter {
        self.peer.as_ref()
    }

    fn ensure_running(&self, operation: &str) -> CosimResult<()> {
        if !self.initialized {
            return Err(CosimError::protocol(format!(
                "{}: {} before initialize",
                self.name, operation
            )));
        }
        if self.finalized {
            return Err(CosimError::protocol(format!(
                "{}: {} after finalize",
                self.name, operation
            )));
        }
        Ok(())
    }

    fn remaining(&self) -> Time {
        self.end_time - self.clock.time()
    }

    /// Whether the current attempt should be accepted.
    fn converged(&self, written: &[FloatValue]) -> bool {
        if self.iteration + 1 >= self.implicit.max_iterations {
            if self.implicit.max_iterations > 1 {
                warn!(
                    "{}: window at t={} accepted without convergence after {} iterations",
                    self.name,
                    self.clock.time(),
                    self.implicit.max_iterations
                );
            }
            return true;
        }
        match &self.previous_attempt {
            Some(previous) => {
                let residual = previous
                    .iter()
                    .zip(written)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, FloatValue::max);
                residual <= self.implicit.tolerance
            }
            None => false,
        }
    }

    fn commit(&mut self, dt: Time, outputs: Vec<FloatValue>) {
        self.clock.advance(dt);
        self.peer_outputs = outputs;
        self.checkpoint = None;
        self.checkpoint_requested = false;
        self.previous_attempt = None;
        self.iteration = 0;
        self.rolled_back = false;
    }
}

impl CouplingParticipant for SerialCoupling {
    fn name(&self) -> &str {
        &self.name
    }

    fn mesh_dimensions(&mut self, _mesh_name: &str) -> CosimResult<usize> {
        Ok(self.mesh_dimensions)
    }

    fn set_mesh_vertex(&mut self, _mesh_name: &str, position: &[f64]) -> CosimResult<VertexBinding> {
        if position.len() != self.mesh_dimensions {
            return Err(CosimError::protocol(format!(
                "{}: vertex has {} coordinates on a {}D mesh",
                self.name,
                position.len(),
                self.mesh_dimensions
            )));
        }
        Ok(VertexBinding(0))
    }

    fn data_dimensions(&mut self, _mesh_name: &str, field_name: &str) -> Option<usize> {
        let (read, write) = self.data_names.as_ref()?;
        if field_name == read {
            Some(self.peer.outputs().len())
        } else if field_name == write {
            Some(self.peer.inputs().len())
        } else {
            None
        }
    }

    fn requires_initial_data(&mut self) -> CosimResult<bool> {
        Ok(self.exchange_initial_data && !self.initialized)
    }

    fn write_initial_data(
        &mut self,
        field: &DataField,
        _binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()> {
        if !self.exchange_initial_data {
            return Err(CosimError::protocol(format!(
                "{}: initial data written but not requested",
                self.name
            )));
        }
        if self.initialized {
            return Err(CosimError::protocol(format!(
                "{}: initial data written after initialize",
                self.name
            )));
        }
        self.initial_data = Some(self.marshaller.to_model_inputs(field, buffer)?);
        Ok(())
    }

    fn initialize(&mut self) -> CosimResult<()> {
        if self.initialized {
            return Err(CosimError::protocol(format!(
                "{}: initialized twice",
                self.name
            )));
        }
        if self.exchange_initial_data {
            let inputs = self.initial_data.take().ok_or_else(|| {
                CosimError::protocol(format!(
                    "{}: initialized without the requested initial data",
                    self.name
                ))
            })?;
            self.peer.set_inputs(&inputs)?;
        }
        self.peer_outputs = self.peer.get_outputs()?;
        self.initialized = true;
        debug!(
            "{}: coupled with peer '{}' ({:?} scheme, window {}, end {})",
            self.name,
            self.peer.model_name(),
            self.scheme,
            self.window,
            self.end_time
        );
        Ok(())
    }

    fn is_coupling_ongoing(&mut self) -> CosimResult<bool> {
        self.ensure_running("is_coupling_ongoing")?;
        // Tolerate rounding in the accumulated time
        Ok(self.remaining() > self.window * 1e-9)
    }

    fn max_time_step_size(&mut self) -> CosimResult<Time> {
        self.ensure_running("max_time_step_size")?;
        Ok(self.window.min(self.remaining()))
    }

    fn read_data(
        &mut self,
        field: &DataField,
        _binding: VertexBinding,
        _dt: Time,
    ) -> CosimResult<CouplingBuffer> {
        self.ensure_running("read_data")?;
        self.marshaller.to_coupling_buffer(field, &self.peer_outputs)
    }

    fn write_data(
        &mut self,
        field: &DataField,
        _binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()> {
        self.ensure_running("write_data")?;
        self.written = Some(self.marshaller.to_model_inputs(field, buffer)?);
        Ok(())
    }

    fn requires_writing_checkpoint(&mut self) -> CosimResult<bool> {
        self.ensure_running("requires_writing_checkpoint")?;
        let required = self.scheme == CouplingScheme::Implicit && !self.checkpoint_requested;
        self.checkpoint_requested = true;
        Ok(required)
    }

    fn requires_reading_checkpoint(&mut self) -> CosimResult<bool> {
        self.ensure_running("requires_reading_checkpoint")?;
        Ok(self.rolled_back)
    }

    fn advance(&mut self, dt: Time) -> CosimResult<()> {
        self.ensure_running("advance")?;
        let written = self.written.take().ok_or_else(|| {
            CosimError::protocol(format!("{}: advance without written data", self.name))
        })?;

        let t = self.clock.time();
        if self.scheme == CouplingScheme::Implicit && self.checkpoint.is_none() {
            self.checkpoint = Some(Checkpoint::capture(self.peer.as_mut(), t)?);
        }

        self.peer.set_inputs(&written)?;
        self.peer.step(t, dt)?;
        let outputs = self.peer.get_outputs()?;

        match self.scheme {
            CouplingScheme::Explicit => self.commit(dt, outputs),
            CouplingScheme::Implicit => {
                if self.converged(&written) {
                    debug!(
                        "{}: window at t={} converged after {} iterations",
                        self.name,
                        t,
                        self.iteration + 1
                    );
                    self.commit(dt, outputs);
                } else {
                    if let Some(checkpoint) = self.checkpoint.take() {
                        checkpoint.restore(self.peer.as_mut())?;
                    }
                    self.checkpoint = Some(Checkpoint::capture(self.peer.as_mut(), t)?);
                    self.peer_outputs = outputs;
                    self.previous_attempt = Some(written);
                    self.iteration += 1;
                    self.rolled_back = true;
                }
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> CosimResult<()> {
        if self.finalized {
            return Err(CosimError::protocol(format!(
                "{}: finalized twice",
                self.name
            )));
        }
        self.finalized = true;
        self.checkpoint = None;
        self.peer.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example_components::TestModel;
    use crate::model::{instantiate_adapter, ModelGeneration, StartValues};
    use is_close::is_close;

    fn peer(model: TestModel) -> Box<dyn ModelAdapter> {
        instantiate_adapter(
            Box::new(model),
            &["u0".to_string()],
            &["y0".to_string()],
            &StartValues::new(),
        )
        .unwrap()
    }

    fn read(coupling: &mut SerialCoupling) -> FloatValue {
        match coupling
            .read_data(&DataField::scalar("Displacement"), VertexBinding(0), 0.5)
            .unwrap()
        {
            CouplingBuffer::Scalar(value) => value,
            other => panic!("unexpected buffer {:?}", other),
        }
    }

    fn write(coupling: &mut SerialCoupling, value: FloatValue) {
        coupling
            .write_data(
                &DataField::scalar("Force"),
                VertexBinding(0),
                &CouplingBuffer::Scalar(value),
            )
            .unwrap();
    }

    #[test]
    fn explicit_lockstep() {
        let model = TestModel::new(ModelGeneration::Fmi2);
        let observed = model.observed();
        let mut coupling = SerialCoupling::explicit("Mass", peer(model), 0.5, 1.0).unwrap();
        coupling.initialize().unwrap();

        assert!(!coupling.requires_writing_checkpoint().unwrap());
        assert_eq!(read(&mut coupling), 0.0);

        write(&mut coupling, 2.0);
        coupling.advance(0.5).unwrap();
        assert!(is_close!(read(&mut coupling), 1.0));
        assert!(coupling.is_coupling_ongoing().unwrap());

        write(&mut coupling, 2.0);
        coupling.advance(0.5).unwrap();
        assert!(is_close!(read(&mut coupling), 2.0));
        assert!(!coupling.is_coupling_ongoing().unwrap());

        assert_eq!(observed.borrow().snapshots, 0);
        coupling.finalize().unwrap();
        assert_eq!(observed.borrow().terminated, 1);
    }

    #[test]
    fn last_window_is_shortened() {
        let mut coupling =
            SerialCoupling::explicit("Mass", peer(TestModel::new(ModelGeneration::Fmi2)), 0.4, 1.0)
                .unwrap();
        coupling.initialize().unwrap();
        for _ in 0..2 {
            assert!(is_close!(coupling.max_time_step_size().unwrap(), 0.4));
            write(&mut coupling, 0.0);
            coupling.advance(0.4).unwrap();
        }
        assert!(is_close!(coupling.max_time_step_size().unwrap(), 0.2));
    }

    #[test]
    fn implicit_repeats_until_converged() {
        let model = TestModel::new(ModelGeneration::Fmi2);
        let observed = model.observed();
        let mut coupling = SerialCoupling::implicit(
            "Mass",
            peer(model),
            0.5,
            1.0,
            ImplicitSettings::default(),
        )
        .unwrap();
        coupling.initialize().unwrap();

        assert!(coupling.requires_writing_checkpoint().unwrap());
        write(&mut coupling, 1.0);
        coupling.advance(0.5).unwrap();
        assert!(coupling.requires_reading_checkpoint().unwrap());
        // Peer output from the rejected attempt
        assert!(is_close!(read(&mut coupling), 0.5));

        write(&mut coupling, 1.0);
        coupling.advance(0.5).unwrap();
        assert!(!coupling.requires_reading_checkpoint().unwrap());

        // One step worth of accumulation, not two
        assert!(is_close!(read(&mut coupling), 0.5));
        assert_eq!(observed.borrow().steps, 2);
        assert_eq!(observed.borrow().restores, 1);

        // The next window asks for a checkpoint again
        assert!(coupling.requires_writing_checkpoint().unwrap());
    }

    #[test]
    fn implicit_accepts_after_max_iterations() {
        let settings = ImplicitSettings {
            max_iterations: 3,
            tolerance: 1e-12,
        };
        let mut coupling = SerialCoupling::implicit(
            "Mass",
            peer(TestModel::new(ModelGeneration::Fmi3)),
            0.5,
            0.5,
            settings,
        )
        .unwrap();
        coupling.initialize().unwrap();

        for (attempt, value) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            write(&mut coupling, value);
            coupling.advance(0.5).unwrap();
            assert_eq!(coupling.requires_reading_checkpoint().unwrap(), attempt < 2);
        }
        assert!(is_close!(read(&mut coupling), 1.5));
        assert!(!coupling.is_coupling_ongoing().unwrap());
    }

    #[test]
    fn implicit_requires_restorable_peer() {
        let err = SerialCoupling::implicit(
            "Mass",
            peer(TestModel::new(ModelGeneration::Fmi1)),
            0.5,
            1.0,
            ImplicitSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CosimError::Capability { .. }));
    }

    #[test]
    fn initial_data_reaches_the_peer() {
        let mut coupling =
            SerialCoupling::explicit("Mass", peer(TestModel::new(ModelGeneration::Fmi2)), 0.5, 1.0)
                .unwrap()
                .with_initial_data();
        let u0 = coupling.peer().value_reference("u0").unwrap();

        assert!(coupling.requires_initial_data().unwrap());
        coupling
            .write_initial_data(
                &DataField::scalar("Force"),
                VertexBinding(0),
                &CouplingBuffer::Scalar(2.0),
            )
            .unwrap();
        coupling.initialize().unwrap();
        assert_eq!(coupling.peer().get_values(&[u0]).unwrap(), vec![2.0]);

        assert!(!coupling.requires_initial_data().unwrap());
        let err = coupling
            .write_initial_data(
                &DataField::scalar("Force"),
                VertexBinding(0),
                &CouplingBuffer::Scalar(3.0),
            )
            .unwrap_err();
        assert!(matches!(err, CosimError::CouplingProtocol(_)));
    }

    #[test]
    fn initial_data_only_when_requested() {
        let mut coupling =
            SerialCoupling::explicit("Mass", peer(TestModel::new(ModelGeneration::Fmi2)), 0.5, 1.0)
                .unwrap();
        assert!(!coupling.requires_initial_data().unwrap());
        let err = coupling
            .write_initial_data(
                &DataField::scalar("Force"),
                VertexBinding(0),
                &CouplingBuffer::Scalar(2.0),
            )
            .unwrap_err();
        assert!(matches!(err, CosimError::CouplingProtocol(_)));

        // Requested but never written
        let mut coupling =
            SerialCoupling::explicit("Mass", peer(TestModel::new(ModelGeneration::Fmi2)), 0.5, 1.0)
                .unwrap()
                .with_initial_data();
        assert!(coupling.initialize().is_err());
    }

    #[test]
    fn invalid_window() {
        let err =
            SerialCoupling::explicit("Mass", peer(TestModel::new(ModelGeneration::Fmi2)), 0.0, 1.0)
                .unwrap_err();
        assert!(matches!(err, CosimError::Configuration(_)));
    }

    #[test]
    fn reports_peer_dimensions() {
        let mut coupling =
            SerialCoupling::explicit("Mass", peer(TestModel::new(ModelGeneration::Fmi2)), 0.5, 1.0)
                .unwrap()
                .with_data_names("Displacement", "Force");
        assert_eq!(coupling.data_dimensions("Mesh", "Displacement"), Some(1));
        assert_eq!(coupling.data_dimensions("Mesh", "Force"), Some(1));
        assert_eq!(coupling.data_dimensions("Mesh", "Velocity"), None);
    }
}
