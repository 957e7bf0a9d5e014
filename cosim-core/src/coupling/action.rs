//! Adapter for the action based (second generation) middleware API.
//!
//! That API negotiates the first window size in `initialize`, signals
//! checkpoints through named actions which must be acknowledged and addresses
//! data by integer ids with separate scalar and vector calls.

use crate::clock::{FloatValue, Time};
use crate::coupling::CouplingParticipant;
use crate::errors::{CosimError, CosimResult};
use crate::field::{DataField, VertexBinding};
use crate::marshal::CouplingBuffer;
use log::debug;
use std::collections::HashMap;

pub type MeshId = i32;
pub type DataId = i32;

/// Actions the middleware may require from a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    WriteInitialData,
    WriteIterationCheckpoint,
    ReadIterationCheckpoint,
}

/// The action based middleware API.
pub trait ActionInterface {
    fn participant_name(&self) -> &str;

    fn mesh_id(&mut self, mesh_name: &str) -> CosimResult<MeshId>;

    /// Spatial dimensions of the whole coupled problem.
    fn dimensions(&mut self) -> CosimResult<usize>;

    fn set_mesh_vertex(&mut self, mesh: MeshId, position: &[f64]) -> CosimResult<i32>;

    fn data_id(&mut self, data_name: &str, mesh: MeshId) -> CosimResult<DataId>;

    /// Set up the coupling and return the size of the first window.
    fn initialize(&mut self) -> CosimResult<Time>;

    /// Send the initial data written before this call.
    fn initialize_data(&mut self) -> CosimResult<()>;

    fn is_coupling_ongoing(&mut self) -> CosimResult<bool>;

    fn is_action_required(&mut self, action: Action) -> CosimResult<bool>;

    fn mark_action_fulfilled(&mut self, action: Action) -> CosimResult<()>;

    fn read_scalar_data(&mut self, data: DataId, vertex: i32) -> CosimResult<FloatValue>;

    fn read_vector_data(&mut self, data: DataId, vertex: i32) -> CosimResult<Vec<FloatValue>>;

    fn write_scalar_data(&mut self, data: DataId, vertex: i32, value: FloatValue)
        -> CosimResult<()>;

    fn write_vector_data(
        &mut self,
        data: DataId,
        vertex: i32,
        values: &[FloatValue],
    ) -> CosimResult<()>;

    /// Commit the window and return the size of the next one.
    fn advance(&mut self, dt: Time) -> CosimResult<Time>;

    fn finalize(&mut self) -> CosimResult<()>;
}

/// Presents an [`ActionInterface`] as a [`CouplingParticipant`].
///
/// The action API must be initialized before it can answer whether initial
/// data is required, so initialization starts on the first query and data
/// initialization completes in [`CouplingParticipant::initialize`].
/// Checkpoint actions are acknowledged once the loop reports that the
/// checkpoint was taken or restored, so a failed capture leaves them pending.
#[derive(Debug)]
pub struct ActionParticipant<I: ActionInterface> {
    interface: I,
    mesh: Option<MeshId>,
    data_ids: HashMap<String, DataId>,
    dt: Option<Time>,
    data_initialized: bool,
    write_checkpoint_pending: bool,
    read_checkpoint_pending: bool,
}

impl<I: ActionInterface> ActionParticipant<I> {
    pub fn new(interface: I) -> Self {
        Self {
            interface,
            mesh: None,
            data_ids: HashMap::new(),
            dt: None,
            data_initialized: false,
            write_checkpoint_pending: false,
            read_checkpoint_pending: false,
        }
    }

    pub fn interface(&self) -> &I {
        &self.interface
    }

    pub fn into_inner(self) -> I {
        self.interface
    }

    fn ensure_initialized(&mut self) -> CosimResult<Time> {
        match self.dt {
            Some(dt) => Ok(dt),
            None => {
                let dt = self.interface.initialize()?;
                debug!(
                    "{}: coupling initialized with a first window of {}",
                    self.interface.participant_name(),
                    dt
                );
                self.dt = Some(dt);
                Ok(dt)
            }
        }
    }

    fn data_id(&mut self, field: &DataField) -> CosimResult<DataId> {
        if let Some(id) = self.data_ids.get(field.name()) {
            return Ok(*id);
        }
        let mesh = self.mesh.ok_or_else(|| {
            CosimError::protocol(format!(
                "data '{}' accessed before a mesh vertex was registered",
                field.name()
            ))
        })?;
        let id = self.interface.data_id(field.name(), mesh)?;
        self.data_ids.insert(field.name().to_string(), id);
        Ok(id)
    }

    fn write(
        &mut self,
        field: &DataField,
        binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()> {
        let id = self.data_id(field)?;
        match buffer {
            CouplingBuffer::Scalar(value) if field.is_scalar() => {
                self.interface.write_scalar_data(id, binding.id(), *value)
            }
            CouplingBuffer::Vector(values) if !field.is_scalar() => {
                self.interface.write_vector_data(id, binding.id(), values)
            }
            _ => Err(CosimError::protocol(format!(
                "buffer representation does not match field {}",
                field
            ))),
        }
    }
}

impl<I: ActionInterface> CouplingParticipant for ActionParticipant<I> {
    fn name(&self) -> &str {
        self.interface.participant_name()
    }

    fn mesh_dimensions(&mut self, _mesh_name: &str) -> CosimResult<usize> {
        self.interface.dimensions()
    }

    fn set_mesh_vertex(&mut self, mesh_name: &str, position: &[f64]) -> CosimResult<VertexBinding> {
        let mesh = self.interface.mesh_id(mesh_name)?;
        self.mesh = Some(mesh);
        let vertex = self.interface.set_mesh_vertex(mesh, position)?;
        Ok(VertexBinding(vertex))
    }

    fn requires_initial_data(&mut self) -> CosimResult<bool> {
        self.ensure_initialized()?;
        self.interface.is_action_required(Action::WriteInitialData)
    }

    fn write_initial_data(
        &mut self,
        field: &DataField,
        binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()> {
        if self.data_initialized {
            return Err(CosimError::protocol(
                "initial data written after initialization",
            ));
        }
        self.write(field, binding, buffer)?;
        self.interface.mark_action_fulfilled(Action::WriteInitialData)
    }

    fn initialize(&mut self) -> CosimResult<()> {
        if self.data_initialized {
            return Err(CosimError::protocol("participant initialized twice"));
        }
        self.ensure_initialized()?;
        self.interface.initialize_data()?;
        self.data_initialized = true;
        Ok(())
    }

    fn is_coupling_ongoing(&mut self) -> CosimResult<bool> {
        self.interface.is_coupling_ongoing()
    }

    fn max_time_step_size(&mut self) -> CosimResult<Time> {
        self.dt
            .ok_or_else(|| CosimError::protocol("window size requested before initialization"))
    }

    fn read_data(
        &mut self,
        field: &DataField,
        binding: VertexBinding,
        _dt: Time,
    ) -> CosimResult<CouplingBuffer> {
        let id = self.data_id(field)?;
        if field.is_scalar() {
            Ok(CouplingBuffer::Scalar(
                self.interface.read_scalar_data(id, binding.id())?,
            ))
        } else {
            Ok(CouplingBuffer::Vector(
                self.interface.read_vector_data(id, binding.id())?,
            ))
        }
    }

    fn write_data(
        &mut self,
        field: &DataField,
        binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()> {
        self.write(field, binding, buffer)
    }

    fn requires_writing_checkpoint(&mut self) -> CosimResult<bool> {
        let required = self
            .interface
            .is_action_required(Action::WriteIterationCheckpoint)?;
        self.write_checkpoint_pending = required;
        Ok(required)
    }

    fn requires_reading_checkpoint(&mut self) -> CosimResult<bool> {
        let required = self
            .interface
            .is_action_required(Action::ReadIterationCheckpoint)?;
        self.read_checkpoint_pending = required;
        Ok(required)
    }

    fn checkpoint_written(&mut self) -> CosimResult<()> {
        if !std::mem::take(&mut self.write_checkpoint_pending) {
            return Ok(());
        }
        self.interface
            .mark_action_fulfilled(Action::WriteIterationCheckpoint)
    }

    fn checkpoint_read(&mut self) -> CosimResult<()> {
        if !std::mem::take(&mut self.read_checkpoint_pending) {
            return Ok(());
        }
        self.interface
            .mark_action_fulfilled(Action::ReadIterationCheckpoint)
    }

    fn advance(&mut self, dt: Time) -> CosimResult<()> {
        let next = self.interface.advance(dt)?;
        self.dt = Some(next);
        Ok(())
    }

    fn finalize(&mut self) -> CosimResult<()> {
        self.interface.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example_components::FakeActionInterface;

    fn participant() -> (ActionParticipant<FakeActionInterface>, VertexBinding) {
        let interface = FakeActionInterface::new(2, 1).with_next_window(0.25);
        let mut participant = ActionParticipant::new(interface);
        let binding = participant.set_mesh_vertex("MassMesh", &[0.0, 0.0]).unwrap();
        (participant, binding)
    }

    fn calls(participant: &ActionParticipant<FakeActionInterface>) -> Vec<String> {
        participant.interface().calls().borrow().clone()
    }

    #[test]
    fn initialization_sequence() {
        let (mut participant, binding) = participant();
        let field = DataField::scalar("Displacement");

        assert!(participant.requires_initial_data().unwrap());
        participant
            .write_initial_data(&field, binding, &CouplingBuffer::Scalar(0.1))
            .unwrap();
        participant.initialize().unwrap();

        assert_eq!(
            calls(&participant),
            vec![
                "mesh_id MassMesh",
                "initialize",
                "data_id Displacement",
                "fulfilled WriteInitialData",
                "initialize_data",
            ]
        );
        assert_eq!(participant.interface().written, vec![(2, vec![0.1])]);
        assert_eq!(participant.max_time_step_size().unwrap(), 0.5);
    }

    #[test]
    fn initialize_without_initial_data_query() {
        let (mut participant, _) = participant();
        participant.initialize().unwrap();
        assert_eq!(participant.max_time_step_size().unwrap(), 0.5);
        assert!(participant.initialize().is_err());
    }

    #[test]
    fn window_size_before_initialization() {
        let (mut participant, _) = participant();
        let err = participant.max_time_step_size().unwrap_err();
        assert!(matches!(err, CosimError::CouplingProtocol(_)));
    }

    #[test]
    fn checkpoint_actions_wait_for_the_checkpoint() {
        let (mut participant, _) = participant();
        participant.initialize().unwrap();

        // Still required until the checkpoint has been taken
        assert!(participant.requires_writing_checkpoint().unwrap());
        assert!(participant.requires_writing_checkpoint().unwrap());
        assert!(!calls(&participant).iter().any(|c| c.starts_with("fulfilled")));

        participant.checkpoint_written().unwrap();
        assert!(!participant.requires_writing_checkpoint().unwrap());
        assert_eq!(
            calls(&participant).last().unwrap(),
            "fulfilled WriteIterationCheckpoint"
        );
        // Nothing left to acknowledge
        participant.checkpoint_written().unwrap();

        participant.advance(0.5).unwrap();
        assert!(participant.requires_reading_checkpoint().unwrap());
        participant.checkpoint_read().unwrap();
        assert!(!participant.requires_reading_checkpoint().unwrap());
        assert_eq!(participant.max_time_step_size().unwrap(), 0.25);

        participant.advance(0.25).unwrap();
        assert!(!participant.requires_reading_checkpoint().unwrap());
        assert!(participant.requires_writing_checkpoint().unwrap());
        assert!(participant.is_coupling_ongoing().unwrap());
    }

    #[test]
    fn data_access_by_representation() {
        let (mut participant, binding) = participant();
        participant.initialize().unwrap();

        let scalar = DataField::scalar("Force");
        let vector = DataField::vector("Velocity", 2).unwrap();
        assert_eq!(
            participant.read_data(&scalar, binding, 0.5).unwrap(),
            CouplingBuffer::Scalar(1.0)
        );
        assert_eq!(
            participant.read_data(&vector, binding, 0.5).unwrap(),
            CouplingBuffer::Vector(vec![1.0, 2.0])
        );

        participant
            .write_data(&vector, binding, &CouplingBuffer::Vector(vec![3.0, 4.0]))
            .unwrap();
        let err = participant
            .write_data(&vector, binding, &CouplingBuffer::Scalar(3.0))
            .unwrap_err();
        assert!(matches!(err, CosimError::CouplingProtocol(_)));

        // Ids are looked up once per field
        let lookups = calls(&participant)
            .iter()
            .filter(|c| c.starts_with("data_id"))
            .count();
        assert_eq!(lookups, 2);
    }

    #[test]
    fn data_before_vertex_registration() {
        let mut participant = ActionParticipant::new(FakeActionInterface::new(2, 1));
        participant.initialize().unwrap();
        let err = participant
            .read_data(&DataField::scalar("Force"), VertexBinding(0), 0.5)
            .unwrap_err();
        assert!(matches!(err, CosimError::CouplingProtocol(_)));
    }
}
