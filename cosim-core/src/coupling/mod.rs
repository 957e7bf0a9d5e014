//! The coupling middleware as seen by the co-simulation loop.
//!
//! [`CouplingParticipant`] is shaped after the current generation of the
//! middleware API. Older, action based interfaces are adapted to it by
//! [`ActionParticipant`], so the loop is written against a single contract.
//!
//! Two in-process participants are provided:
//! - [`ScriptedParticipant`] follows a fixed plan and journals every call
//! - [`SerialCoupling`] steps a peer model in lockstep with the local one

mod action;
mod scripted;
mod serial;

pub use action::{Action, ActionInterface, ActionParticipant, DataId, MeshId};
pub use scripted::{Call, Journal, ScriptedParticipant, WindowAttempt};
pub use serial::{ImplicitSettings, SerialCoupling};

use crate::clock::Time;
use crate::errors::CosimResult;
use crate::field::{DataField, VertexBinding};
use crate::marshal::CouplingBuffer;
use serde::{Deserialize, Serialize};

/// Whether a coupling window can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouplingScheme {
    /// Every window is committed after a single exchange.
    #[default]
    Explicit,
    /// A window may be rolled back and retried until the peer converges.
    Implicit,
}

/// A participant in a coupled simulation.
///
/// Calls may block on synchronization with other participants.
/// Query methods take `&mut self` because answering them may require
/// talking to the middleware.
pub trait CouplingParticipant {
    fn name(&self) -> &str;

    /// Spatial dimensions of the mesh.
    fn mesh_dimensions(&mut self, mesh_name: &str) -> CosimResult<usize>;

    /// Register the single exchange vertex at `position`.
    fn set_mesh_vertex(&mut self, mesh_name: &str, position: &[f64])
        -> CosimResult<VertexBinding>;

    /// Number of components of a field as known to the middleware, if it knows.
    fn data_dimensions(&mut self, _mesh_name: &str, _field_name: &str) -> Option<usize> {
        None
    }

    /// Whether initial data must be written before [`CouplingParticipant::initialize`].
    fn requires_initial_data(&mut self) -> CosimResult<bool>;

    fn write_initial_data(
        &mut self,
        field: &DataField,
        binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()>;

    /// One-time setup; called exactly once per run.
    fn initialize(&mut self) -> CosimResult<()>;

    fn is_coupling_ongoing(&mut self) -> CosimResult<bool>;

    /// Size of the next window. The loop always steps by exactly this amount.
    fn max_time_step_size(&mut self) -> CosimResult<Time>;

    fn read_data(
        &mut self,
        field: &DataField,
        binding: VertexBinding,
        dt: Time,
    ) -> CosimResult<CouplingBuffer>;

    fn write_data(
        &mut self,
        field: &DataField,
        binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()>;

    /// True at the start of a window of an implicit scheme.
    fn requires_writing_checkpoint(&mut self) -> CosimResult<bool>;

    /// Evaluated after [`CouplingParticipant::advance`]; true if the window
    /// did not converge and must be retried from the checkpoint.
    fn requires_reading_checkpoint(&mut self) -> CosimResult<bool>;

    /// The checkpoint asked for by
    /// [`CouplingParticipant::requires_writing_checkpoint`] has been taken.
    fn checkpoint_written(&mut self) -> CosimResult<()> {
        Ok(())
    }

    /// The model has been restored after
    /// [`CouplingParticipant::requires_reading_checkpoint`] asked for it.
    fn checkpoint_read(&mut self) -> CosimResult<()> {
        Ok(())
    }

    /// Commit the exchanged data for the window and synchronize with the peers.
    fn advance(&mut self, dt: Time) -> CosimResult<()>;

    /// One-time teardown.
    fn finalize(&mut self) -> CosimResult<()>;
}
