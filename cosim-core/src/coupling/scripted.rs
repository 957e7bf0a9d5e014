//! A deterministic in-process participant.
//!
//! Runs a fixed number of windows of constant size and follows a rollback
//! plan under the implicit scheme. Read data comes from a caller supplied
//! source. Every call is appended to a shared [`Journal`] so that the calling
//! sequence can be inspected after the participant has been moved into a run.

use crate::clock::{FloatValue, Time};
use crate::coupling::{CouplingParticipant, CouplingScheme};
use crate::errors::{CosimError, CosimResult};
use crate::field::{DataField, VertexBinding};
use crate::marshal::CouplingBuffer;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Position of a read within the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttempt {
    /// Window being attempted, starting at 1.
    pub window: usize,
    /// Number of rollbacks of this window so far.
    pub iteration: usize,
}

/// A call received by a [`ScriptedParticipant`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MeshDimensions,
    SetMeshVertex,
    RequiresInitialData,
    WriteInitialData(Vec<FloatValue>),
    Initialize,
    IsCouplingOngoing,
    MaxTimeStepSize,
    ReadData(WindowAttempt),
    WriteData(Vec<FloatValue>),
    RequiresWritingCheckpoint,
    RequiresReadingCheckpoint,
    Advance(Time),
    Finalize,
}

/// Calls shared between a participant and whoever inspects it.
pub type Journal = Rc<RefCell<Vec<Call>>>;

type ReadSource = Box<dyn FnMut(&DataField, WindowAttempt) -> Vec<FloatValue>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Initialized,
    Finalized,
}

pub struct ScriptedParticipant {
    name: String,
    scheme: CouplingScheme,
    dt: Time,
    windows: usize,
    rollback_plan: HashMap<usize, usize>,
    mesh_dimensions: usize,
    data_dimensions: HashMap<String, usize>,
    initial_data_required: bool,
    read_source: ReadSource,
    journal: Journal,

    phase: Phase,
    committed: usize,
    iteration: usize,
    checkpoint_requested: bool,
    rolled_back: bool,
}

impl ScriptedParticipant {
    /// `windows` windows of size `dt`, each committed after one exchange.
    pub fn explicit(name: impl Into<String>, dt: Time, windows: usize) -> Self {
        Self::new(name, CouplingScheme::Explicit, dt, windows)
    }

    /// `windows` windows of size `dt` which converge immediately unless a
    /// rollback is planned with [`ScriptedParticipant::with_rollbacks`].
    pub fn implicit(name: impl Into<String>, dt: Time, windows: usize) -> Self {
        Self::new(name, CouplingScheme::Implicit, dt, windows)
    }

    fn new(name: impl Into<String>, scheme: CouplingScheme, dt: Time, windows: usize) -> Self {
        Self {
            name: name.into(),
            scheme,
            dt,
            windows,
            rollback_plan: HashMap::new(),
            mesh_dimensions: 3,
            data_dimensions: HashMap::new(),
            initial_data_required: false,
            read_source: Box::new(|field, _| vec![0.0; field.dimensionality()]),
            journal: Rc::new(RefCell::new(Vec::new())),
            phase: Phase::Created,
            committed: 0,
            iteration: 0,
            checkpoint_requested: false,
            rolled_back: false,
        }
    }

    /// Roll `window` (starting at 1) back `count` times before it converges.
    ///
    /// Ignored under the explicit scheme.
    pub fn with_rollbacks(mut self, window: usize, count: usize) -> Self {
        self.rollback_plan.insert(window, count);
        self
    }

    /// Supply the values returned by every read.
    ///
    /// A single value is delivered as a scalar for scalar fields, anything
    /// else as a vector.
    pub fn with_read_source<F>(mut self, source: F) -> Self
    where
        F: FnMut(&DataField, WindowAttempt) -> Vec<FloatValue> + 'static,
    {
        self.read_source = Box::new(source);
        self
    }

    pub fn with_initial_data_required(mut self) -> Self {
        self.initial_data_required = true;
        self
    }

    pub fn with_mesh_dimensions(mut self, dimensions: usize) -> Self {
        self.mesh_dimensions = dimensions;
        self
    }

    /// Report `dimensions` components for `field` from [`CouplingParticipant::data_dimensions`].
    pub fn with_data_dimensions(mut self, field: impl Into<String>, dimensions: usize) -> Self {
        self.data_dimensions.insert(field.into(), dimensions);
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Number of windows that have converged.
    pub fn committed_windows(&self) -> usize {
        self.committed
    }

    fn record(&self, call: Call) {
        self.journal.borrow_mut().push(call);
    }

    fn ensure_running(&self, operation: &str) -> CosimResult<()> {
        match self.phase {
            Phase::Initialized => Ok(()),
            Phase::Created => Err(CosimError::protocol(format!(
                "{}: {} before initialize",
                self.name, operation
            ))),
            Phase::Finalized => Err(CosimError::protocol(format!(
                "{}: {} after finalize",
                self.name, operation
            ))),
        }
    }
}

impl fmt::Debug for ScriptedParticipant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedParticipant")
            .field("name", &self.name)
            .field("scheme", &self.scheme)
            .field("dt", &self.dt)
            .field("windows", &self.windows)
            .field("committed", &self.committed)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl CouplingParticipant for ScriptedParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn mesh_dimensions(&mut self, _mesh_name: &str) -> CosimResult<usize> {
        self.record(Call::MeshDimensions);
        Ok(self.mesh_dimensions)
    }

    fn set_mesh_vertex(&mut self, _mesh_name: &str, position: &[f64]) -> CosimResult<VertexBinding> {
        self.record(Call::SetMeshVertex);
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
        self.data_dimensions.get(field_name).copied()
    }

    fn requires_initial_data(&mut self) -> CosimResult<bool> {
        self.record(Call::RequiresInitialData);
        Ok(self.initial_data_required)
    }

    fn write_initial_data(
        &mut self,
        _field: &DataField,
        _binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()> {
        self.record(Call::WriteInitialData(buffer.as_slice().to_vec()));
        if self.phase != Phase::Created {
            return Err(CosimError::protocol(format!(
                "{}: initial data written after initialize",
                self.name
            )));
        }
        Ok(())
    }

    fn initialize(&mut self) -> CosimResult<()> {
        self.record(Call::Initialize);
        if self.phase != Phase::Created {
            return Err(CosimError::protocol(format!(
                "{}: initialized twice",
                self.name
            )));
        }
        self.phase = Phase::Initialized;
        Ok(())
    }

    fn is_coupling_ongoing(&mut self) -> CosimResult<bool> {
        self.record(Call::IsCouplingOngoing);
        self.ensure_running("is_coupling_ongoing")?;
        Ok(self.committed < self.windows)
    }

    fn max_time_step_size(&mut self) -> CosimResult<Time> {
        self.record(Call::MaxTimeStepSize);
        self.ensure_running("max_time_step_size")?;
        Ok(self.dt)
    }

    fn read_data(
        &mut self,
        field: &DataField,
        _binding: VertexBinding,
        _dt: Time,
    ) -> CosimResult<CouplingBuffer> {
        let attempt = WindowAttempt {
            window: self.committed + 1,
            iteration: self.iteration,
        };
        self.record(Call::ReadData(attempt));
        self.ensure_running("read_data")?;

        let values = (self.read_source)(field, attempt);
        if field.is_scalar() && values.len() == 1 {
            Ok(CouplingBuffer::Scalar(values[0]))
        } else {
            Ok(CouplingBuffer::Vector(values))
        }
    }

    fn write_data(
        &mut self,
        _field: &DataField,
        _binding: VertexBinding,
        buffer: &CouplingBuffer,
    ) -> CosimResult<()> {
        self.record(Call::WriteData(buffer.as_slice().to_vec()));
        self.ensure_running("write_data")
    }

    fn requires_writing_checkpoint(&mut self) -> CosimResult<bool> {
        self.record(Call::RequiresWritingCheckpoint);
        self.ensure_running("requires_writing_checkpoint")?;
        let required = self.scheme == CouplingScheme::Implicit && !self.checkpoint_requested;
        self.checkpoint_requested = true;
        Ok(required)
    }

    fn requires_reading_checkpoint(&mut self) -> CosimResult<bool> {
        self.record(Call::RequiresReadingCheckpoint);
        self.ensure_running("requires_reading_checkpoint")?;
        if self.scheme == CouplingScheme::Explicit {
            return Err(CosimError::protocol(format!(
                "{}: reading checkpoint queried under an explicit scheme",
                self.name
            )));
        }
        Ok(self.rolled_back)
    }

    fn advance(&mut self, dt: Time) -> CosimResult<()> {
        self.record(Call::Advance(dt));
        self.ensure_running("advance")?;
        if dt != self.dt {
            return Err(CosimError::protocol(format!(
                "{}: advanced by {} but the window size is {}",
                self.name, dt, self.dt
            )));
        }

        let window = self.committed + 1;
        let planned = match self.scheme {
            CouplingScheme::Explicit => 0,
            CouplingScheme::Implicit => self.rollback_plan.get(&window).copied().unwrap_or(0),
        };
        if self.iteration < planned {
            self.iteration += 1;
            self.rolled_back = true;
        } else {
            self.committed += 1;
            self.iteration = 0;
            self.checkpoint_requested = false;
            self.rolled_back = false;
        }
        Ok(())
    }

    fn finalize(&mut self) -> CosimResult<()> {
        self.record(Call::Finalize);
        if self.phase == Phase::Finalized {
            return Err(CosimError::protocol(format!(
                "{}: finalized twice",
                self.name
            )));
        }
        self.phase = Phase::Finalized;
        Ok(())
    }
}
