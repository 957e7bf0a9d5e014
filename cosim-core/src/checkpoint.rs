//! Saved model state used to replay a coupling window.

use crate::clock::Time;
use crate::errors::CosimResult;
use crate::model::ModelAdapter;
use std::any::Any;
use std::fmt;

/// Opaque full-state capture of a model instance.
///
/// Tokens are numbered by the adapter that produced them so that a token can
/// only be restored into the snapshot sequence it came from.
pub struct StateToken {
    serial: u64,
    state: Box<dyn Any>,
}

impl StateToken {
    pub fn new(serial: u64, state: Box<dyn Any>) -> Self {
        Self { serial, state }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn state(&self) -> &dyn Any {
        self.state.as_ref()
    }
}

impl fmt::Debug for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateToken")
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// A model state snapshot together with the time it was taken at.
///
/// At most one checkpoint is alive at a time.
/// A checkpoint is either consumed by [`Checkpoint::restore`] or dropped
/// when its window commits.
#[derive(Debug)]
pub struct Checkpoint {
    state_token: StateToken,
    t_cp: Time,
}

impl Checkpoint {
    /// Snapshot `model` at time `t`.
    pub fn capture(model: &mut dyn ModelAdapter, t: Time) -> CosimResult<Self> {
        let state_token = model.snapshot_state()?;
        Ok(Self { state_token, t_cp: t })
    }

    /// Time the checkpoint was taken at.
    pub fn time(&self) -> Time {
        self.t_cp
    }

    /// Put `model` back into the saved state, returning the checkpoint time.
    pub fn restore(self, model: &mut dyn ModelAdapter) -> CosimResult<Time> {
        model.restore_state(self.state_token)?;
        Ok(self.t_cp)
    }
}
