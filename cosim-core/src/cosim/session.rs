//! Scoped ownership of the participant session and the model instance.
//!
//! Both guards clean up when dropped, so every exit from the loop,
//! including early returns on errors, finalizes the coupling and releases
//! the model.

use crate::coupling::CouplingParticipant;
use crate::errors::CosimResult;
use crate::model::ModelAdapter;
use log::error;
use std::ops::{Deref, DerefMut};

/// Finalizes the participant once, explicitly or on drop.
pub(crate) struct ParticipantSession<'a> {
    participant: &'a mut dyn CouplingParticipant,
    finalized: bool,
}

impl<'a> ParticipantSession<'a> {
    pub fn new(participant: &'a mut dyn CouplingParticipant) -> Self {
        Self {
            participant,
            finalized: false,
        }
    }

    pub fn finalize(&mut self) -> CosimResult<()> {
        self.finalized = true;
        self.participant.finalize()
    }
}

impl<'a> Deref for ParticipantSession<'a> {
    type Target = dyn CouplingParticipant + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.participant
    }
}

impl<'a> DerefMut for ParticipantSession<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.participant
    }
}

impl Drop for ParticipantSession<'_> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        if let Err(err) = self.participant.finalize() {
            error!(
                "Failed to finalize participant '{}': {}",
                self.participant.name(),
                err
            );
        }
    }
}

/// Releases the model once, explicitly or on drop.
pub(crate) struct ModelSession<'a> {
    model: &'a mut dyn ModelAdapter,
}

impl<'a> ModelSession<'a> {
    pub fn new(model: &'a mut dyn ModelAdapter) -> Self {
        Self { model }
    }

    pub fn release(&mut self) -> CosimResult<()> {
        self.model.release()
    }
}

impl<'a> Deref for ModelSession<'a> {
    type Target = dyn ModelAdapter + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.model
    }
}

impl<'a> DerefMut for ModelSession<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.model
    }
}

impl Drop for ModelSession<'_> {
    fn drop(&mut self) {
        // Releasing is idempotent
        if let Err(err) = self.model.release() {
            error!("Failed to release model '{}': {}", self.model.model_name(), err);
        }
    }
}
