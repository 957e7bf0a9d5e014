use crate::clock::Time;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for failures during a coupled run.
///
/// Every variant except [`CosimError::ResultWrite`] is fatal for the run.
/// A coupling rollback is normal control flow and never surfaces as an error.
#[derive(Error, Debug)]
pub enum CosimError {
    /// Missing or invalid settings, detected before the loop starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The coupling scheme requires a capability the model cannot provide.
    #[error("Implicit coupling not possible: {reason}. Alternatively, choose an explicit coupling scheme.")]
    Capability { reason: String },

    #[error("Data shape mismatch for field '{field}': declared dimensionality {declared}, got {actual} values")]
    DataShape {
        field: String,
        declared: usize,
        actual: usize,
    },

    /// The model rejected or diverged on a step.
    #[error("Model step from t={t} with dt={dt} failed: {reason}")]
    ModelStep { t: Time, dt: Time, reason: String },

    #[error("Model access failed: {0}")]
    ModelAccess(String),

    #[error("State token {serial} is not the most recent snapshot of this model (expected {expected:?})")]
    InvalidStateToken { serial: u64, expected: Option<u64> },

    /// The coupling participant reported an unexpected or contradictory state.
    #[error("Coupling protocol error: {0}")]
    CouplingProtocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to write results to {}: {details}", path.display())]
    ResultWrite { path: PathBuf, details: String },
}

impl CosimError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::CouplingProtocol(message.into())
    }

    /// Returns true if the error must abort the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ResultWrite { .. })
    }
}

/// Convenience type for `Result<T, CosimError>`.
pub type CosimResult<T> = Result<T, CosimError>;
