//! Error taxonomy for workflow runs.
//!
//! Validation failures are not errors: they travel on
//! [`GenerationResponse::validation_errors`](crate::ai::GenerationResponse).

use std::path::PathBuf;

use crate::ai::{AdapterError, BudgetExceeded, ProviderError};
use crate::core::ConfigError;
use crate::workflow::ManifestError;

/// Any failure that halts a run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("gate '{gate}' rejected at step {step}")]
    GateRejected { step: String, gate: String },

    #[error("{provider} failed after {attempts} attempt(s): {source}")]
    Provider {
        provider: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Budget(#[from] BudgetExceeded),

    #[error("failed to write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("invalid generation request: {0}")]
    Request(String),

    #[error("run cancelled")]
    Cancelled,
}

impl From<AdapterError> for WorkflowError {
    fn from(error: AdapterError) -> Self {
        match error {
            AdapterError::Budget(e) => Self::Budget(e),
            AdapterError::Provider { provider, attempts, source } => Self::Provider { provider, attempts, source },
        }
    }
}

impl WorkflowError {
    /// Whether the operator chose to stop (as opposed to a failure).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
