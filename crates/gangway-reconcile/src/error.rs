//! Reconciler error types.

use thiserror::Error;

use gangway_types::{ConfigError, JobKey};

/// Errors that can occur while reconciling a job.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid job configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("job not found: {0}")]
    JobNotFound(JobKey),

    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl ReconcileError {
    /// Configuration errors persist until the spec changes.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ReconcileError::Config(_))
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
