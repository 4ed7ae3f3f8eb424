//! Configuration error taxonomy.
//!
//! A `ConfigError` is permanent: the job spec itself is wrong, and no
//! amount of retrying fixes it until the spec changes. Observation gaps
//! (unterminated containers, missing metrics) are never errors.

use thiserror::Error;

use crate::types::ReplicaRole;

/// Result type alias for spec validation and evaluation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid job or policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("elastic policy bounds are inverted: min_replicas={min} > max_replicas={max}")]
    InvertedBounds { min: i32, max: i32 },

    #[error("elastic policy {field} must not be negative, got {value}")]
    NegativeBound { field: &'static str, value: i32 },

    #[error("standalone elastic policy must not set min_replicas or max_replicas")]
    StandaloneWithBounds,

    #[error("elastic policy max_restarts must not be negative, got {0}")]
    NegativeMaxRestarts(i32),

    #[error("elastic policy n_proc_per_node must be at least 1, got {0}")]
    InvalidNProcPerNode(i32),

    #[error("elastic policy rdzv_port must be in 1..=65535, got {0}")]
    InvalidRdzvPort(i32),

    #[error("replica index {index:?} is not a valid rank")]
    InvalidRank { index: String },

    #[error("job declares no replica specs")]
    NoReplicaSpecs,

    #[error("coordinator role must have exactly 1 replica, got {0}")]
    CoordinatorReplicas(u32),

    #[error("job has no {0} replica spec")]
    MissingRole(ReplicaRole),

    #[error("invalid manifest: {0}")]
    Manifest(String),
}
