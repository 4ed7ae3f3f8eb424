//! gangway-types: shared data model for the gangway policy engine.
//!
//! Everything the four evaluators consume or produce lives here: the
//! job spec (replica roles, replica specs, elastic policy), the observed
//! pod state (container statuses, termination codes), and the job status
//! the external status writer persists.
//!
//! # Architecture
//!
//! All types are plain owned values (`Clone` + serde). A `TrainingJob`
//! snapshot is read once per reconciliation tick and never mutated by the
//! engine; evaluators return new values instead.
//!
//! Roles key a `BTreeMap`, so every iteration over a job's roles is
//! deterministic (Coordinator before Worker).

pub mod config;
pub mod error;
pub mod manifest;
pub mod types;

pub use config::EngineConfig;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
