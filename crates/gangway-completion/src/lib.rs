//! gangway-completion: decides whether a training job is done.
//!
//! This crate turns raw container statuses into a job phase. It has three
//! layers:
//!
//! - **`exit`**: per-container termination codes and per-replica outcomes
//! - **`policy`**: role-scoped success/failure predicates over a job's
//!   replica outcome table
//! - **`evaluator`**: the job phase state machine
//!
//! # State machine
//!
//! ```text
//! Created ──▶ Running ──▶ Succeeded
//!               │  ▲  ╲
//!               ▼  │   ▶ Failed
//!            Restarting ─┘
//! ```
//!
//! Success is checked before failure on every tick. A replica whose
//! containers have not terminated never counts toward either verdict.

pub mod evaluator;
pub mod exit;
pub mod policy;

pub use evaluator::{CompletionEvaluator, PhaseDecision, ReplicaRef};
pub use exit::{ReplicaOutcome, container_exit_code, replica_outcome};
pub use policy::OutcomeTable;
