//! gangway-elastic: effective replica bounds and rendezvous settings.
//!
//! Turns a job's `ElasticPolicy` (plus optional scaling-metric readings)
//! into the replica count to materialize, the rendezvous configuration
//! handed to the training launcher, and the job's restart budget.
//!
//! # Scaling Algorithm
//!
//! ```text
//! (min, max) = policy bounds, unset sides defaulting to the static count
//!
//! for each metric with a reading:
//!     proposal = ceil(current_replicas * (value / target_value))
//! target = clamp(max(proposals), min, max)
//!
//! no readings:  target = max_replicas, else the static count
//! standalone:   target = 1, no rendezvous
//! ```
//!
//! Invalid policies are rejected with a `ConfigError`; nothing is
//! silently clamped into validity.

pub mod evaluator;
pub mod rendezvous;

pub use evaluator::{ElasticDecision, ElasticEvaluator, ElasticMode, ScalingInput, validate};
pub use rendezvous::RendezvousConfig;
