//! gangway-reconcile: one evaluation tick per job.
//!
//! Wires the three evaluators together and talks to the cluster only
//! through explicit collaborator traits:
//!
//! ```text
//! Reconciler
//!   ├── JobStore        (read TrainingJob + observed pods)
//!   ├── MetricSource    (optional scaling-metric readings)
//!   ├── tick()          (pure: elastic → completion → preemption)
//!   ├── PodMaterializer (idempotent create/patch/delete of the plan)
//!   └── StatusWriter    (phase + restart count, or invalid-config reason)
//! ```
//!
//! A tick that fails validation writes nothing but the invalid-config
//! reason. Retrying collaborator failures is left to the collaborators.

pub mod collaborators;
pub mod error;
pub mod memory;
pub mod plan;
pub mod reconciler;

pub use collaborators::{JobStore, MetricSource, PodMaterializer, StatusWriter};
pub use error::{ReconcileError, ReconcileResult};
pub use memory::MemoryCluster;
pub use plan::{MaterializationPlan, PodPlan};
pub use reconciler::{Reconciler, TickOutput};
