//! Interfaces to the cluster-facing collaborators.
//!
//! The engine never reaches the cluster on its own; everything it reads
//! or writes goes through these traits, so a tick can run against the
//! in-memory [`MemoryCluster`](crate::MemoryCluster) in tests.

use gangway_types::{JobKey, JobStatus, MetricReading, MetricSpec, PodObservation, TrainingJob};

use crate::plan::MaterializationPlan;

/// Read-only view of jobs and their pods.
pub trait JobStore: Send + Sync {
    fn list_jobs(&self) -> anyhow::Result<Vec<JobKey>>;

    fn get_job(&self, key: &JobKey) -> anyhow::Result<Option<TrainingJob>>;

    fn list_pods(&self, key: &JobKey) -> anyhow::Result<Vec<PodObservation>>;
}

/// Source of scaling-metric readings. An empty result means no signal.
pub trait MetricSource: Send + Sync {
    fn latest(&self, key: &JobKey, metrics: &[MetricSpec]) -> anyhow::Result<Vec<MetricReading>>;
}

/// Creates, patches and deletes pods so the cluster matches a plan.
/// Must be idempotent: the same plan may be applied on every tick.
pub trait PodMaterializer: Send + Sync {
    fn apply(&self, key: &JobKey, plan: &MaterializationPlan) -> anyhow::Result<()>;
}

/// Persists the job status.
pub trait StatusWriter: Send + Sync {
    fn write_status(&self, key: &JobKey, status: &JobStatus) -> anyhow::Result<()>;

    /// Report a configuration error on the job without touching its phase.
    fn record_invalid(&self, key: &JobKey, reason: &str) -> anyhow::Result<()>;
}
