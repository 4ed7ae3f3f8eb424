//! In-memory cluster implementing every collaborator trait.
//!
//! Backs `gangctl evaluate` and the reconciler tests. Cloning shares the
//! underlying state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::bail;

use gangway_types::{JobKey, JobStatus, MetricReading, MetricSpec, PodObservation, TrainingJob};

use crate::collaborators::{JobStore, MetricSource, PodMaterializer, StatusWriter};
use crate::plan::MaterializationPlan;

#[derive(Debug, Default)]
struct Inner {
    jobs: BTreeMap<JobKey, TrainingJob>,
    pods: BTreeMap<JobKey, Vec<PodObservation>>,
    readings: BTreeMap<JobKey, Vec<MetricReading>>,
    plans: BTreeMap<JobKey, MaterializationPlan>,
    invalid: BTreeMap<JobKey, String>,
    applies: usize,
    status_writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a job.
    pub fn put_job(&self, job: TrainingJob) {
        self.lock().jobs.insert(job.key.clone(), job);
    }

    pub fn remove_job(&self, key: &JobKey) {
        let mut inner = self.lock();
        inner.jobs.remove(key);
        inner.pods.remove(key);
        inner.readings.remove(key);
    }

    pub fn set_pods(&self, key: &JobKey, pods: Vec<PodObservation>) {
        self.lock().pods.insert(key.clone(), pods);
    }

    pub fn set_readings(&self, key: &JobKey, readings: Vec<MetricReading>) {
        self.lock().readings.insert(key.clone(), readings);
    }

    pub fn job(&self, key: &JobKey) -> Option<TrainingJob> {
        self.lock().jobs.get(key).cloned()
    }

    /// Last plan applied for `key`.
    pub fn plan(&self, key: &JobKey) -> Option<MaterializationPlan> {
        self.lock().plans.get(key).cloned()
    }

    pub fn invalid_reason(&self, key: &JobKey) -> Option<String> {
        self.lock().invalid.get(key).cloned()
    }

    pub fn apply_count(&self) -> usize {
        self.lock().applies
    }

    pub fn status_write_count(&self) -> usize {
        self.lock().status_writes
    }
}

impl JobStore for MemoryCluster {
    fn list_jobs(&self) -> anyhow::Result<Vec<JobKey>> {
        Ok(self.lock().jobs.keys().cloned().collect())
    }

    fn get_job(&self, key: &JobKey) -> anyhow::Result<Option<TrainingJob>> {
        Ok(self.job(key))
    }

    fn list_pods(&self, key: &JobKey) -> anyhow::Result<Vec<PodObservation>> {
        Ok(self.lock().pods.get(key).cloned().unwrap_or_default())
    }
}

impl MetricSource for MemoryCluster {
    fn latest(&self, key: &JobKey, metrics: &[MetricSpec]) -> anyhow::Result<Vec<MetricReading>> {
        let inner = self.lock();
        let Some(readings) = inner.readings.get(key) else {
            return Ok(Vec::new());
        };
        Ok(readings
            .iter()
            .filter(|r| metrics.iter().any(|m| m.name == r.name))
            .cloned()
            .collect())
    }
}

impl PodMaterializer for MemoryCluster {
    fn apply(&self, key: &JobKey, plan: &MaterializationPlan) -> anyhow::Result<()> {
        let mut inner = self.lock();
        inner.plans.insert(key.clone(), plan.clone());
        inner.applies += 1;
        Ok(())
    }
}

impl StatusWriter for MemoryCluster {
    fn write_status(&self, key: &JobKey, status: &JobStatus) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get_mut(key) else {
            bail!("cannot write status: job {key} not found");
        };
        job.status = status.clone();
        inner.invalid.remove(key);
        inner.status_writes += 1;
        Ok(())
    }

    fn record_invalid(&self, key: &JobKey, reason: &str) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if !inner.jobs.contains_key(key) {
            bail!("cannot record invalid config: job {key} not found");
        }
        inner.invalid.insert(key.clone(), reason.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use gangway_types::{JobPhase, JobSpec};

    fn job(name: &str) -> TrainingJob {
        TrainingJob {
            key: JobKey::new("default", name),
            spec: JobSpec {
                replica_specs: BTreeMap::new(),
                elastic_policy: None,
            },
            status: JobStatus::default(),
        }
    }

    #[test]
    fn clones_share_state() {
        let cluster = MemoryCluster::new();
        let other = cluster.clone();
        cluster.put_job(job("a"));

        assert_eq!(other.list_jobs().unwrap(), vec![JobKey::new("default", "a")]);
    }

    #[test]
    fn write_status_updates_job_and_clears_invalid() {
        let cluster = MemoryCluster::new();
        let key = JobKey::new("default", "a");
        cluster.put_job(job("a"));
        cluster.record_invalid(&key, "bad bounds").unwrap();
        assert_eq!(cluster.invalid_reason(&key).as_deref(), Some("bad bounds"));

        let status = JobStatus {
            phase: JobPhase::Running,
            ..Default::default()
        };
        cluster.write_status(&key, &status).unwrap();

        assert_eq!(cluster.job(&key).unwrap().status.phase, JobPhase::Running);
        assert!(cluster.invalid_reason(&key).is_none());
        assert_eq!(cluster.status_write_count(), 1);
    }

    #[test]
    fn write_status_for_unknown_job_fails() {
        let cluster = MemoryCluster::new();
        let err = cluster
            .write_status(&JobKey::new("default", "ghost"), &JobStatus::default())
            .unwrap_err();
        assert!(err.to_string().contains("default/ghost"));
    }

    #[test]
    fn latest_filters_to_requested_metrics() {
        let cluster = MemoryCluster::new();
        let key = JobKey::new("default", "a");
        cluster.set_readings(
            &key,
            vec![
                MetricReading {
                    name: "cpu".to_string(),
                    value: 80.0,
                },
                MetricReading {
                    name: "gpu".to_string(),
                    value: 40.0,
                },
            ],
        );
        let wanted = [MetricSpec {
            name: "gpu".to_string(),
            target_value: 50.0,
        }];

        let readings = cluster.latest(&key, &wanted).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].name, "gpu");
        assert!(cluster.latest(&JobKey::new("default", "b"), &wanted).unwrap().is_empty());
    }
}
