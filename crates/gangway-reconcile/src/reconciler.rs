//! Per-job reconcile tick and the periodic resync loop.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use gangway_completion::{CompletionEvaluator, PhaseDecision};
use gangway_elastic::{ElasticDecision, ElasticEvaluator, ScalingInput};
use gangway_preemption::PreemptionLabeler;
use gangway_types::{
    ConfigResult, EngineConfig, JobKey, JobPhase, JobSpec, MetricReading, PodObservation,
    ReplicaRole, TrainingJob, parse_rank,
};

use crate::collaborators::{JobStore, MetricSource, PodMaterializer, StatusWriter};
use crate::error::{ReconcileError, ReconcileResult};
use crate::plan::{
    JOB_NAME_LABEL, MaterializationPlan, PodPlan, REPLICA_INDEX_LABEL, REPLICA_ROLE_LABEL,
};

/// Result of one evaluation tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutput {
    pub elastic: ElasticDecision,
    pub decision: PhaseDecision,
    pub plan: MaterializationPlan,
}

/// Drives evaluation ticks for every job in the store.
pub struct Reconciler {
    elastic: ElasticEvaluator,
    labeler: PreemptionLabeler,
    store: Arc<dyn JobStore>,
    metrics: Option<Arc<dyn MetricSource>>,
    materializer: Arc<dyn PodMaterializer>,
    status: Arc<dyn StatusWriter>,
}

impl Reconciler {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn JobStore>,
        materializer: Arc<dyn PodMaterializer>,
        status: Arc<dyn StatusWriter>,
    ) -> Self {
        Self {
            elastic: ElasticEvaluator::new(config),
            labeler: PreemptionLabeler::new(config),
            store,
            metrics: None,
            materializer,
            status,
        }
    }

    /// Read scaling metrics from `source` for elastic jobs.
    pub fn with_metric_source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.metrics = Some(source);
        self
    }

    /// Evaluate one job against a snapshot. Pure; touches no collaborator.
    ///
    /// Order: elastic bounds first (they fix the restart budget and the
    /// planned worker count), then the phase machine, then the pod plan.
    /// The phase is judged over every declared or observed replica, never
    /// just the scaled target.
    pub fn tick(
        &self,
        job: &TrainingJob,
        pods: &[PodObservation],
        readings: &[MetricReading],
    ) -> ConfigResult<TickOutput> {
        job.spec.validate()?;

        let input = ScalingInput {
            static_replicas: job.spec.replicas(ReplicaRole::Worker),
            current_replicas: observed_workers(pods)?,
            readings: readings.to_vec(),
        };
        let elastic = self
            .elastic
            .evaluate(job.spec.elastic_policy.as_ref(), &input)?;

        let decision = CompletionEvaluator::for_job(&job.spec, elastic.restart_budget).evaluate(
            &job.spec,
            &job.status,
            pods,
        )?;

        let planned = planned_spec(&job.spec, elastic.target_replicas);
        let plan = self.plan(&job.key, &planned, &elastic, &decision)?;
        Ok(TickOutput {
            elastic,
            decision,
            plan,
        })
    }

    fn plan(
        &self,
        key: &JobKey,
        spec: &JobSpec,
        elastic: &ElasticDecision,
        decision: &PhaseDecision,
    ) -> ConfigResult<MaterializationPlan> {
        let mut pods = Vec::new();
        // Terminal jobs keep no pods.
        if !decision.phase.is_terminal() {
            for (role, replica) in &spec.replica_specs {
                for rank in 0..replica.replicas {
                    let index = rank.to_string();
                    let mut template = replica.template.clone();
                    template
                        .labels
                        .insert(JOB_NAME_LABEL.to_string(), key.name.clone());
                    template
                        .labels
                        .insert(REPLICA_ROLE_LABEL.to_string(), role.to_string());
                    template
                        .labels
                        .insert(REPLICA_INDEX_LABEL.to_string(), index.clone());
                    let preemptible =
                        self.labeler
                            .label_template(spec, *role, &index, &mut template)?;
                    pods.push(PodPlan {
                        role: *role,
                        index,
                        preemptible,
                        template,
                    });
                }
            }
        }

        Ok(MaterializationPlan {
            target_replicas: elastic.target_replicas,
            pods,
            rendezvous: elastic.rendezvous.clone(),
            env: elastic.launcher_env(),
            restart: decision.restart.clone(),
        })
    }

    /// Run one tick for `key` against the collaborators.
    ///
    /// On success the plan is applied and the status written if it changed.
    /// On a configuration error only the invalid reason is recorded.
    pub fn reconcile(&self, key: &JobKey) -> ReconcileResult<TickOutput> {
        let job = self
            .store
            .get_job(key)?
            .ok_or_else(|| ReconcileError::JobNotFound(key.clone()))?;
        let pods = self.store.list_pods(key)?;
        let readings = self.readings(&job);

        let output = match self.tick(&job, &pods, &readings) {
            Ok(output) => output,
            Err(e) => {
                warn!(job = %key, error = %e, "invalid job configuration");
                self.status.record_invalid(key, &e.to_string())?;
                return Err(e.into());
            }
        };

        self.materializer.apply(key, &output.plan)?;

        let status = output.decision.clone().into_status();
        if status != job.status {
            self.status.write_status(key, &status)?;
        }
        if output.decision.is_transition(&job.status) {
            info!(
                job = %key,
                from = %job.status.phase,
                to = %output.decision.phase,
                restart_count = output.decision.restart_count,
                "job phase changed"
            );
        }
        if !output.decision.restart.is_empty() {
            let replicas: Vec<String> = output
                .decision
                .restart
                .iter()
                .map(ToString::to_string)
                .collect();
            info!(job = %key, replicas = ?replicas, "restarting failed replicas");
        }

        Ok(output)
    }

    /// Missing or failing metric reads count as no signal.
    fn readings(&self, job: &TrainingJob) -> Vec<MetricReading> {
        let Some(source) = &self.metrics else {
            return Vec::new();
        };
        let Some(policy) = &job.spec.elastic_policy else {
            return Vec::new();
        };
        if policy.metrics.is_empty() {
            return Vec::new();
        }
        match source.latest(&job.key, &policy.metrics) {
            Ok(readings) => readings,
            Err(e) => {
                warn!(job = %job.key, error = %e, "metric read failed; scaling without signal");
                Vec::new()
            }
        }
    }

    /// Reconcile every job in the store. A failing job is logged and
    /// skipped; only a failure to list jobs aborts the pass.
    pub fn reconcile_all(&self) -> anyhow::Result<Vec<(JobKey, JobPhase)>> {
        let keys = self.store.list_jobs()?;
        let mut phases = Vec::with_capacity(keys.len());

        for key in keys {
            match self.reconcile(&key) {
                Ok(output) => phases.push((key, output.decision.phase)),
                Err(ReconcileError::JobNotFound(_)) => {
                    debug!(job = %key, "job disappeared before reconcile");
                }
                Err(e) if e.is_permanent() => {}
                Err(e) => {
                    warn!(job = %key, error = %e, "reconcile failed");
                }
            }
        }

        Ok(phases)
    }

    /// Resync every `interval` until `shutdown` fires.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "reconciler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.reconcile_all() {
                        error!(error = %e, "resync failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}

/// Distinct worker ranks among the observed pods.
fn observed_workers(pods: &[PodObservation]) -> ConfigResult<u32> {
    let ranks = pods
        .iter()
        .filter(|p| p.role == ReplicaRole::Worker)
        .map(|p| parse_rank(&p.index))
        .collect::<ConfigResult<BTreeSet<u32>>>()?;
    Ok(ranks.len() as u32)
}

/// The spec with the worker count replaced by the elastic target.
fn planned_spec(spec: &JobSpec, target_replicas: u32) -> JobSpec {
    let mut effective = spec.clone();
    if let Some(worker) = effective.replica_specs.get_mut(&ReplicaRole::Worker) {
        worker.replicas = target_replicas;
    }
    effective
}
