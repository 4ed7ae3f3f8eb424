//! Domain types for the gangway policy engine.
//!
//! These types represent the job spec snapshot handed to the engine each
//! tick, the observed replica state, and the job status the engine
//! proposes. All types are serializable to/from JSON and TOML so the CLI
//! and tests can load them from manifests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};

/// Container name tracked when a template does not list its containers.
pub const DEFAULT_CONTAINER: &str = "trainer";

// ── Roles ─────────────────────────────────────────────────────────

/// A homogeneous group of replicas within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReplicaRole {
    Coordinator,
    Worker,
}

impl ReplicaRole {
    /// Lowercase name, as used in pod labels and manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaRole::Coordinator => "coordinator",
            ReplicaRole::Worker => "worker",
        }
    }
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicaRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coordinator" | "master" => Ok(ReplicaRole::Coordinator),
            "worker" => Ok(ReplicaRole::Worker),
            other => Err(ConfigError::Manifest(format!("unknown replica role {other:?}"))),
        }
    }
}

impl TryFrom<String> for ReplicaRole {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReplicaRole> for String {
    fn from(role: ReplicaRole) -> Self {
        role.as_str().to_string()
    }
}

/// Parse a replica ordinal index into a rank. Only plain ASCII digits
/// are accepted.
pub fn parse_rank(index: &str) -> ConfigResult<u32> {
    let invalid = || ConfigError::InvalidRank {
        index: index.to_string(),
    };
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    index.parse::<u32>().map_err(|_| invalid())
}

// ── Job spec ──────────────────────────────────────────────────────

/// Identifies a job in the object store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub namespace: String,
    pub name: String,
}

impl JobKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// When a failed replica may be recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    Always,
    #[default]
    OnFailure,
    Never,
    /// Restart only when the exit code marks a retryable failure.
    ExitCode,
}

impl RestartPolicy {
    /// Whether a replica that exited with `exit_code` may be recreated.
    pub fn allows_restart(&self, exit_code: i32) -> bool {
        match self {
            RestartPolicy::Always | RestartPolicy::OnFailure => true,
            RestartPolicy::Never => false,
            RestartPolicy::ExitCode => is_retryable_exit_code(exit_code),
        }
    }
}

/// Exit codes from 128 up mean the process was killed by a signal
/// (OOM killer, preemption, node drain) rather than failing on its own.
pub fn is_retryable_exit_code(exit_code: i32) -> bool {
    exit_code >= 128
}

/// The parts of a pod template the engine reads or labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTemplate {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Containers whose termination decides the replica outcome.
    #[serde(default = "default_containers")]
    pub containers: Vec<String>,
}

impl Default for PodTemplate {
    fn default() -> Self {
        Self {
            labels: BTreeMap::new(),
            containers: default_containers(),
        }
    }
}

fn default_containers() -> Vec<String> {
    vec![DEFAULT_CONTAINER.to_string()]
}

/// Desired state for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSpec {
    pub replicas: u32,
    #[serde(default)]
    pub template: PodTemplate,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

/// Rendezvous backend understood by the training launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RdzvBackend {
    #[serde(rename = "c10d")]
    C10d,
    #[serde(rename = "etcd")]
    Etcd,
    #[serde(rename = "etcd-v2")]
    EtcdV2,
}

impl RdzvBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RdzvBackend::C10d => "c10d",
            RdzvBackend::Etcd => "etcd",
            RdzvBackend::EtcdV2 => "etcd-v2",
        }
    }
}

/// Freeform rendezvous key/value setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdzvConf {
    pub key: String,
    pub value: String,
}

/// Scaling metric an external autoscaler reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    /// Per-replica target value for the metric.
    pub target_value: f64,
}

/// Latest observed value of a scaling metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub name: String,
    pub value: f64,
}

/// When the job counts as succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Every replica of every role exited 0.
    #[default]
    AllReplicas,
    /// The anchor replica (coordinator, or worker rank 0) exited 0.
    Anchor,
    /// At least one worker exited 0.
    AnyWorker,
}

/// When the job counts as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any replica exited non-zero.
    #[default]
    AnyReplica,
    /// The anchor replica exited non-zero.
    Anchor,
    /// Every worker exited non-zero.
    AllWorkers,
}

/// Elastic scaling and rendezvous settings. Every field is optional;
/// signed fields let validation reject negative values instead of
/// failing to parse them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticPolicy {
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
    pub rdzv_backend: Option<RdzvBackend>,
    pub rdzv_host: Option<String>,
    pub rdzv_port: Option<i32>,
    pub rdzv_id: Option<String>,
    pub rdzv_conf: Vec<RdzvConf>,
    pub standalone: Option<bool>,
    pub n_proc_per_node: Option<i32>,
    pub max_restarts: Option<i32>,
    pub metrics: Vec<MetricSpec>,
    pub success_policy: Option<SuccessPolicy>,
    pub failure_policy: Option<FailurePolicy>,
}

impl ElasticPolicy {
    pub fn is_standalone(&self) -> bool {
        self.standalone.unwrap_or(false)
    }

    pub fn has_bounds(&self) -> bool {
        self.min_replicas.is_some() || self.max_replicas.is_some()
    }
}

/// Specification of a distributed training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub replica_specs: BTreeMap<ReplicaRole, ReplicaSpec>,
    #[serde(default)]
    pub elastic_policy: Option<ElasticPolicy>,
}

impl JobSpec {
    pub fn has_coordinator(&self) -> bool {
        self.replica_specs.contains_key(&ReplicaRole::Coordinator)
    }

    /// Declared replica count for a role, 0 if the role is absent.
    pub fn replicas(&self, role: ReplicaRole) -> u32 {
        self.replica_specs.get(&role).map_or(0, |s| s.replicas)
    }

    /// The role whose rank-0 replica anchors rendezvous.
    pub fn anchor_role(&self) -> ReplicaRole {
        if self.has_coordinator() {
            ReplicaRole::Coordinator
        } else {
            ReplicaRole::Worker
        }
    }

    pub fn success_policy(&self) -> SuccessPolicy {
        self.elastic_policy
            .as_ref()
            .and_then(|p| p.success_policy)
            .unwrap_or_default()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.elastic_policy
            .as_ref()
            .and_then(|p| p.failure_policy)
            .unwrap_or_default()
    }

    /// Structural checks on the role topology.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.replica_specs.is_empty() {
            return Err(ConfigError::NoReplicaSpecs);
        }
        if let Some(coordinator) = self.replica_specs.get(&ReplicaRole::Coordinator)
            && coordinator.replicas != 1
        {
            return Err(ConfigError::CoordinatorReplicas(coordinator.replicas));
        }
        if let Some(policy) = &self.elastic_policy
            && policy.has_bounds()
            && !self.replica_specs.contains_key(&ReplicaRole::Worker)
        {
            return Err(ConfigError::MissingRole(ReplicaRole::Worker));
        }
        Ok(())
    }
}

// ── Observations ──────────────────────────────────────────────────

/// Observed state of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ContainerState {
    Waiting {
        #[serde(default)]
        reason: Option<String>,
    },
    Running,
    Terminated {
        exit_code: i32,
    },
}

/// Status entry for one container of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    /// `None` when the status carried no state at all.
    #[serde(default)]
    pub state: Option<ContainerState>,
}

impl ContainerStatus {
    pub fn terminated(name: &str, exit_code: i32) -> Self {
        Self {
            name: name.to_string(),
            state: Some(ContainerState::Terminated { exit_code }),
        }
    }

    pub fn running(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Some(ContainerState::Running),
        }
    }
}

/// One replica pod as seen in the cluster this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodObservation {
    pub role: ReplicaRole,
    /// Replica ordinal, as carried on the pod.
    pub index: String,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

/// Exit signal for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCode {
    /// The container has not been seen in a terminated state.
    NotObserved,
    Exited(i32),
}

impl TerminationCode {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminationCode::Exited(0))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TerminationCode::Exited(code) if *code != 0)
    }

    pub fn is_observed(&self) -> bool {
        !matches!(self, TerminationCode::NotObserved)
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Created,
    Running,
    Restarting,
    Succeeded,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Succeeded | JobPhase::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Created => "Created",
            JobPhase::Running => "Running",
            JobPhase::Restarting => "Restarting",
            JobPhase::Succeeded => "Succeeded",
            JobPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Per-role replica summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicaCounts {
    /// Declared but not yet observed.
    pub pending: u32,
    /// Observed, not terminated.
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Persisted job status. The restart counter lives only here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStatus {
    pub phase: JobPhase,
    pub restart_count: u32,
    pub message: Option<String>,
    pub replica_statuses: BTreeMap<ReplicaRole, ReplicaCounts>,
}

/// Object-store snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    #[serde(flatten)]
    pub key: JobKey,
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}
