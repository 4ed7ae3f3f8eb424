//! Desired pod state handed to the materializer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gangway_completion::ReplicaRef;
use gangway_elastic::RendezvousConfig;
use gangway_types::{PodTemplate, ReplicaRole};

/// Label carrying the owning job's name.
pub const JOB_NAME_LABEL: &str = "gangway.dev/job-name";
/// Label carrying the replica role.
pub const REPLICA_ROLE_LABEL: &str = "gangway.dev/replica-role";
/// Label carrying the replica index.
pub const REPLICA_INDEX_LABEL: &str = "gangway.dev/replica-index";

/// One pod to materialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodPlan {
    pub role: ReplicaRole,
    pub index: String,
    pub preemptible: bool,
    /// Template with role, index and preemption labels applied.
    pub template: PodTemplate,
}

/// Everything the materializer needs for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializationPlan {
    pub target_replicas: u32,
    /// Pods that should exist; pods not listed should not.
    pub pods: Vec<PodPlan>,
    pub rendezvous: Option<RendezvousConfig>,
    /// Launcher environment injected into every pod.
    pub env: BTreeMap<String, String>,
    /// Failed replicas to delete and recreate.
    pub restart: Vec<ReplicaRef>,
}

impl MaterializationPlan {
    /// Preemption label value per pod, keyed `role-index`.
    pub fn preemption_labels(&self) -> BTreeMap<String, bool> {
        self.pods
            .iter()
            .map(|p| (format!("{}-{}", p.role, p.index), p.preemptible))
            .collect()
    }
}
