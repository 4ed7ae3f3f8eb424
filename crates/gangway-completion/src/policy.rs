//! Success and failure predicates over a job's replica outcomes.

use std::collections::BTreeMap;

use tracing::debug;

use gangway_types::{
    ConfigResult, FailurePolicy, JobSpec, PodObservation, ReplicaCounts, ReplicaRole,
    SuccessPolicy, parse_rank,
};

use crate::exit::{ReplicaOutcome, replica_outcome};

/// Outcome of every replica slot, per role and rank.
///
/// Slots are `0..replicas` for each role in the spec plus any rank a pod
/// of that role was observed at. Declared slots with no matching pod stay
/// `Missing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeTable {
    anchor: ReplicaRole,
    slots: BTreeMap<ReplicaRole, BTreeMap<u32, ReplicaOutcome>>,
}

impl OutcomeTable {
    /// Build the table from the spec and this tick's pod observations.
    ///
    /// Later observations for the same slot replace earlier ones. Pods of
    /// undeclared roles are ignored.
    pub fn build(spec: &JobSpec, pods: &[PodObservation]) -> ConfigResult<Self> {
        let mut slots: BTreeMap<ReplicaRole, BTreeMap<u32, ReplicaOutcome>> = spec
            .replica_specs
            .iter()
            .map(|(role, rs)| {
                let declared = (0..rs.replicas).map(|rank| (rank, ReplicaOutcome::Missing));
                (*role, declared.collect())
            })
            .collect();

        for pod in pods {
            let rank = parse_rank(&pod.index)?;
            let (Some(replica_spec), Some(outcomes)) =
                (spec.replica_specs.get(&pod.role), slots.get_mut(&pod.role))
            else {
                debug!(role = %pod.role, "ignoring pod of undeclared role");
                continue;
            };
            if rank >= replica_spec.replicas {
                debug!(role = %pod.role, rank, "pod beyond declared replicas");
            }
            outcomes.insert(rank, replica_outcome(pod, &replica_spec.template.containers));
        }

        Ok(Self {
            anchor: spec.anchor_role(),
            slots,
        })
    }

    /// Outcomes of one role in rank order, empty if the role is not declared.
    pub fn role(&self, role: ReplicaRole) -> Vec<&ReplicaOutcome> {
        self.slots
            .get(&role)
            .map(|outcomes| outcomes.values().collect())
            .unwrap_or_default()
    }

    /// The rank-0 slot of the anchor role.
    pub fn anchor(&self) -> Option<&ReplicaOutcome> {
        self.slots.get(&self.anchor).and_then(|outcomes| outcomes.get(&0))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReplicaRole, u32, &ReplicaOutcome)> {
        self.slots.iter().flat_map(|(role, outcomes)| {
            outcomes
                .iter()
                .map(move |(rank, outcome)| (*role, *rank, outcome))
        })
    }

    /// Whether any pod has been observed at all.
    pub fn any_observed(&self) -> bool {
        self.iter().any(|(_, _, o)| *o != ReplicaOutcome::Missing)
    }

    /// Every failed slot, in role then rank order.
    pub fn failed(&self) -> Vec<(ReplicaRole, u32, i32)> {
        self.iter()
            .filter_map(|(role, rank, o)| match o {
                ReplicaOutcome::Failed { exit_code, .. } => Some((role, rank, *exit_code)),
                _ => None,
            })
            .collect()
    }

    /// Per-role summary for the job status.
    pub fn counts(&self) -> BTreeMap<ReplicaRole, ReplicaCounts> {
        self.slots
            .iter()
            .map(|(role, outcomes)| {
                let mut counts = ReplicaCounts::default();
                for outcome in outcomes.values() {
                    match outcome {
                        ReplicaOutcome::Missing => counts.pending += 1,
                        ReplicaOutcome::Unfinished => counts.active += 1,
                        ReplicaOutcome::Succeeded => counts.succeeded += 1,
                        ReplicaOutcome::Failed { .. } => counts.failed += 1,
                    }
                }
                (*role, counts)
            })
            .collect()
    }

    /// Whether the success policy's predicate holds.
    pub fn success_satisfied(&self, policy: SuccessPolicy) -> bool {
        match policy {
            SuccessPolicy::AllReplicas => {
                let mut slots = self.iter().peekable();
                slots.peek().is_some() && slots.all(|(_, _, o)| o.is_succeeded())
            }
            SuccessPolicy::Anchor => self.anchor().is_some_and(ReplicaOutcome::is_succeeded),
            SuccessPolicy::AnyWorker => self
                .role(ReplicaRole::Worker)
                .into_iter()
                .any(ReplicaOutcome::is_succeeded),
        }
    }

    /// Whether the failure policy's predicate holds.
    pub fn failure_satisfied(&self, policy: FailurePolicy) -> bool {
        match policy {
            FailurePolicy::AnyReplica => self.iter().any(|(_, _, o)| o.is_failed()),
            FailurePolicy::Anchor => self.anchor().is_some_and(ReplicaOutcome::is_failed),
            FailurePolicy::AllWorkers => {
                let workers = self.role(ReplicaRole::Worker);
                !workers.is_empty() && workers.into_iter().all(ReplicaOutcome::is_failed)
            }
        }
    }
}
