//! Completion evaluator: drives the job phase state machine.
//!
//! Each call is a pure function of (spec, persisted status, observed
//! pods). The restart counter is read from the status and handed back in
//! the decision; nothing is remembered between calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use gangway_types::{
    ConfigResult, FailurePolicy, JobPhase, JobSpec, JobStatus, PodObservation, ReplicaCounts,
    ReplicaRole, SuccessPolicy,
};

use crate::policy::OutcomeTable;

/// A single replica slot of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaRef {
    pub role: ReplicaRole,
    pub rank: u32,
}

impl std::fmt::Display for ReplicaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.role, self.rank)
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDecision {
    pub phase: JobPhase,
    pub restart_count: u32,
    /// Failed replicas whose pods must be deleted and recreated.
    pub restart: Vec<ReplicaRef>,
    pub message: Option<String>,
    pub replica_statuses: BTreeMap<ReplicaRole, ReplicaCounts>,
}

impl PhaseDecision {
    /// Whether the phase differs from the persisted one.
    pub fn is_transition(&self, status: &JobStatus) -> bool {
        self.phase != status.phase
    }

    pub fn into_status(self) -> JobStatus {
        JobStatus {
            phase: self.phase,
            restart_count: self.restart_count,
            message: self.message,
            replica_statuses: self.replica_statuses,
        }
    }
}

/// Evaluates success and failure policies for one job.
#[derive(Debug, Clone)]
pub struct CompletionEvaluator {
    success: SuccessPolicy,
    failure: FailurePolicy,
    restart_budget: u32,
}

impl CompletionEvaluator {
    pub fn new(success: SuccessPolicy, failure: FailurePolicy, restart_budget: u32) -> Self {
        Self {
            success,
            failure,
            restart_budget,
        }
    }

    /// Use the policies declared on the job (defaults when unset).
    pub fn for_job(spec: &JobSpec, restart_budget: u32) -> Self {
        Self::new(spec.success_policy(), spec.failure_policy(), restart_budget)
    }

    /// Decide the job phase for this tick.
    pub fn evaluate(
        &self,
        spec: &JobSpec,
        status: &JobStatus,
        pods: &[PodObservation],
    ) -> ConfigResult<PhaseDecision> {
        let table = OutcomeTable::build(spec, pods)?;
        let mut decision = PhaseDecision {
            phase: status.phase,
            restart_count: status.restart_count,
            restart: Vec::new(),
            message: status.message.clone(),
            replica_statuses: table.counts(),
        };

        match status.phase {
            JobPhase::Succeeded | JobPhase::Failed => {}
            JobPhase::Created => {
                if table.any_observed() {
                    decision.phase = JobPhase::Running;
                    decision.message = Some("replicas observed".to_string());
                    self.advance(spec, status, &table, &mut decision);
                }
            }
            JobPhase::Running => self.advance(spec, status, &table, &mut decision),
            // The restart request went out last tick; any failure seen from
            // here on counts against the budget.
            JobPhase::Restarting => {
                if table.success_satisfied(self.success) {
                    self.succeed(&mut decision);
                } else {
                    decision.phase = JobPhase::Running;
                    decision.message = Some("failed replicas recreated".to_string());
                }
            }
        }

        debug!(
            from = %status.phase,
            to = %decision.phase,
            restart_count = decision.restart_count,
            restart = decision.restart.len(),
            "completion evaluated"
        );
        Ok(decision)
    }

    fn succeed(&self, decision: &mut PhaseDecision) {
        decision.phase = JobPhase::Succeeded;
        decision.message = Some(format!("success policy {:?} satisfied", self.success));
    }

    fn advance(
        &self,
        spec: &JobSpec,
        status: &JobStatus,
        table: &OutcomeTable,
        decision: &mut PhaseDecision,
    ) {
        if table.success_satisfied(self.success) {
            self.succeed(decision);
            return;
        }

        if !table.failure_satisfied(self.failure) {
            decision.phase = JobPhase::Running;
            return;
        }

        let failed = table.failed();
        decision.restart = failed
            .iter()
            .map(|(role, rank, _)| ReplicaRef { role: *role, rank: *rank })
            .collect();

        let forbidden = failed.iter().find(|(role, _, code)| {
            spec.replica_specs
                .get(role)
                .is_some_and(|rs| !rs.restart_policy.allows_restart(*code))
        });
        if let Some((role, rank, code)) = forbidden {
            decision.phase = JobPhase::Failed;
            decision.restart.clear();
            decision.message = Some(format!(
                "{role}-{rank} exited with code {code} and its restart policy forbids a restart"
            ));
            return;
        }

        if status.restart_count >= self.restart_budget {
            decision.phase = JobPhase::Failed;
            decision.restart.clear();
            decision.message = Some(format!(
                "restart budget exhausted after {} restarts",
                status.restart_count
            ));
            return;
        }

        decision.phase = JobPhase::Restarting;
        decision.restart_count = status.restart_count + 1;
        decision.message = Some(format!(
            "restarting {} failed replica(s), restart {}/{}",
            decision.restart.len(),
            decision.restart_count,
            self.restart_budget
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gangway_types::*;

    fn job(coordinator: bool, workers: u32) -> JobSpec {
        let mut replica_specs = BTreeMap::new();
        if coordinator {
            replica_specs.insert(
                ReplicaRole::Coordinator,
                ReplicaSpec {
                    replicas: 1,
                    template: PodTemplate::default(),
                    restart_policy: RestartPolicy::OnFailure,
                },
            );
        }
        replica_specs.insert(
            ReplicaRole::Worker,
            ReplicaSpec {
                replicas: workers,
                template: PodTemplate::default(),
                restart_policy: RestartPolicy::OnFailure,
            },
        );
        JobSpec {
            replica_specs,
            elastic_policy: None,
        }
    }

    fn exited(role: ReplicaRole, rank: u32, code: i32) -> PodObservation {
        PodObservation {
            role,
            index: rank.to_string(),
            container_statuses: vec![ContainerStatus::terminated(DEFAULT_CONTAINER, code)],
        }
    }

    fn running(role: ReplicaRole, rank: u32) -> PodObservation {
        PodObservation {
            role,
            index: rank.to_string(),
            container_statuses: vec![ContainerStatus::running(DEFAULT_CONTAINER)],
        }
    }

    fn status(phase: JobPhase, restart_count: u32) -> JobStatus {
        JobStatus {
            phase,
            restart_count,
            ..Default::default()
        }
    }

    fn defaults(budget: u32) -> CompletionEvaluator {
        CompletionEvaluator::new(SuccessPolicy::AllReplicas, FailurePolicy::AnyReplica, budget)
    }

    #[test]
    fn all_replicas_exit_zero_succeeds() {
        let spec = job(true, 3);
        let pods = vec![
            exited(ReplicaRole::Coordinator, 0, 0),
            exited(ReplicaRole::Worker, 0, 0),
            exited(ReplicaRole::Worker, 1, 0),
            exited(ReplicaRole::Worker, 2, 0),
        ];
        let decision = defaults(2)
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Succeeded);
        assert!(decision.restart.is_empty());
    }

    #[test]
    fn worker_failure_within_budget_restarts() {
        let spec = job(true, 3);
        let pods = vec![
            exited(ReplicaRole::Coordinator, 0, 0),
            exited(ReplicaRole::Worker, 0, 1),
            running(ReplicaRole::Worker, 1),
            running(ReplicaRole::Worker, 2),
        ];
        let decision = defaults(2)
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Restarting);
        assert_eq!(decision.restart_count, 1);
        assert_eq!(
            decision.restart,
            vec![ReplicaRef {
                role: ReplicaRole::Worker,
                rank: 0
            }]
        );
    }

    #[test]
    fn pending_anchor_keeps_job_running() {
        let spec = job(false, 4);
        let pods = vec![
            running(ReplicaRole::Worker, 0),
            exited(ReplicaRole::Worker, 1, 0),
            exited(ReplicaRole::Worker, 2, 0),
            exited(ReplicaRole::Worker, 3, 0),
        ];
        let decision = defaults(2)
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Running);
    }

    #[test]
    fn unobserved_replicas_never_conclude() {
        let spec = job(false, 2);
        let pods = vec![exited(ReplicaRole::Worker, 1, 0)];
        let decision = defaults(2)
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Running);
        assert_eq!(decision.replica_statuses[&ReplicaRole::Worker].pending, 1);
    }

    #[test]
    fn exhausted_budget_fails() {
        let spec = job(false, 2);
        let pods = vec![exited(ReplicaRole::Worker, 1, 1)];
        let evaluator = defaults(2);

        let mut current = status(JobPhase::Running, 0);
        for expected in 1..=2 {
            let decision = evaluator.evaluate(&spec, &current, &pods).unwrap();
            assert_eq!(decision.phase, JobPhase::Restarting);
            assert_eq!(decision.restart_count, expected);
            // Recreated pods come back, then fail again.
            current = status(JobPhase::Running, decision.restart_count);
        }

        let decision = evaluator.evaluate(&spec, &current, &pods).unwrap();
        assert_eq!(decision.phase, JobPhase::Failed);
        assert_eq!(decision.restart_count, 2);
        assert!(decision.restart.is_empty());
    }

    #[test]
    fn zero_budget_fails_on_first_failure() {
        let spec = job(false, 1);
        let pods = vec![exited(ReplicaRole::Worker, 0, 2)];
        let decision = defaults(0)
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Failed);
    }

    #[test]
    fn restarting_settles_to_running_on_next_tick() {
        let spec = job(false, 2);
        let pods = vec![exited(ReplicaRole::Worker, 1, 1)];
        let decision = defaults(3)
            .evaluate(&spec, &status(JobPhase::Restarting, 1), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Running);
        assert_eq!(decision.restart_count, 1);
        assert!(decision.restart.is_empty());
    }

    #[test]
    fn crash_loop_exhausts_budget() {
        let spec = job(false, 1);
        let pods = vec![exited(ReplicaRole::Worker, 0, 1)];
        let evaluator = defaults(3);

        let mut current = status(JobPhase::Running, 0);
        let mut restart_requests = 0;
        for _ in 0..20 {
            let decision = evaluator.evaluate(&spec, &current, &pods).unwrap();
            restart_requests += decision.restart.len();
            current = decision.into_status();
            if current.phase.is_terminal() {
                break;
            }
        }

        assert_eq!(current.phase, JobPhase::Failed);
        assert_eq!(current.restart_count, 3);
        assert_eq!(restart_requests, 3);
    }

    #[test]
    fn restarting_job_can_still_succeed() {
        let spec = job(false, 2);
        let pods = vec![exited(ReplicaRole::Worker, 0, 0), exited(ReplicaRole::Worker, 1, 0)];
        let decision = defaults(3)
            .evaluate(&spec, &status(JobPhase::Restarting, 1), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Succeeded);
    }

    #[test]
    fn restarting_returns_to_running_once_recreated() {
        let spec = job(false, 2);
        let pods = vec![running(ReplicaRole::Worker, 0), running(ReplicaRole::Worker, 1)];
        let decision = defaults(3)
            .evaluate(&spec, &status(JobPhase::Restarting, 1), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Running);
        assert_eq!(decision.restart_count, 1);
    }

    #[test]
    fn never_restart_policy_fails_immediately() {
        let mut spec = job(false, 2);
        spec.replica_specs
            .get_mut(&ReplicaRole::Worker)
            .unwrap()
            .restart_policy = RestartPolicy::Never;
        let pods = vec![exited(ReplicaRole::Worker, 0, 1)];
        let decision = defaults(5)
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Failed);
        assert_eq!(decision.restart_count, 0);
    }

    #[test]
    fn exit_code_policy_restarts_only_on_signals() {
        let mut spec = job(false, 1);
        spec.replica_specs
            .get_mut(&ReplicaRole::Worker)
            .unwrap()
            .restart_policy = RestartPolicy::ExitCode;
        let evaluator = defaults(5);
        let running_status = status(JobPhase::Running, 0);

        let killed = vec![exited(ReplicaRole::Worker, 0, 137)];
        let decision = evaluator.evaluate(&spec, &running_status, &killed).unwrap();
        assert_eq!(decision.phase, JobPhase::Restarting);

        let crashed = vec![exited(ReplicaRole::Worker, 0, 1)];
        let decision = evaluator.evaluate(&spec, &running_status, &crashed).unwrap();
        assert_eq!(decision.phase, JobPhase::Failed);
    }

    #[test]
    fn success_takes_precedence_over_failure() {
        let spec = job(true, 2);
        let pods = vec![
            exited(ReplicaRole::Coordinator, 0, 0),
            exited(ReplicaRole::Worker, 1, 1),
        ];
        let evaluator =
            CompletionEvaluator::new(SuccessPolicy::Anchor, FailurePolicy::AnyReplica, 3);
        let decision = evaluator
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Succeeded);
    }

    #[test]
    fn created_moves_to_running_when_pods_appear() {
        let spec = job(false, 2);
        let evaluator = defaults(3);
        let created = JobStatus::default();

        let decision = evaluator.evaluate(&spec, &created, &[]).unwrap();
        assert_eq!(decision.phase, JobPhase::Created);
        assert!(!decision.is_transition(&created));

        let decision = evaluator
            .evaluate(&spec, &created, &[running(ReplicaRole::Worker, 0)])
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Running);
        assert!(decision.is_transition(&created));
    }

    #[test]
    fn created_job_concludes_in_one_tick() {
        let spec = job(true, 3);
        let created = JobStatus::default();

        let all_done = vec![
            exited(ReplicaRole::Coordinator, 0, 0),
            exited(ReplicaRole::Worker, 0, 0),
            exited(ReplicaRole::Worker, 1, 0),
            exited(ReplicaRole::Worker, 2, 0),
        ];
        let decision = defaults(2).evaluate(&spec, &created, &all_done).unwrap();
        assert_eq!(decision.phase, JobPhase::Succeeded);

        let one_failed = vec![
            exited(ReplicaRole::Coordinator, 0, 0),
            exited(ReplicaRole::Worker, 1, 1),
        ];
        let decision = defaults(2).evaluate(&spec, &created, &one_failed).unwrap();
        assert_eq!(decision.phase, JobPhase::Restarting);
        assert_eq!(decision.restart_count, 1);
    }

    #[test]
    fn terminal_phases_are_sticky() {
        let spec = job(false, 1);
        let pods = vec![exited(ReplicaRole::Worker, 0, 1)];
        let decision = defaults(3)
            .evaluate(&spec, &status(JobPhase::Succeeded, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Succeeded);
        assert!(decision.restart.is_empty());
    }

    #[test]
    fn policies_come_from_elastic_policy() {
        let mut spec = job(false, 3);
        spec.elastic_policy = Some(ElasticPolicy {
            success_policy: Some(SuccessPolicy::AnyWorker),
            ..Default::default()
        });
        let pods = vec![exited(ReplicaRole::Worker, 2, 0)];
        let decision = CompletionEvaluator::for_job(&spec, 3)
            .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
            .unwrap();
        assert_eq!(decision.phase, JobPhase::Succeeded);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let spec = job(true, 2);
        let pods = vec![exited(ReplicaRole::Worker, 0, 1)];
        let current = status(JobPhase::Running, 0);
        let evaluator = defaults(2);
        let first = evaluator.evaluate(&spec, &current, &pods).unwrap();
        let second = evaluator.evaluate(&spec, &current, &pods).unwrap();
        assert_eq!(first, second);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn outcome() -> impl Strategy<Value = Option<i32>> {
            prop_oneof![Just(None), Just(Some(0)), (1i32..256).prop_map(Some)]
        }

        proptest! {
            /// A job with any replica not yet terminated and no failure
            /// never leaves Running.
            #[test]
            fn pending_replica_keeps_running(
                codes in proptest::collection::vec(
                    prop_oneof![Just(None), Just(Some(0))], 1..8),
                pending in any::<prop::sample::Index>(),
            ) {
                let mut codes = codes;
                let at = pending.index(codes.len());
                codes[at] = None;
                let spec = job(false, codes.len() as u32);
                let pods: Vec<_> = codes
                    .iter()
                    .enumerate()
                    .map(|(rank, code)| match code {
                        Some(c) => exited(ReplicaRole::Worker, rank as u32, *c),
                        None => running(ReplicaRole::Worker, rank as u32),
                    })
                    .collect();
                let decision = defaults(3)
                    .evaluate(&spec, &status(JobPhase::Running, 0), &pods)
                    .unwrap();
                prop_assert_eq!(decision.phase, JobPhase::Running);
            }

            /// Restart counts never exceed the budget.
            #[test]
            fn restart_count_bounded(
                codes in proptest::collection::vec(outcome(), 1..6),
                budget in 0u32..4,
                restarts in 0u32..6,
            ) {
                let spec = job(false, codes.len() as u32);
                let pods: Vec<_> = codes
                    .iter()
                    .enumerate()
                    .filter_map(|(rank, code)| code.map(|c| exited(ReplicaRole::Worker, rank as u32, c)))
                    .collect();
                let restarts = restarts.min(budget);
                let decision = defaults(budget)
                    .evaluate(&spec, &status(JobPhase::Running, restarts), &pods)
                    .unwrap();
                prop_assert!(decision.restart_count <= budget);
                if decision.phase == JobPhase::Restarting {
                    prop_assert_eq!(decision.restart_count, restarts + 1);
                }
            }
        }
    }
}
