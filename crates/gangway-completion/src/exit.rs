//! Exit signal extraction from observed container statuses.

use tracing::warn;

use gangway_types::{ContainerState, ContainerStatus, PodObservation, TerminationCode};

/// Termination code of the named container.
///
/// Returns `NotObserved` unless a status with that name is in the
/// terminated state. When several statuses share the name, the last
/// terminated one in list order wins.
pub fn container_exit_code(statuses: &[ContainerStatus], name: &str) -> TerminationCode {
    let mut code = TerminationCode::NotObserved;
    let mut matches = 0usize;
    for status in statuses.iter().filter(|s| s.name == name) {
        matches += 1;
        if let Some(ContainerState::Terminated { exit_code }) = status.state {
            code = TerminationCode::Exited(exit_code);
        }
    }
    if matches > 1 {
        warn!(container = name, matches, "duplicate container statuses");
    }
    code
}

/// Where one replica slot stands this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaOutcome {
    /// No pod observed for the slot.
    Missing,
    /// Pod observed, tracked containers not all terminated.
    Unfinished,
    Succeeded,
    Failed { container: String, exit_code: i32 },
}

impl ReplicaOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, ReplicaOutcome::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ReplicaOutcome::Failed { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ReplicaOutcome::Failed { exit_code, .. } => Some(*exit_code),
            ReplicaOutcome::Succeeded => Some(0),
            _ => None,
        }
    }
}

/// Fold the codes of every tracked container of one pod.
///
/// Any non-zero exit fails the replica (first failing container in
/// `containers` order); all containers exiting 0 succeeds it; anything
/// else leaves it unfinished.
pub fn replica_outcome(pod: &PodObservation, containers: &[String]) -> ReplicaOutcome {
    let mut all_succeeded = !containers.is_empty();
    for name in containers {
        match container_exit_code(&pod.container_statuses, name) {
            TerminationCode::Exited(0) => {}
            TerminationCode::Exited(exit_code) => {
                return ReplicaOutcome::Failed {
                    container: name.clone(),
                    exit_code,
                };
            }
            TerminationCode::NotObserved => all_succeeded = false,
        }
    }
    if all_succeeded {
        ReplicaOutcome::Succeeded
    } else {
        ReplicaOutcome::Unfinished
    }
}
