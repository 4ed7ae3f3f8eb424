//! Preemption labeler: writes the eligibility label onto pod templates.

use tracing::debug;

use gangway_types::{ConfigResult, EngineConfig, JobSpec, PodTemplate, ReplicaRole, parse_rank};

/// Whether the pod `(role, index)` of this job may be preempted.
///
/// The index is only parsed when the job has no Coordinator role; a
/// non-numeric index is then a configuration error.
pub fn is_preemptible(spec: &JobSpec, role: ReplicaRole, index: &str) -> ConfigResult<bool> {
    if spec.has_coordinator() {
        return Ok(role != ReplicaRole::Coordinator);
    }
    let rank = parse_rank(index)?;
    Ok(rank != 0)
}

/// Applies the preemption label to pod templates being materialized.
#[derive(Debug, Clone)]
pub struct PreemptionLabeler {
    label: String,
}

impl PreemptionLabeler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            label: config.preemptible_label.clone(),
        }
    }

    pub fn label_key(&self) -> &str {
        &self.label
    }

    /// Label `template` for pod `(role, index)` and return the decision.
    ///
    /// The template is left untouched on error.
    pub fn label_template(
        &self,
        spec: &JobSpec,
        role: ReplicaRole,
        index: &str,
        template: &mut PodTemplate,
    ) -> ConfigResult<bool> {
        let preemptible = is_preemptible(spec, role, index)?;
        template
            .labels
            .insert(self.label.clone(), preemptible.to_string());
        debug!(%role, index, preemptible, "preemption label applied");
        Ok(preemptible)
    }
}
