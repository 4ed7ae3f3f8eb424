//! Elastic evaluator: target replicas, rendezvous and restart budget.
//!
//! Reads a job's `ElasticPolicy` and the latest scaling-metric readings
//! and produces an `ElasticDecision`. The evaluator keeps no state between
//! calls; cooldowns and smoothing belong to the external autoscaler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gangway_types::{ConfigError, ConfigResult, ElasticPolicy, EngineConfig, MetricReading};

use crate::rendezvous::RendezvousConfig;

/// How the job's replicas coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElasticMode {
    /// No elastic policy: the static replica count, no launcher settings.
    Static,
    /// Single-process mode, rendezvous disabled.
    Standalone,
    /// Replica count may vary within bounds, coordinated via rendezvous.
    Elastic,
}

/// Per-tick scaling inputs.
#[derive(Debug, Clone, Default)]
pub struct ScalingInput {
    /// Worker count declared on the replica spec.
    pub static_replicas: u32,
    /// Worker pods currently observed (0 = unknown).
    pub current_replicas: u32,
    /// Latest metric readings; empty means no signal.
    pub readings: Vec<MetricReading>,
}

/// Effective elastic settings for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticDecision {
    pub mode: ElasticMode,
    pub target_replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// `None` when rendezvous is disabled.
    pub rendezvous: Option<RendezvousConfig>,
    pub n_proc_per_node: Option<u32>,
    /// Launcher-level restarts, only when the policy sets them.
    pub max_restarts: Option<u32>,
    /// Job-level restart budget used by the completion evaluator.
    pub restart_budget: u32,
}

impl ElasticDecision {
    /// Environment variables the training launcher reads. Unset values
    /// are omitted.
    pub fn launcher_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        match self.mode {
            ElasticMode::Static => return env,
            ElasticMode::Standalone => {
                env.insert("PET_STANDALONE".to_string(), "1".to_string());
                env.insert("PET_NNODES".to_string(), "1".to_string());
            }
            ElasticMode::Elastic => {
                let nnodes = if self.min_replicas == self.max_replicas {
                    self.max_replicas.to_string()
                } else {
                    format!("{}:{}", self.min_replicas, self.max_replicas)
                };
                env.insert("PET_NNODES".to_string(), nnodes);
            }
        }
        if let Some(n) = self.n_proc_per_node {
            env.insert("PET_NPROC_PER_NODE".to_string(), n.to_string());
        }
        if let Some(n) = self.max_restarts {
            env.insert("PET_MAX_RESTARTS".to_string(), n.to_string());
        }
        if let Some(rdzv) = &self.rendezvous {
            rdzv.write_env(&mut env);
        }
        env
    }
}

/// Check a policy for invalid combinations.
pub fn validate(policy: &ElasticPolicy) -> ConfigResult<()> {
    for (field, value) in [
        ("min_replicas", policy.min_replicas),
        ("max_replicas", policy.max_replicas),
    ] {
        if let Some(value) = value
            && value < 0
        {
            return Err(ConfigError::NegativeBound { field, value });
        }
    }
    if policy.is_standalone() && policy.has_bounds() {
        return Err(ConfigError::StandaloneWithBounds);
    }
    if let (Some(min), Some(max)) = (policy.min_replicas, policy.max_replicas)
        && min > max
    {
        return Err(ConfigError::InvertedBounds { min, max });
    }
    if let Some(n) = policy.max_restarts
        && n < 0
    {
        return Err(ConfigError::NegativeMaxRestarts(n));
    }
    if let Some(n) = policy.n_proc_per_node
        && n < 1
    {
        return Err(ConfigError::InvalidNProcPerNode(n));
    }
    if let Some(port) = policy.rdzv_port
        && !(1..=65535).contains(&port)
    {
        return Err(ConfigError::InvalidRdzvPort(port));
    }
    Ok(())
}

/// Evaluates elastic policies.
#[derive(Debug, Clone)]
pub struct ElasticEvaluator {
    default_max_restarts: u32,
}

impl ElasticEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            default_max_restarts: config.default_max_restarts,
        }
    }

    /// Compute the effective elastic settings for one tick.
    pub fn evaluate(
        &self,
        policy: Option<&ElasticPolicy>,
        input: &ScalingInput,
    ) -> ConfigResult<ElasticDecision> {
        let Some(policy) = policy else {
            return Ok(ElasticDecision {
                mode: ElasticMode::Static,
                target_replicas: input.static_replicas,
                min_replicas: input.static_replicas,
                max_replicas: input.static_replicas,
                rendezvous: None,
                n_proc_per_node: None,
                max_restarts: None,
                restart_budget: self.default_max_restarts,
            });
        };

        validate(policy)?;

        // Validated non-negative above.
        let max_restarts = policy.max_restarts.map(|n| n as u32);
        let n_proc_per_node = policy.n_proc_per_node.map(|n| n as u32);
        let restart_budget = max_restarts.unwrap_or(self.default_max_restarts);

        if policy.is_standalone() {
            if RendezvousConfig::is_configured(policy) {
                warn!("standalone elastic policy sets rendezvous fields; ignoring them");
            }
            return Ok(ElasticDecision {
                mode: ElasticMode::Standalone,
                target_replicas: 1,
                min_replicas: 1,
                max_replicas: 1,
                rendezvous: None,
                n_proc_per_node,
                max_restarts,
                restart_budget,
            });
        }

        let (min, max) = effective_bounds(policy, input.static_replicas);
        let target = match metric_proposal(policy, input) {
            Some(proposal) => {
                let clamped = proposal.clamp(min, max);
                debug!(proposal, min, max, target = clamped, "metric-driven target");
                clamped
            }
            None => policy
                .max_replicas
                .map_or(input.static_replicas, |m| m as u32)
                .clamp(min, max),
        };

        Ok(ElasticDecision {
            mode: ElasticMode::Elastic,
            target_replicas: target,
            min_replicas: min,
            max_replicas: max,
            rendezvous: Some(RendezvousConfig::from_policy(policy)),
            n_proc_per_node,
            max_restarts,
            restart_budget,
        })
    }
}

/// Bounds with unset sides defaulting to the static count. A defaulted
/// side never crosses the side that was set.
fn effective_bounds(policy: &ElasticPolicy, static_replicas: u32) -> (u32, u32) {
    let min = policy.min_replicas.map(|v| v as u32);
    let max = policy.max_replicas.map(|v| v as u32);
    match (min, max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, static_replicas.max(lo)),
        (None, Some(hi)) => (static_replicas.min(hi), hi),
        (None, None) => (static_replicas, static_replicas),
    }
}

/// Largest replica count proposed by any metric with a usable reading.
fn metric_proposal(policy: &ElasticPolicy, input: &ScalingInput) -> Option<u32> {
    let current = if input.current_replicas > 0 {
        input.current_replicas
    } else {
        input.static_replicas
    };

    let mut best: Option<u32> = None;
    for metric in &policy.metrics {
        if !metric.target_value.is_finite() || metric.target_value <= 0.0 {
            warn!(metric = %metric.name, target = metric.target_value, "non-positive metric target");
            continue;
        }
        // Latest reading wins.
        let Some(reading) = input.readings.iter().rev().find(|r| r.name == metric.name) else {
            continue;
        };
        if !reading.value.is_finite() || reading.value < 0.0 {
            warn!(metric = %metric.name, value = reading.value, "unusable metric reading");
            continue;
        }
        let ratio = reading.value / metric.target_value;
        let proposal = ((current as f64) * ratio).ceil().min(u32::MAX as f64) as u32;
        debug!(
            metric = %metric.name,
            current = reading.value,
            target = metric.target_value,
            proposal,
            "metric proposal"
        );
        best = Some(best.map_or(proposal, |b| b.max(proposal)));
    }
    best
}
