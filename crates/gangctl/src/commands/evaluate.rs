use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use gangway_reconcile::{MemoryCluster, Reconciler, TickOutput};
use gangway_types::{JobPhase, manifest};

use super::load_config;

pub fn evaluate(
    job: &str,
    pods: Option<&str>,
    metrics: Option<&str>,
    config: Option<&str>,
    format: &str,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let job = manifest::load_job(Path::new(job))?;
    let previous = job.status.phase;
    let key = job.key.clone();
    debug!(job = %key, phase = %previous, "evaluating job");

    let cluster = MemoryCluster::new();
    cluster.put_job(job);
    if let Some(path) = pods {
        cluster.set_pods(&key, manifest::load_pods(Path::new(path))?);
    }
    if let Some(path) = metrics {
        cluster.set_readings(&key, manifest::load_readings(Path::new(path))?);
    }

    let shared = Arc::new(cluster);
    let reconciler = Reconciler::new(&config, shared.clone(), shared.clone(), shared.clone())
        .with_metric_source(shared);
    let output = reconciler.reconcile(&key)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("{}", format_report(&key.to_string(), previous, &output));
        }
    }

    Ok(())
}

fn format_report(job: &str, previous: JobPhase, output: &TickOutput) -> String {
    let decision = &output.decision;
    let elastic = &output.elastic;
    let mut lines = vec![format!("Job:       {job}")];

    if decision.phase == previous {
        lines.push(format!("Phase:     {}", decision.phase));
    } else {
        lines.push(format!("Phase:     {} (was {previous})", decision.phase));
    }
    lines.push(format!("Restarts:  {}/{}", decision.restart_count, elastic.restart_budget));
    lines.push(format!(
        "Workers:   {} ({:?}, bounds {}..={})",
        output.plan.target_replicas, elastic.mode, elastic.min_replicas, elastic.max_replicas
    ));
    if let Some(message) = &decision.message {
        lines.push(format!("Message:   {message}"));
    }

    if !decision.restart.is_empty() {
        let restart: Vec<String> = decision.restart.iter().map(ToString::to_string).collect();
        lines.push(format!("Restart:   {}", restart.join(", ")));
    }

    if !output.plan.pods.is_empty() {
        lines.push("Pods:".to_string());
        for pod in &output.plan.pods {
            lines.push(format!(
                "  {}-{:<4} preemptible={}",
                pod.role, pod.index, pod.preemptible
            ));
        }
    }

    if !output.plan.env.is_empty() {
        lines.push("Env:".to_string());
        for (key, value) in &output.plan.env {
            lines.push(format!("  {key}={value}"));
        }
    }

    lines.join("\n")
}
