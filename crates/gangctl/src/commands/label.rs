use std::path::Path;

use gangway_preemption::PreemptionLabeler;
use gangway_types::{PodTemplate, ReplicaRole, manifest};

use super::load_config;

pub fn label(path: &str, role: &str, index: &str, config: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let job = manifest::load_job(Path::new(path))?;
    let role: ReplicaRole = role.parse()?;

    let labeler = PreemptionLabeler::new(&config);
    let mut template = job
        .spec
        .replica_specs
        .get(&role)
        .map(|rs| rs.template.clone())
        .unwrap_or_else(PodTemplate::default);
    let preemptible = labeler.label_template(&job.spec, role, index, &mut template)?;

    println!("{}={preemptible}", labeler.label_key());
    Ok(())
}
