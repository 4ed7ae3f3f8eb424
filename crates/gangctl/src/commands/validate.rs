use std::path::Path;

use gangway_types::{ConfigResult, TrainingJob, manifest};

pub fn validate(path: &str) -> anyhow::Result<()> {
    let job = manifest::load_job(Path::new(path))?;
    match check(&job) {
        Ok(()) => {
            println!("✓ {} is valid", job.key);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ {}: {e}", job.key);
            Err(e.into())
        }
    }
}

/// Spec topology first, then the elastic policy.
fn check(job: &TrainingJob) -> ConfigResult<()> {
    job.spec.validate()?;
    if let Some(policy) = &job.spec.elastic_policy {
        gangway_elastic::validate(policy)?;
    }
    Ok(())
}
