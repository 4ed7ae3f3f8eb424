//! Loading job manifests and observation files from disk.
//!
//! Job manifests may be TOML or JSON, picked by file extension. Pod
//! observations and metric readings are JSON arrays.

use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{MetricReading, PodObservation, TrainingJob};

/// Parse a job manifest from a string in the given format.
pub fn parse_job(content: &str, format: ManifestFormat) -> ConfigResult<TrainingJob> {
    match format {
        ManifestFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::Manifest(e.to_string()))
        }
        ManifestFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Manifest(e.to_string()))
        }
    }
}

/// Manifest encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Json,
}

impl ManifestFormat {
    /// `.json` files are JSON, everything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ManifestFormat::Json,
            _ => ManifestFormat::Toml,
        }
    }
}

/// Read and parse a job manifest file.
pub fn load_job(path: &Path) -> anyhow::Result<TrainingJob> {
    let content = std::fs::read_to_string(path)?;
    let job = parse_job(&content, ManifestFormat::from_path(path))?;
    debug!(?path, job = %job.key, "job manifest loaded");
    Ok(job)
}

/// Read a JSON array of pod observations.
pub fn load_pods(path: &Path) -> anyhow::Result<Vec<PodObservation>> {
    load_json(path)
}

/// Read a JSON array of metric readings.
pub fn load_readings(path: &Path) -> anyhow::Result<Vec<MetricReading>> {
    load_json(path)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
