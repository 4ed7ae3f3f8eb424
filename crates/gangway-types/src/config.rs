//! gangway.toml engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Label key consumed by the gang scheduler.
pub const DEFAULT_PREEMPTIBLE_LABEL: &str = "volcano.sh/preemptable";

/// Restart budget used when a job leaves `max_restarts` unset.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_max_restarts: u32,
    pub preemptible_label: String,
    pub resync_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_restarts: DEFAULT_MAX_RESTARTS,
            preemptible_label: DEFAULT_PREEMPTIBLE_LABEL.to_string(),
            resync_interval_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
