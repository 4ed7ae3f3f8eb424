pub mod evaluate;
pub mod label;
pub mod validate;

use std::path::Path;

use gangway_types::EngineConfig;

/// Load the engine config from `path`, or the defaults.
pub fn load_config(path: Option<&str>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::from_file(Path::new(p)),
        None => Ok(EngineConfig::default()),
    }
}

pub fn show_config(path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
