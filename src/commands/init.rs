//! Config init/show implementation

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Write a default configuration file at `config_path`
pub fn cmd_init(config_path: &Path, force: bool) -> Result<PathBuf> {
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.set_config_path(config_path);
    config.validate()?;
    config.save()?;

    info!("Created config at {:?}", config_path);
    Ok(config_path.to_path_buf())
}

/// Effective configuration rendered as TOML
pub fn cmd_config_show(config: &Config) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

/// Resolve `--config`: a `.toml` file as is, anything else as a directory
pub fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => path.to_path_buf(),
        Some(dir) => dir.join("config.toml"),
        None => Config::default_config_path(),
    }
}
