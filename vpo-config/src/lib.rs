//! Configuration loading and hot-reload support for VPO.
//!
//! Configuration lives in `~/.vpo/config.toml` by default. Every field has
//! a default, so a missing file yields a fully working configuration
//! rooted at the user's data directory.

pub mod models;
pub mod reload;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use models::{
    BehaviorConfig, JobsConfig, LanguageConfig, LoggingConfig, PluginsConfig,
    ProcessingConfig, ServerConfig, ToolsConfig, TranscriptionConfig, VpoConfig,
};
pub use reload::{diff_configs, ReloadResult, ReloadState, REQUIRES_RESTART_FIELDS};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Default data directory: `~/.vpo`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vpo")
}

/// Default config file path: `<data>/config.toml`.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Loads configuration from the given path, or the default location when
/// `None`. A missing file is not an error; defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<VpoConfig, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(VpoConfig::default());
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config: VpoConfig =
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
    Ok(config)
}
