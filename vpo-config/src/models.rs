//! Configuration models.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::default_data_dir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// When set, all endpoints except `/health` require HTTP Basic with
    /// this token as the password.
    pub auth_token: Option<String>,
    /// Secret for encrypted session cookies; absent means an ephemeral
    /// key is generated at startup with a warning.
    pub session_secret: Option<String>,
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8321,
            auth_token: None,
            session_secret: None,
            shutdown_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub retention_days: i64,
    pub log_compression_days: i64,
    pub log_deletion_days: i64,
    pub auto_purge: bool,
    /// Keep `.vpo-backup` files after successful operations.
    pub backup_original: bool,
    pub min_free_disk_percent: f64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            log_compression_days: 7,
            log_deletion_days: 30,
            auto_purge: true,
            backup_original: false,
            min_free_disk_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Worker pool size.
    pub workers: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub mkvmerge: Option<PathBuf>,
    pub mkvpropedit: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub plugin: String,
    pub model_size: String,
    pub sample_duration: u32,
    pub max_samples: u32,
    pub confidence_threshold: f64,
    pub incumbent_bonus: f64,
    pub gpu_enabled: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            plugin: "whisper".to_string(),
            model_size: "base".to_string(),
            sample_duration: 30,
            max_samples: 3,
            confidence_threshold: 0.85,
            incumbent_bonus: 0.15,
            gpu_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Canonical storage standard for language codes.
    pub standard: String,
    pub warn_on_conversion: bool,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            standard: "639-2/B".to_string(),
            warn_on_conversion: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub plugin_dirs: Vec<PathBuf>,
    pub auto_load: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: vec![default_data_dir().join("plugins")],
            auto_load: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub warn_on_missing_features: bool,
    pub show_upgrade_suggestions: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            warn_on_missing_features: true,
            show_upgrade_suggestions: true,
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpoConfig {
    pub database_path: PathBuf,
    pub policies_dir: PathBuf,
    pub server: ServerConfig,
    pub jobs: JobsConfig,
    pub processing: ProcessingConfig,
    pub tools: ToolsConfig,
    pub transcription: TranscriptionConfig,
    pub language: LanguageConfig,
    pub logging: LoggingConfig,
    pub plugins: PluginsConfig,
    pub behavior: BehaviorConfig,
}

impl Default for VpoConfig {
    fn default() -> Self {
        let data = default_data_dir();
        Self {
            database_path: data.join("vpo.db"),
            policies_dir: data.join("policies"),
            server: ServerConfig::default(),
            jobs: JobsConfig::default(),
            processing: ProcessingConfig::default(),
            tools: ToolsConfig::default(),
            transcription: TranscriptionConfig::default(),
            language: LanguageConfig::default(),
            logging: LoggingConfig::default(),
            plugins: PluginsConfig::default(),
            behavior: BehaviorConfig::default(),
        }
    }
}
