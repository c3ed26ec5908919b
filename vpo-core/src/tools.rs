//! External tool discovery and capability caching.
//!
//! The probe, mux, and transcode tools are discovered at startup through a
//! configured path or PATH lookup, version-probed once, and cached in
//! `~/.vpo/tool-capabilities.json` so later runs skip the subprocess calls.
//! The cache file is written via temp-file + atomic rename.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};

/// Cache schema version; bumps invalidate older cache files.
const CACHE_SCHEMA_VERSION: u32 = 1;

/// Default cache TTL.
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Available,
    Missing,
    Error,
}

/// Detection result for one external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub status: ToolStatus,
    pub status_message: Option<String>,
    pub detected_at: Option<DateTime<Utc>>,
}

impl ToolInfo {
    fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            version: None,
            status: ToolStatus::Missing,
            status_message: Some(format!("{name} not found on PATH")),
            detected_at: Some(Utc::now()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ToolStatus::Available
    }
}

/// All detected tools plus cache validity bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistry {
    pub version: u32,
    pub ffmpeg: ToolInfo,
    pub ffprobe: ToolInfo,
    pub mkvmerge: ToolInfo,
    pub mkvpropedit: ToolInfo,
    pub detected_at: DateTime<Utc>,
    pub cache_valid_until: Option<DateTime<Utc>>,
}

impl ToolRegistry {
    pub fn tool(&self, name: &str) -> Option<&ToolInfo> {
        match name {
            "ffmpeg" => Some(&self.ffmpeg),
            "ffprobe" => Some(&self.ffprobe),
            "mkvmerge" => Some(&self.mkvmerge),
            "mkvpropedit" => Some(&self.mkvpropedit),
            _ => None,
        }
    }

    pub fn tool_path(&self, name: &str) -> Option<&Path> {
        self.tool(name)
            .filter(|t| t.is_available())
            .and_then(|t| t.path.as_deref())
    }
}

/// Explicit tool path overrides from configuration.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub mkvmerge: Option<PathBuf>,
    pub mkvpropedit: Option<PathBuf>,
}

async fn probe_version(name: &str, path: &Path) -> ToolInfo {
    let mut command = tokio::process::Command::new(path);
    command
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let outcome = tokio::time::timeout(Duration::from_secs(10), command.output()).await;
    match outcome {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout.lines().next().map(|l| l.trim().to_string());
            ToolInfo {
                name: name.to_string(),
                path: Some(path.to_path_buf()),
                version,
                status: ToolStatus::Available,
                status_message: None,
                detected_at: Some(Utc::now()),
            }
        }
        Ok(Ok(output)) => ToolInfo {
            name: name.to_string(),
            path: Some(path.to_path_buf()),
            version: None,
            status: ToolStatus::Error,
            status_message: Some(format!(
                "version probe exited with {}",
                output.status.code().unwrap_or(-1)
            )),
            detected_at: Some(Utc::now()),
        },
        Ok(Err(e)) => ToolInfo {
            name: name.to_string(),
            path: Some(path.to_path_buf()),
            version: None,
            status: ToolStatus::Error,
            status_message: Some(e.to_string()),
            detected_at: Some(Utc::now()),
        },
        Err(_) => ToolInfo {
            name: name.to_string(),
            path: Some(path.to_path_buf()),
            version: None,
            status: ToolStatus::Error,
            status_message: Some("version probe timed out".to_string()),
            detected_at: Some(Utc::now()),
        },
    }
}

async fn detect_tool(name: &str, configured: Option<&Path>) -> ToolInfo {
    let resolved = match configured {
        Some(path) => Some(path.to_path_buf()),
        None => which::which(name).ok(),
    };
    match resolved {
        Some(path) if path.exists() => probe_version(name, &path).await,
        Some(path) => ToolInfo {
            name: name.to_string(),
            path: Some(path),
            version: None,
            status: ToolStatus::Missing,
            status_message: Some("configured path does not exist".to_string()),
            detected_at: Some(Utc::now()),
        },
        None => ToolInfo::missing(name),
    }
}

/// Runs detection for all tools, ignoring any cache.
pub async fn detect_all_tools(paths: &ToolPaths) -> ToolRegistry {
    let ffmpeg = detect_tool("ffmpeg", paths.ffmpeg.as_deref()).await;
    let ffprobe = detect_tool("ffprobe", paths.ffprobe.as_deref()).await;
    let mkvmerge = detect_tool("mkvmerge", paths.mkvmerge.as_deref()).await;
    let mkvpropedit = detect_tool("mkvpropedit", paths.mkvpropedit.as_deref()).await;

    ToolRegistry {
        version: CACHE_SCHEMA_VERSION,
        ffmpeg,
        ffprobe,
        mkvmerge,
        mkvpropedit,
        detected_at: Utc::now(),
        cache_valid_until: None,
    }
}

/// JSON-file cache for detection results.
#[derive(Debug, Clone)]
pub struct ToolCapabilityCache {
    cache_path: PathBuf,
    ttl: chrono::Duration,
}

impl ToolCapabilityCache {
    pub fn new(cache_path: PathBuf, ttl_hours: i64) -> Self {
        Self {
            cache_path,
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    /// Loads the cached registry if present, parseable, schema-compatible,
    /// and not expired.
    pub fn load(&self) -> Option<ToolRegistry> {
        let content = std::fs::read_to_string(&self.cache_path).ok()?;
        let registry: ToolRegistry = match serde_json::from_str(&content) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "failed to load tool cache");
                return None;
            }
        };
        if registry.version != CACHE_SCHEMA_VERSION {
            debug!(found = registry.version, "tool cache schema mismatch");
            return None;
        }
        if let Some(valid_until) = registry.cache_valid_until
            && Utc::now() > valid_until
        {
            debug!(expired_at = %valid_until, "tool cache expired");
            return None;
        }
        Some(registry)
    }

    /// Saves the registry atomically (temp file + rename in the cache dir).
    pub fn save(&self, registry: &mut ToolRegistry) -> Result<()> {
        registry.cache_valid_until = Some(Utc::now() + self.ttl);

        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(registry)?;
        let parent = self
            .cache_path
            .parent()
            .ok_or_else(|| CoreError::Internal("cache path has no parent".to_string()))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(CoreError::Io)?;
        temp.write_all(json.as_bytes())?;
        temp.persist(&self.cache_path)
            .map_err(|e| CoreError::Io(e.error))?;
        debug!(path = %self.cache_path.display(), "saved tool cache");
        Ok(())
    }

    pub fn invalidate(&self) {
        if self.cache_path.exists()
            && let Err(e) = std::fs::remove_file(&self.cache_path)
        {
            warn!(path = %self.cache_path.display(), error = %e, "failed to invalidate tool cache");
        }
    }
}

/// Main entry point: cached registry when valid and configured paths are
/// unchanged, fresh detection otherwise.
pub async fn get_tool_registry(
    force_refresh: bool,
    cache: &ToolCapabilityCache,
    paths: &ToolPaths,
) -> ToolRegistry {
    if !force_refresh
        && let Some(registry) = cache.load()
    {
        let pairs = [
            (paths.ffmpeg.as_deref(), registry.ffmpeg.path.as_deref()),
            (paths.ffprobe.as_deref(), registry.ffprobe.path.as_deref()),
            (paths.mkvmerge.as_deref(), registry.mkvmerge.path.as_deref()),
            (
                paths.mkvpropedit.as_deref(),
                registry.mkvpropedit.path.as_deref(),
            ),
        ];
        let paths_match = pairs
            .iter()
            .all(|(cfg, cached)| cfg.is_none() || cached.is_none() || cfg == cached);
        if paths_match {
            return registry;
        }
        debug!("configured tool paths changed, refreshing detection");
    }

    let mut registry = detect_all_tools(paths).await;
    if let Err(e) = cache.save(&mut registry) {
        warn!(error = %e, "failed to save tool cache");
    }
    registry
}
