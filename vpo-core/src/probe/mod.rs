//! Media introspection via the external probe tool.
//!
//! The engine consumes probing through the [`MediaProber`] trait; the
//! default implementation shells out to ffprobe with JSON output and runs
//! the result through the sanitizing parser in [`parse`].

mod parse;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use vpo_model::IntrospectionResult;

use crate::error::ProbeError;

pub use parse::{channel_layout_label, parse_probe_output};

/// Default per-invocation timeout for the probe tool.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Extracts container and per-track metadata from a file on disk.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<IntrospectionResult, ProbeError>;
}

/// ffprobe-backed [`MediaProber`].
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    tool_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(tool_path: PathBuf) -> Self {
        Self {
            tool_path,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<IntrospectionResult, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::FileNotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), tool = %self.tool_path.display(), "probing file");

        let mut command = tokio::process::Command::new(&self.tool_path);
        command
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg("-show_format")
            .arg(path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ProbeError::ToolUnavailable(self.tool_path.display().to_string())
                }
                _ => ProbeError::Io(e),
            })?,
            Err(_) => {
                return Err(ProbeError::Timeout {
                    path: path.to_path_buf(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::ToolFailed {
                path: path.to_path_buf(),
                stderr: stderr.chars().take(512).collect(),
            });
        }

        // Lossy conversion doubles as the UTF-8-replacing sanitizer for the
        // whole payload; per-field limits are applied during parsing.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let data: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|source| ProbeError::InvalidOutput {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(parse_probe_output(path, &data))
    }
}
