//! Audio sample extraction via the transcode tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TranscriptionError;

/// Extracts short PCM chunks from an audio track for language detection.
#[async_trait]
pub trait AudioSampleExtractor: Send + Sync {
    async fn extract(
        &self,
        path: &Path,
        track_index: i64,
        start_offset: f64,
        duration: u32,
    ) -> Result<Vec<u8>, TranscriptionError>;
}

/// ffmpeg-backed extractor producing 16 kHz mono s16le PCM, the input
/// format transcription plugins expect.
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    tool_path: PathBuf,
    timeout: Duration,
}

impl FfmpegAudioExtractor {
    pub fn new(tool_path: PathBuf) -> Self {
        Self {
            tool_path,
            timeout: Duration::from_secs(120),
        }
    }
}

#[async_trait]
impl AudioSampleExtractor for FfmpegAudioExtractor {
    async fn extract(
        &self,
        path: &Path,
        track_index: i64,
        start_offset: f64,
        duration: u32,
    ) -> Result<Vec<u8>, TranscriptionError> {
        debug!(
            path = %path.display(),
            track_index,
            start_offset,
            duration,
            "extracting audio sample"
        );

        let mut command = tokio::process::Command::new(&self.tool_path);
        command
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{start_offset:.3}"))
            .arg("-i")
            .arg(path)
            .arg("-map")
            .arg(format!("0:{track_index}"))
            .arg("-t")
            .arg(duration.to_string())
            .arg("-f")
            .arg("s16le")
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                TranscriptionError::ExtractionFailed(format!(
                    "sample extraction timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| TranscriptionError::ExtractionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptionError::ExtractionFailed(
                stderr.chars().take(512).collect(),
            ));
        }
        if output.stdout.is_empty() {
            return Err(TranscriptionError::ExtractionFailed(
                "tool produced no audio data".to_string(),
            ));
        }
        Ok(output.stdout)
    }
}
