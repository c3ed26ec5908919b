//! Transcription plugin interface and audio sampling.

mod extract;
mod multi_sample;

use async_trait::async_trait;

use vpo_model::TranscriptSegment;

use crate::error::TranscriptionError;

pub use extract::{AudioSampleExtractor, FfmpegAudioExtractor};
pub use multi_sample::{
    aggregate_results, calculate_sample_positions, smart_detect, AggregatedResult,
    MultiSampleConfig, SampleResult,
};

/// Result of a single plugin invocation on one audio chunk.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub language: Option<String>,
    pub confidence: f64,
    pub transcript_sample: Option<String>,
    pub segments: Vec<TranscriptSegment>,
}

/// A language-detection / transcription backend.
///
/// Plugins are loaded lazily; a missing model or dependency fails open
/// (the plugin is simply not registered) rather than crashing startup.
#[async_trait]
pub trait TranscriptionPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Capability probe; callers must not assume every plugin implements
    /// every feature. Known features: `detect_language`, `transcribe`,
    /// `segments`.
    fn supports_feature(&self, feature: &str) -> bool;

    /// Detects the dominant language of a PCM audio chunk.
    async fn detect_language(&self, audio: &[u8]) -> Result<DetectionResult, TranscriptionError>;

    /// Full transcription with timed segments.
    async fn transcribe(&self, audio: &[u8]) -> Result<DetectionResult, TranscriptionError>;
}
