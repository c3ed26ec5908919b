use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// What kind of audio content a track carries, as detected by metadata
/// keywords, transcription, or language heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioTrackKind {
    Main,
    Commentary,
    Music,
    Sfx,
    NonSpeech,
    Dubbed,
    Original,
}

impl AudioTrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioTrackKind::Main => "main",
            AudioTrackKind::Commentary => "commentary",
            AudioTrackKind::Music => "music",
            AudioTrackKind::Sfx => "sfx",
            AudioTrackKind::NonSpeech => "non_speech",
            AudioTrackKind::Dubbed => "dubbed",
            AudioTrackKind::Original => "original",
        }
    }
}

impl std::str::FromStr for AudioTrackKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(AudioTrackKind::Main),
            "commentary" => Ok(AudioTrackKind::Commentary),
            "music" => Ok(AudioTrackKind::Music),
            "sfx" => Ok(AudioTrackKind::Sfx),
            "non_speech" => Ok(AudioTrackKind::NonSpeech),
            "dubbed" => Ok(AudioTrackKind::Dubbed),
            "original" => Ok(AudioTrackKind::Original),
            other => Err(ModelError::UnknownEnumValue {
                kind: "audio_track_kind",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AudioTrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timed segment of a transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_s: f64,
    pub end_s: f64,
    pub language: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Persisted result of transcribing one audio track.
///
/// The record is a cache entry: it is reusable only while `file_hash`
/// matches the file's current content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRecord {
    pub id: i64,
    pub track_id: i64,
    pub file_hash: String,
    pub detected_language: Option<String>,
    pub confidence_score: f64,
    pub track_type: AudioTrackKind,
    pub plugin_name: String,
    pub transcript_sample: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<TranscriptSegment>,
    pub created_at: DateTime<Utc>,
}

/// How a classification decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Metadata,
    Transcription,
    Acoustic,
    Heuristic,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Metadata => "metadata",
            DetectionMethod::Transcription => "transcription",
            DetectionMethod::Acoustic => "acoustic",
            DetectionMethod::Heuristic => "heuristic",
        }
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata" => Ok(DetectionMethod::Metadata),
            "transcription" => Ok(DetectionMethod::Transcription),
            "acoustic" => Ok(DetectionMethod::Acoustic),
            "heuristic" => Ok(DetectionMethod::Heuristic),
            other => Err(ModelError::UnknownEnumValue {
                kind: "detection_method",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-track classification row (original/dubbed and commentary status).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackClassificationRecord {
    pub id: i64,
    pub track_id: i64,
    pub original_dubbed_status: Option<String>,
    pub commentary_status: Option<String>,
    pub confidence_score: f64,
    pub detection_method: DetectionMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a track carries one language or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LanguageClassification {
    SingleLanguage,
    MultiLanguage,
}

impl LanguageClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageClassification::SingleLanguage => "SINGLE_LANGUAGE",
            LanguageClassification::MultiLanguage => "MULTI_LANGUAGE",
        }
    }
}

impl std::str::FromStr for LanguageClassification {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SINGLE_LANGUAGE" => Ok(LanguageClassification::SingleLanguage),
            "MULTI_LANGUAGE" => Ok(LanguageClassification::MultiLanguage),
            other => Err(ModelError::UnknownEnumValue {
                kind: "language_classification",
                value: other.to_string(),
            }),
        }
    }
}

/// Persisted per-track language analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageAnalysisRecord {
    pub id: i64,
    pub track_id: i64,
    pub file_hash: String,
    pub classification: LanguageClassification,
    pub primary_language: Option<String>,
    /// Share of speech time in the primary language, 0..=100.
    pub primary_percentage: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
