use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Outcome of the most recent scan of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Ok,
    Error,
    Missing,
    Pending,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Ok => "ok",
            ScanStatus::Error => "error",
            ScanStatus::Missing => "missing",
            ScanStatus::Pending => "pending",
        }
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(ScanStatus::Ok),
            "error" => Ok(ScanStatus::Error),
            "missing" => Ok(ScanStatus::Missing),
            "pending" => Ok(ScanStatus::Pending),
            other => Err(ModelError::UnknownEnumValue {
                kind: "scan_status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container-native stream category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Attachment,
    Other,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Subtitle => "subtitle",
            TrackKind::Attachment => "attachment",
            TrackKind::Other => "other",
        }
    }

    /// Maps an ffprobe `codec_type` onto a track kind. Unknown types land in
    /// [`TrackKind::Other`].
    pub fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => TrackKind::Video,
            "audio" => TrackKind::Audio,
            "subtitle" => TrackKind::Subtitle,
            "attachment" => TrackKind::Attachment,
            _ => TrackKind::Other,
        }
    }
}

impl Default for TrackKind {
    fn default() -> Self {
        TrackKind::Other
    }
}

impl std::str::FromStr for TrackKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(TrackKind::Video),
            "audio" => Ok(TrackKind::Audio),
            "subtitle" => Ok(TrackKind::Subtitle),
            "attachment" => Ok(TrackKind::Attachment),
            "other" => Ok(TrackKind::Other),
            other => Err(ModelError::UnknownEnumValue {
                kind: "track_kind",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-plugin opaque metadata attached to a file, keyed by plugin name.
pub type PluginMetadata = BTreeMap<String, serde_json::Value>;

/// A cataloged media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    /// Absolute path; unique within the catalog.
    pub path: PathBuf,
    pub filename: String,
    pub directory: String,
    pub extension: String,
    pub size_bytes: i64,
    pub modified_at: DateTime<Utc>,
    /// Opaque content hash used as the analysis cache key; not computed by
    /// the scanner unless hashing is requested.
    pub content_hash: Option<String>,
    pub container_format: Option<String>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scan_status: ScanStatus,
    pub scan_error: Option<String>,
    pub plugin_metadata: PluginMetadata,
}

/// A cataloged track row, owned by its file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: i64,
    pub file_id: i64,
    /// Container-native stream index; unique per file.
    pub track_index: i64,
    pub track_type: TrackKind,
    pub codec: Option<String>,
    /// Canonical ISO 639-2/B code; normalized at write time.
    pub language: Option<String>,
    pub title: Option<String>,
    pub is_default: bool,
    pub is_forced: bool,
    pub channels: Option<i64>,
    pub channel_layout: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub frame_rate: Option<String>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub color_space: Option<String>,
    pub color_range: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl TrackRecord {
    /// Key used when looking this track up in signal maps (transcription,
    /// classification, language analysis). Catalog id when present, stream
    /// index otherwise. The fallback keeps cache hits across re-scans.
    pub fn signal_key(&self) -> i64 {
        if self.id > 0 { self.id } else { self.track_index }
    }
}

/// Track metadata as reported by the probe tool, before cataloging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackInfo {
    pub index: i64,
    pub track_type: TrackKind,
    pub codec: Option<String>,
    pub language: Option<String>,
    pub title: Option<String>,
    pub is_default: bool,
    pub is_forced: bool,
    pub channels: Option<i64>,
    pub channel_layout: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub frame_rate: Option<String>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub color_space: Option<String>,
    pub color_range: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl TrackInfo {
    pub fn is_video(&self) -> bool {
        self.track_type == TrackKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.track_type == TrackKind::Audio
    }

    pub fn is_subtitle(&self) -> bool {
        self.track_type == TrackKind::Subtitle
    }
}

/// Full probe result for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    pub file_path: PathBuf,
    pub container_format: Option<String>,
    pub container_duration: Option<f64>,
    /// Sanitized container-level tags (keys case-folded).
    pub container_tags: BTreeMap<String, String>,
    pub tracks: Vec<TrackInfo>,
    pub warnings: Vec<String>,
}

impl IntrospectionResult {
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.is_video())
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.iter().filter(|t| t.is_audio())
    }

    pub fn subtitle_tracks(&self) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.iter().filter(|t| t.is_subtitle())
    }
}
