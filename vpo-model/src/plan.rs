use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a video transcode chooses its quality target. CRF and bitrate are
/// mutually exclusive; policy validation rejects documents that set both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    Crf { value: u32 },
    Bitrate { bits_per_second: u64 },
}

/// How the timestamp phase picks the mtime to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Use a release/air date supplied by plugin metadata.
    MetadataDate,
    /// Use an explicit fixed date.
    FixedDate,
    /// Preserve the file's current mtime.
    Preserve,
}

/// Whether a track survives plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum TrackDisposition {
    Keep { track_index: i64 },
    Remove { track_index: i64, reason: String },
}

impl TrackDisposition {
    pub fn track_index(&self) -> i64 {
        match self {
            TrackDisposition::Keep { track_index } => *track_index,
            TrackDisposition::Remove { track_index, .. } => *track_index,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, TrackDisposition::Remove { .. })
    }
}

/// Per-track handling when a container change cannot carry a stream as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackTranscodePlan {
    pub track_index: i64,
    pub target_codec: String,
    pub reason: String,
}

/// A container format change, with sub-plans for incompatible tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerChange {
    pub source_format: String,
    pub target_format: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub track_plans: Vec<TrackTranscodePlan>,
}

/// One typed step of a [`Plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PlannedAction {
    SetDefault {
        track_index: i64,
        value: bool,
    },
    SetForced {
        track_index: i64,
        value: bool,
    },
    SetLanguage {
        track_index: i64,
        /// Canonical ISO 639-2/B code.
        language: String,
    },
    SetTitle {
        track_index: i64,
        title: String,
    },
    /// Reorder the container's tracks; the sequence lists original indices
    /// in their new order and must be a permutation of them.
    Reorder {
        order: Vec<i64>,
    },
    RemoveTrack {
        track_index: i64,
    },
    AddTrack {
        source: String,
        codec: String,
        language: Option<String>,
        title: Option<String>,
        position: Option<i64>,
    },
    SynthesizeAudio {
        source_track_index: i64,
        target_codec: String,
        target_channels: u32,
        target_bitrate: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter_chain: Vec<String>,
        language: Option<String>,
        title: Option<String>,
    },
    TranscodeVideo {
        target_codec: String,
        quality: QualityMode,
        preset: Option<String>,
        tune: Option<String>,
        max_resolution: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extra_args: Vec<String>,
    },
    TranscodeAudio {
        target_codec: String,
        bitrate: Option<String>,
        /// Codecs left untouched even when a transcode is requested.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        preserve_codecs: Vec<String>,
    },
    Remux {
        target_container: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_change: Option<ContainerChange>,
    },
    Move {
        destination_template: String,
        fallback: String,
    },
    SetContainerTag {
        key: String,
        value: String,
    },
    SetFileTimestamp {
        mode: TimestampMode,
        date: Option<DateTime<Utc>>,
        fallback: Option<TimestampMode>,
    },
}

impl PlannedAction {
    /// Structural actions force a container rewrite; metadata-only actions
    /// can be applied in place on MKV-family containers.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PlannedAction::Reorder { .. }
                | PlannedAction::RemoveTrack { .. }
                | PlannedAction::AddTrack { .. }
                | PlannedAction::SynthesizeAudio { .. }
                | PlannedAction::TranscodeVideo { .. }
                | PlannedAction::TranscodeAudio { .. }
                | PlannedAction::Remux { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlannedAction::SetDefault { .. } => "set_default",
            PlannedAction::SetForced { .. } => "set_forced",
            PlannedAction::SetLanguage { .. } => "set_language",
            PlannedAction::SetTitle { .. } => "set_title",
            PlannedAction::Reorder { .. } => "reorder",
            PlannedAction::RemoveTrack { .. } => "remove_track",
            PlannedAction::AddTrack { .. } => "add_track",
            PlannedAction::SynthesizeAudio { .. } => "synthesize_audio",
            PlannedAction::TranscodeVideo { .. } => "transcode_video",
            PlannedAction::TranscodeAudio { .. } => "transcode_audio",
            PlannedAction::Remux { .. } => "remux",
            PlannedAction::Move { .. } => "move",
            PlannedAction::SetContainerTag { .. } => "set_container_tag",
            PlannedAction::SetFileTimestamp { .. } => "set_file_timestamp",
        }
    }
}

/// Immutable snapshot of one policy evaluation.
///
/// A plan is either empty (a no-op) or carries at least one action.
/// Re-applying a plan to the file state it produced is a no-op: metadata
/// edits are idempotent and structural actions are computed from current
/// state, so the second run finds nothing to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub policy_version: u32,
    pub created_at: DateTime<Utc>,
    pub actions: Vec<PlannedAction>,
    pub track_dispositions: Vec<TrackDisposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_change: Option<ContainerChange>,
    pub requires_remux: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn empty(policy_version: u32) -> Self {
        Self {
            policy_version,
            created_at: Utc::now(),
            actions: Vec::new(),
            track_dispositions: Vec::new(),
            container_change: None,
            requires_remux: false,
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn removals(&self) -> impl Iterator<Item = &TrackDisposition> {
        self.track_dispositions.iter().filter(|d| d.is_remove())
    }

    pub fn has_structural_change(&self) -> bool {
        self.actions.iter().any(PlannedAction::is_structural)
    }
}
