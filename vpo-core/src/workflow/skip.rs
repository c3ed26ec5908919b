//! Phase skip-condition evaluation.
//!
//! `skip_when` entries are a union: any matching configured field of any
//! entry skips the phase, recording which condition fired and the value
//! that matched.

use std::path::Path;

use vpo_model::{
    codec_aliases, height_to_resolution_label, resolution_label_to_height, FileRecord,
    TrackKind, TrackRecord,
};

use crate::language::languages_match;
use crate::policy::conditions::{parse_duration, parse_file_size};
use crate::policy::types::PhaseSkipCondition;

/// Why a phase was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReasonType {
    /// A `skip_when` condition matched.
    Condition,
    /// A precondition for the phase body was not met.
    Precondition,
    /// The phase had nothing to do.
    Noop,
}

#[derive(Debug, Clone)]
pub struct SkipReason {
    pub reason_type: SkipReasonType,
    pub message: String,
    pub condition_name: Option<String>,
    pub condition_value: Option<String>,
}

impl SkipReason {
    pub fn noop(message: impl Into<String>) -> Self {
        Self {
            reason_type: SkipReasonType::Noop,
            message: message.into(),
            condition_name: None,
            condition_value: None,
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self {
            reason_type: SkipReasonType::Precondition,
            message: message.into(),
            condition_name: None,
            condition_value: None,
        }
    }

    fn condition(
        name: &str,
        message: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            reason_type: SkipReasonType::Condition,
            message: message.into(),
            condition_name: Some(name.to_string()),
            condition_value: Some(value.into()),
        }
    }
}

fn video_track(tracks: &[TrackRecord]) -> Option<&TrackRecord> {
    tracks.iter().find(|t| t.track_type == TrackKind::Video)
}

/// Evaluates one skip condition entry against the file. Returns the first
/// matching field's reason, `None` when nothing matches.
pub fn evaluate_skip_when(
    condition: &PhaseSkipCondition,
    file: &FileRecord,
    tracks: &[TrackRecord],
    file_path: &Path,
) -> Option<SkipReason> {
    if let Some(target_codecs) = &condition.video_codec
        && let Some(video) = video_track(tracks)
        && let Some(codec) = &video.codec
    {
        let aliases = codec_aliases(codec);
        if target_codecs
            .iter()
            .any(|target| aliases.contains(&target.to_lowercase()))
        {
            return Some(SkipReason::condition(
                "video_codec",
                format!("video_codec matches [{}]", target_codecs.join(", ")),
                codec.clone(),
            ));
        }
    }

    if let Some(target) = &condition.audio_codec_exists {
        let lowered = target.to_lowercase();
        for track in tracks {
            if track.track_type == TrackKind::Audio
                && let Some(codec) = &track.codec
                && codec.to_lowercase() == lowered
            {
                return Some(SkipReason::condition(
                    "audio_codec_exists",
                    format!("audio_codec_exists: {lowered}"),
                    codec.clone(),
                ));
            }
        }
    }

    if let Some(target) = &condition.subtitle_language_exists {
        for track in tracks {
            if track.track_type == TrackKind::Subtitle
                && languages_match(track.language.as_deref(), Some(target))
            {
                return Some(SkipReason::condition(
                    "subtitle_language_exists",
                    format!("subtitle_language_exists: {target}"),
                    track.language.clone().unwrap_or_default(),
                ));
            }
        }
    }

    if let Some(containers) = &condition.container
        && let Some(format) = &file.container_format
    {
        let lowered = format.to_lowercase();
        if containers.iter().any(|c| {
            let target = c.to_lowercase();
            lowered.split(',').any(|part| part.trim() == target)
        }) {
            return Some(SkipReason::condition(
                "container",
                format!("container matches [{}]", containers.join(", ")),
                format.clone(),
            ));
        }
    }

    if let Some(target) = &condition.resolution
        && let Some(height) = video_track(tracks).and_then(|t| t.height)
    {
        let actual = height_to_resolution_label(height);
        if resolution_label_to_height(target) == resolution_label_to_height(actual) {
            return Some(SkipReason::condition(
                "resolution",
                format!("resolution matches {target}"),
                actual,
            ));
        }
    }

    if let Some(target) = &condition.resolution_under
        && let Some(height) = video_track(tracks).and_then(|t| t.height)
        && let Some(threshold) = resolution_label_to_height(target)
        && height < threshold
    {
        let actual = height_to_resolution_label(height);
        return Some(SkipReason::condition(
            "resolution_under",
            format!("resolution ({actual}) under {target}"),
            actual,
        ));
    }

    let file_size = if file.size_bytes > 0 {
        Some(file.size_bytes)
    } else {
        std::fs::metadata(file_path).map(|m| m.len() as i64).ok()
    };

    if let Some(limit) = &condition.file_size_under
        && let (Some(threshold), Some(size)) = (parse_file_size(limit), file_size)
        && size < threshold
    {
        return Some(SkipReason::condition(
            "file_size_under",
            format!("file_size ({size} bytes) under {limit}"),
            size.to_string(),
        ));
    }

    if let Some(limit) = &condition.file_size_over
        && let (Some(threshold), Some(size)) = (parse_file_size(limit), file_size)
        && size > threshold
    {
        return Some(SkipReason::condition(
            "file_size_over",
            format!("file_size ({size} bytes) over {limit}"),
            size.to_string(),
        ));
    }

    let duration = video_track(tracks).and_then(|t| t.duration_seconds);

    if let Some(limit) = &condition.duration_under
        && let (Some(threshold), Some(actual)) = (parse_duration(limit), duration)
        && actual < threshold
    {
        return Some(SkipReason::condition(
            "duration_under",
            format!("duration ({actual:.1}s) under {limit}"),
            format!("{actual:.1}s"),
        ));
    }

    if let Some(limit) = &condition.duration_over
        && let (Some(threshold), Some(actual)) = (parse_duration(limit), duration)
        && actual > threshold
    {
        return Some(SkipReason::condition(
            "duration_over",
            format!("duration ({actual:.1}s) over {limit}"),
            format!("{actual:.1}s"),
        ));
    }

    None
}

/// Evaluates every `skip_when` entry of a phase (OR semantics).
pub fn evaluate_phase_skip(
    conditions: &[PhaseSkipCondition],
    file: &FileRecord,
    tracks: &[TrackRecord],
    file_path: &Path,
) -> Option<SkipReason> {
    conditions
        .iter()
        .find_map(|condition| evaluate_skip_when(condition, file, tracks, file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn file() -> FileRecord {
        FileRecord {
            id: 1,
            path: PathBuf::from("/x/movie.mkv"),
            filename: "movie.mkv".into(),
            directory: "/x".into(),
            extension: "mkv".into(),
            size_bytes: 6 * 1024 * 1024 * 1024,
            modified_at: Utc::now(),
            content_hash: None,
            container_format: Some("matroska,webm".into()),
            scanned_at: None,
            scan_status: vpo_model::ScanStatus::Ok,
            scan_error: None,
            plugin_metadata: Default::default(),
        }
    }

    fn video(codec: &str, height: i64, duration: f64) -> TrackRecord {
        TrackRecord {
            id: 1,
            file_id: 1,
            track_index: 0,
            track_type: TrackKind::Video,
            codec: Some(codec.into()),
            language: None,
            title: None,
            is_default: true,
            is_forced: false,
            channels: None,
            channel_layout: None,
            width: Some(1920),
            height: Some(height),
            frame_rate: None,
            color_transfer: None,
            color_primaries: None,
            color_space: None,
            color_range: None,
            duration_seconds: Some(duration),
        }
    }

    #[test]
    fn video_codec_alias_match_skips() {
        let condition = PhaseSkipCondition {
            video_codec: Some(vec!["h265".into()]),
            ..Default::default()
        };
        let tracks = vec![video("hevc", 1080, 3600.0)];
        let reason =
            evaluate_skip_when(&condition, &file(), &tracks, Path::new("/x/movie.mkv"))
                .expect("should skip");
        assert_eq!(reason.reason_type, SkipReasonType::Condition);
        assert_eq!(reason.condition_name.as_deref(), Some("video_codec"));
    }

    #[test]
    fn container_multi_name_matches_member() {
        let condition = PhaseSkipCondition {
            container: Some(vec!["webm".into()]),
            ..Default::default()
        };
        let tracks = vec![video("vp9", 1080, 60.0)];
        assert!(
            evaluate_skip_when(&condition, &file(), &tracks, Path::new("/x/movie.mkv"))
                .is_some()
        );
    }

    #[test]
    fn resolution_under_compares_height() {
        let condition = PhaseSkipCondition {
            resolution_under: Some("1080p".into()),
            ..Default::default()
        };
        let under = vec![video("h264", 720, 3600.0)];
        let at = vec![video("h264", 1080, 3600.0)];
        assert!(
            evaluate_skip_when(&condition, &file(), &under, Path::new("/x/movie.mkv"))
                .is_some()
        );
        assert!(
            evaluate_skip_when(&condition, &file(), &at, Path::new("/x/movie.mkv")).is_none()
        );
    }

    #[test]
    fn size_and_duration_bounds() {
        let tracks = vec![video("h264", 1080, 5400.0)];
        let f = file();
        let over = PhaseSkipCondition {
            file_size_over: Some("5GB".into()),
            ..Default::default()
        };
        assert!(evaluate_skip_when(&over, &f, &tracks, &f.path).is_some());

        let under = PhaseSkipCondition {
            duration_under: Some("2h".into()),
            ..Default::default()
        };
        assert!(evaluate_skip_when(&under, &f, &tracks, &f.path).is_some());

        let no_match = PhaseSkipCondition {
            duration_over: Some("2h".into()),
            ..Default::default()
        };
        assert!(evaluate_skip_when(&no_match, &f, &tracks, &f.path).is_none());
    }

    #[test]
    fn empty_condition_never_matches() {
        let tracks = vec![video("h264", 1080, 3600.0)];
        let f = file();
        assert!(
            evaluate_skip_when(&PhaseSkipCondition::default(), &f, &tracks, &f.path).is_none()
        );
    }
}
