//! Sanitizing parser for probe tool JSON output.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use vpo_model::{IntrospectionResult, TrackInfo, TrackKind};

use crate::language;

/// Tag values longer than this are dropped with a warning.
const MAX_TAG_VALUE_LEN: usize = 4096;

/// Tag keys longer than this are dropped with a warning.
const MAX_TAG_KEY_LEN: usize = 256;

/// Maps a channel count onto a layout label.
pub fn channel_layout_label(channels: i64) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        6 => "5.1".to_string(),
        8 => "7.1".to_string(),
        n => format!("{n}ch"),
    }
}

fn sanitize_str(value: &str) -> String {
    // The payload already went through a lossy UTF-8 pass; strip any
    // remaining control characters that would corrupt log lines.
    value.chars().filter(|c| !c.is_control()).collect()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(sanitize_str)
        .filter(|s| !s.is_empty())
}

/// Non-negative integer field; invalid values become `None` with a warning.
fn int_field(value: &Value, key: &str, context: &str, warnings: &mut Vec<String>) -> Option<i64> {
    let raw = value.get(key)?;
    match raw.as_i64() {
        Some(n) if n >= 0 => Some(n),
        _ => {
            warnings.push(format!("invalid {key} for {context}: {raw}"));
            None
        }
    }
}

/// Duration fields arrive as strings; non-negative floats only.
fn duration_field(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|d| d.is_finite() && *d >= 0.0)
}

fn parse_tags(value: &Value, warnings: &mut Vec<String>) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    let Some(map) = value.get("tags").and_then(Value::as_object) else {
        return tags;
    };
    for (key, raw) in map {
        if key.len() > MAX_TAG_KEY_LEN {
            warnings.push(format!(
                "dropping tag with oversized key ({} bytes)",
                key.len()
            ));
            continue;
        }
        let Some(text) = raw.as_str() else { continue };
        if text.len() > MAX_TAG_VALUE_LEN {
            warnings.push(format!(
                "dropping oversized value for tag '{}' ({} bytes)",
                key.to_lowercase(),
                text.len()
            ));
            continue;
        }
        tags.insert(key.to_lowercase(), sanitize_str(text));
    }
    tags
}

/// Parses probe tool JSON into a typed result, recording warnings for
/// every value that had to be rejected or substituted.
pub fn parse_probe_output(path: &Path, data: &Value) -> IntrospectionResult {
    let mut warnings = Vec::new();

    let format = data.get("format").cloned().unwrap_or(Value::Null);
    let container_format = string_field(&format, "format_name");
    let container_duration = format.get("duration").and_then(duration_field);
    let container_tags = parse_tags(&format, &mut warnings);

    let streams = data
        .get("streams")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut tracks: Vec<TrackInfo> = Vec::with_capacity(streams.len());
    let mut seen_indices = std::collections::HashSet::new();

    for stream in &streams {
        let index = stream.get("index").and_then(Value::as_i64).unwrap_or(0);
        if !seen_indices.insert(index) {
            warnings.push(format!("duplicate stream index {index}, skipping"));
            continue;
        }

        let codec_type = stream
            .get("codec_type")
            .and_then(Value::as_str)
            .unwrap_or("");
        let track_type = TrackKind::from_codec_type(codec_type);

        let disposition = stream.get("disposition").cloned().unwrap_or(Value::Null);
        let is_default = disposition.get("default").and_then(Value::as_i64) == Some(1);
        let is_forced = disposition.get("forced").and_then(Value::as_i64) == Some(1);

        let tags = parse_tags(stream, &mut warnings);
        let language = Some(language::normalize(tags.get("language").map(String::as_str)));
        let title = tags.get("title").cloned();

        let context = format!("stream {index}");
        let mut track = TrackInfo {
            index,
            track_type,
            codec: string_field(stream, "codec_name"),
            language,
            title,
            is_default,
            is_forced,
            ..TrackInfo::default()
        };

        // Stream duration, falling back to the container's.
        track.duration_seconds = stream
            .get("duration")
            .and_then(duration_field)
            .or(container_duration);
        if track.duration_seconds.is_none() && stream.get("duration").is_some() {
            warnings.push(format!("invalid duration for {context}"));
        }

        if track_type == TrackKind::Audio {
            track.channels = int_field(stream, "channels", &context, &mut warnings);
            track.channel_layout = track.channels.map(channel_layout_label);
        }

        if track_type == TrackKind::Video {
            track.width = int_field(stream, "width", &context, &mut warnings);
            track.height = int_field(stream, "height", &context, &mut warnings);
            // Prefer the real frame rate; fall back to the average; "0/0"
            // means the tool could not determine one.
            let frame_rate = string_field(stream, "r_frame_rate")
                .or_else(|| string_field(stream, "avg_frame_rate"))
                .filter(|r| r != "0/0");
            track.frame_rate = frame_rate;
            track.color_transfer = string_field(stream, "color_transfer");
            track.color_primaries = string_field(stream, "color_primaries");
            track.color_space = string_field(stream, "color_space");
            track.color_range = string_field(stream, "color_range");
        }

        tracks.push(track);
    }

    if tracks.is_empty() {
        warnings.push("no streams found in file".to_string());
    }

    IntrospectionResult {
        file_path: path.to_path_buf(),
        container_format,
        container_duration,
        container_tags,
        tracks,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn sample_output() -> Value {
        json!({
            "format": {
                "format_name": "matroska,webm",
                "duration": "5400.512",
                "tags": {"Title": "Sample Movie", "ENCODER": "libebml"}
            },
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "24000/1001",
                    "color_transfer": "bt709",
                    "disposition": {"default": 1, "forced": 0},
                    "tags": {}
                },
                {
                    "index": 1,
                    "codec_type": "audio",
                    "codec_name": "ac3",
                    "channels": 6,
                    "duration": "5400.000",
                    "disposition": {"default": 1, "forced": 0},
                    "tags": {"language": "fra", "title": "French 5.1"}
                },
                {
                    "index": 2,
                    "codec_type": "subtitle",
                    "codec_name": "subrip",
                    "disposition": {"default": 0, "forced": 1},
                    "tags": {"language": "en"}
                }
            ]
        })
    }

    #[test]
    fn parses_streams_with_normalized_language() {
        let result = parse_probe_output(&PathBuf::from("/x/sample.mkv"), &sample_output());
        assert_eq!(result.container_format.as_deref(), Some("matroska,webm"));
        assert_eq!(result.tracks.len(), 3);

        let audio = &result.tracks[1];
        assert_eq!(audio.track_type, TrackKind::Audio);
        // 639-2/T input is canonicalized to 639-2/B.
        assert_eq!(audio.language.as_deref(), Some("fre"));
        assert_eq!(audio.channels, Some(6));
        assert_eq!(audio.channel_layout.as_deref(), Some("5.1"));

        let sub = &result.tracks[2];
        assert!(sub.is_forced);
        assert_eq!(sub.language.as_deref(), Some("eng"));
    }

    #[test]
    fn container_tags_are_case_folded() {
        let result = parse_probe_output(&PathBuf::from("/x/sample.mkv"), &sample_output());
        assert_eq!(
            result.container_tags.get("title").map(String::as_str),
            Some("Sample Movie")
        );
        assert!(result.container_tags.contains_key("encoder"));
    }

    #[test]
    fn stream_without_duration_inherits_container_duration() {
        let result = parse_probe_output(&PathBuf::from("/x/sample.mkv"), &sample_output());
        let video = &result.tracks[0];
        assert_eq!(video.duration_seconds, Some(5400.512));
        let audio = &result.tracks[1];
        assert_eq!(audio.duration_seconds, Some(5400.0));
    }

    #[test]
    fn duplicate_indices_are_skipped_with_warning() {
        let data = json!({
            "format": {},
            "streams": [
                {"index": 0, "codec_type": "video"},
                {"index": 0, "codec_type": "audio"}
            ]
        });
        let result = parse_probe_output(&PathBuf::from("/x/dup.mkv"), &data);
        assert_eq!(result.tracks.len(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn invalid_numeric_fields_become_null_with_warning() {
        let data = json!({
            "format": {},
            "streams": [
                {"index": 0, "codec_type": "video", "width": -5, "height": 1080},
                {"index": 1, "codec_type": "audio", "channels": "six"}
            ]
        });
        let result = parse_probe_output(&PathBuf::from("/x/bad.mkv"), &data);
        assert_eq!(result.tracks[0].width, None);
        assert_eq!(result.tracks[0].height, Some(1080));
        assert_eq!(result.tracks[1].channels, None);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn zero_over_zero_frame_rate_is_rejected() {
        let data = json!({
            "format": {},
            "streams": [
                {"index": 0, "codec_type": "video", "r_frame_rate": "0/0", "avg_frame_rate": "0/0"}
            ]
        });
        let result = parse_probe_output(&PathBuf::from("/x/fr.mkv"), &data);
        assert_eq!(result.tracks[0].frame_rate, None);
    }

    #[test]
    fn oversized_tags_are_dropped() {
        let huge = "x".repeat(MAX_TAG_VALUE_LEN + 1);
        let data = json!({
            "format": {"tags": {"comment": huge}},
            "streams": []
        });
        let result = parse_probe_output(&PathBuf::from("/x/tags.mkv"), &data);
        assert!(result.container_tags.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("oversized")));
    }

    #[test]
    fn channel_layout_table() {
        assert_eq!(channel_layout_label(1), "mono");
        assert_eq!(channel_layout_label(2), "stereo");
        assert_eq!(channel_layout_label(6), "5.1");
        assert_eq!(channel_layout_label(8), "7.1");
        assert_eq!(channel_layout_label(3), "3ch");
    }
}
