//! Conditional rule predicates.
//!
//! [`Condition`] is an algebraic sum over leaf predicates plus the
//! `and` / `or` / `not` combinators. Evaluation returns the boolean result
//! together with a human-readable reason for the rule trace.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use vpo_model::{
    height_to_resolution_label, resolution_label_to_height, PluginMetadata, TrackKind,
    TrackRecord,
};

use crate::language::languages_match;
use vpo_model::codec_aliases;

/// Comparison operator for plugin metadata leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackExistsCondition {
    #[serde(rename = "type")]
    pub track_type: TrackKind,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub title_regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginMetadataCondition {
    pub plugin: String,
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default = "default_operator")]
    pub operator: MetadataOperator,
}

fn default_operator() -> MetadataOperator {
    MetadataOperator::Eq
}

/// A rule predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    TrackExists(TrackExistsCondition),
    Container(Vec<String>),
    Resolution(Vec<String>),
    ResolutionUnder(String),
    FileSizeUnder(String),
    FileSizeOver(String),
    DurationUnder(String),
    DurationOver(String),
    CodecMatches(Vec<String>),
    SubtitleLanguageExists(String),
    AudioCodecExists(String),
    PluginMetadata(PluginMetadataCondition),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

/// Everything a condition can look at.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub tracks: &'a [TrackRecord],
    pub container_format: Option<&'a str>,
    pub file_size_bytes: Option<i64>,
    pub duration_seconds: Option<f64>,
    pub plugin_metadata: Option<&'a PluginMetadata>,
    pub container_tags: Option<&'a BTreeMap<String, String>>,
}

/// Parses a human file size (`5GB`, `500MB`, `1.5TB`) into bytes.
pub fn parse_file_size(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    let upper = trimmed.to_uppercase();
    let (number, multiplier) = if let Some(head) = upper.strip_suffix("TB") {
        (head, 1024f64.powi(4))
    } else if let Some(head) = upper.strip_suffix("GB") {
        (head, 1024f64.powi(3))
    } else if let Some(head) = upper.strip_suffix("MB") {
        (head, 1024f64.powi(2))
    } else if let Some(head) = upper.strip_suffix("KB") {
        (head, 1024f64)
    } else if let Some(head) = upper.strip_suffix('B') {
        (head, 1f64)
    } else {
        return None;
    };
    let parsed: f64 = number.trim().parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some((parsed * multiplier) as i64)
}

/// Parses a human duration (`90s`, `30m`, `2h`, `1h30m`) into seconds.
pub fn parse_duration(value: &str) -> Option<f64> {
    let trimmed = value.trim().to_lowercase();
    let simple = Regex::new(r"^(\d+(?:\.\d+)?)\s*(s|m|h)$").unwrap();
    if let Some(caps) = simple.captures(&trimmed) {
        let number: f64 = caps[1].parse().ok()?;
        let multiplier = match &caps[2] {
            "s" => 1.0,
            "m" => 60.0,
            _ => 3600.0,
        };
        return Some(number * multiplier);
    }
    let compound = Regex::new(r"^(\d+)h(?:(\d+)m)?$").unwrap();
    if let Some(caps) = compound.captures(&trimmed) {
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(0.0))
            .unwrap_or(0.0);
        return Some(hours * 3600.0 + minutes * 60.0);
    }
    None
}

fn video_height(tracks: &[TrackRecord]) -> Option<i64> {
    tracks
        .iter()
        .find(|t| t.track_type == TrackKind::Video)
        .and_then(|t| t.height)
}

fn video_codec(tracks: &[TrackRecord]) -> Option<&str> {
    tracks
        .iter()
        .find(|t| t.track_type == TrackKind::Video)
        .and_then(|t| t.codec.as_deref())
}

fn compare_values(
    actual: &serde_json::Value,
    expected: &serde_json::Value,
    operator: MetadataOperator,
) -> bool {
    use MetadataOperator::*;
    match operator {
        Eq => actual == expected,
        Ne => actual != expected,
        Contains => match (actual, expected) {
            (serde_json::Value::String(a), serde_json::Value::String(e)) => a.contains(e),
            (serde_json::Value::Array(a), e) => a.contains(e),
            _ => false,
        },
        Lt | Lte | Gt | Gte => {
            let (Some(a), Some(e)) = (actual.as_f64(), expected.as_f64()) else {
                return false;
            };
            match operator {
                Lt => a < e,
                Lte => a <= e,
                Gt => a > e,
                Gte => a >= e,
                _ => unreachable!(),
            }
        }
    }
}

/// Evaluates a condition, returning the result and a reason string for the
/// rule trace.
pub fn evaluate_condition(condition: &Condition, ctx: &ConditionContext<'_>) -> (bool, String) {
    match condition {
        Condition::TrackExists(spec) => {
            let title_regex = spec
                .title_regex
                .as_deref()
                .and_then(|pattern| Regex::new(pattern).ok());
            let found = ctx.tracks.iter().any(|track| {
                if track.track_type != spec.track_type {
                    return false;
                }
                if let Some(language) = &spec.language
                    && !languages_match(track.language.as_deref(), Some(language))
                {
                    return false;
                }
                if let Some(codec) = &spec.codec
                    && !track
                        .codec
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase() == codec.to_lowercase())
                {
                    return false;
                }
                if let Some(regex) = &title_regex
                    && !track.title.as_deref().is_some_and(|t| regex.is_match(t))
                {
                    return false;
                }
                true
            });
            let reason = format!(
                "track_exists({}{}) = {found}",
                spec.track_type,
                spec.language
                    .as_deref()
                    .map(|l| format!(", lang={l}"))
                    .unwrap_or_default()
            );
            (found, reason)
        }
        Condition::Container(formats) => {
            let actual = ctx.container_format.unwrap_or("").to_lowercase();
            let matched = formats.iter().any(|f| f.to_lowercase() == actual);
            (matched, format!("container '{actual}' in {formats:?} = {matched}"))
        }
        Condition::Resolution(labels) => {
            let Some(height) = video_height(ctx.tracks) else {
                return (false, "resolution: no video track".to_string());
            };
            let actual = height_to_resolution_label(height);
            let matched = labels.iter().any(|l| {
                resolution_label_to_height(l) == resolution_label_to_height(actual)
            });
            (matched, format!("resolution {actual} in {labels:?} = {matched}"))
        }
        Condition::ResolutionUnder(label) => {
            let Some(height) = video_height(ctx.tracks) else {
                return (false, "resolution_under: no video track".to_string());
            };
            let Some(threshold) = resolution_label_to_height(label) else {
                return (false, format!("resolution_under: unknown label '{label}'"));
            };
            let matched = height < threshold;
            (
                matched,
                format!("height {height} under {label} = {matched}"),
            )
        }
        Condition::FileSizeUnder(limit) => {
            let (Some(threshold), Some(size)) = (parse_file_size(limit), ctx.file_size_bytes)
            else {
                return (false, format!("file_size_under {limit}: unavailable"));
            };
            let matched = size < threshold;
            (matched, format!("size {size} under {limit} = {matched}"))
        }
        Condition::FileSizeOver(limit) => {
            let (Some(threshold), Some(size)) = (parse_file_size(limit), ctx.file_size_bytes)
            else {
                return (false, format!("file_size_over {limit}: unavailable"));
            };
            let matched = size > threshold;
            (matched, format!("size {size} over {limit} = {matched}"))
        }
        Condition::DurationUnder(limit) => {
            let (Some(threshold), Some(duration)) =
                (parse_duration(limit), ctx.duration_seconds)
            else {
                return (false, format!("duration_under {limit}: unavailable"));
            };
            let matched = duration < threshold;
            (
                matched,
                format!("duration {duration:.1}s under {limit} = {matched}"),
            )
        }
        Condition::DurationOver(limit) => {
            let (Some(threshold), Some(duration)) =
                (parse_duration(limit), ctx.duration_seconds)
            else {
                return (false, format!("duration_over {limit}: unavailable"));
            };
            let matched = duration > threshold;
            (
                matched,
                format!("duration {duration:.1}s over {limit} = {matched}"),
            )
        }
        Condition::CodecMatches(codecs) => {
            let Some(actual) = video_codec(ctx.tracks) else {
                return (false, "codec_matches: no video track".to_string());
            };
            let aliases = codec_aliases(actual);
            let matched = codecs.iter().any(|c| aliases.contains(&c.to_lowercase()));
            (
                matched,
                format!("codec '{actual}' matches {codecs:?} = {matched}"),
            )
        }
        Condition::SubtitleLanguageExists(language) => {
            let matched = ctx.tracks.iter().any(|t| {
                t.track_type == TrackKind::Subtitle
                    && languages_match(t.language.as_deref(), Some(language))
            });
            (
                matched,
                format!("subtitle_language_exists {language} = {matched}"),
            )
        }
        Condition::AudioCodecExists(codec) => {
            let target = codec.to_lowercase();
            let matched = ctx.tracks.iter().any(|t| {
                t.track_type == TrackKind::Audio
                    && t.codec.as_deref().is_some_and(|c| c.to_lowercase() == target)
            });
            (matched, format!("audio_codec_exists {codec} = {matched}"))
        }
        Condition::PluginMetadata(spec) => {
            let actual = ctx
                .plugin_metadata
                .and_then(|meta| meta.get(&spec.plugin))
                .and_then(|blob| blob.get(&spec.field));
            let matched = actual
                .map(|a| compare_values(a, &spec.value, spec.operator))
                .unwrap_or(false);
            (
                matched,
                format!(
                    "plugin_metadata {}.{} {:?} {} = {matched}",
                    spec.plugin, spec.field, spec.operator, spec.value
                ),
            )
        }
        Condition::And(children) => {
            let mut reasons = Vec::with_capacity(children.len());
            let mut all = true;
            for child in children {
                let (result, reason) = evaluate_condition(child, ctx);
                reasons.push(reason);
                if !result {
                    all = false;
                    break;
                }
            }
            (all, format!("and[{}]", reasons.join("; ")))
        }
        Condition::Or(children) => {
            let mut reasons = Vec::with_capacity(children.len());
            let mut any = false;
            for child in children {
                let (result, reason) = evaluate_condition(child, ctx);
                reasons.push(reason);
                if result {
                    any = true;
                    break;
                }
            }
            (any, format!("or[{}]", reasons.join("; ")))
        }
        Condition::Not(child) => {
            let (result, reason) = evaluate_condition(child, ctx);
            (!result, format!("not({reason})"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(index: i64, kind: TrackKind) -> TrackRecord {
        TrackRecord {
            id: index + 1,
            file_id: 1,
            track_index: index,
            track_type: kind,
            codec: None,
            language: None,
            title: None,
            is_default: false,
            is_forced: false,
            channels: None,
            channel_layout: None,
            width: None,
            height: None,
            frame_rate: None,
            color_transfer: None,
            color_primaries: None,
            color_space: None,
            color_range: None,
            duration_seconds: None,
        }
    }

    fn sample_tracks() -> Vec<TrackRecord> {
        let mut video = track(0, TrackKind::Video);
        video.codec = Some("hevc".to_string());
        video.height = Some(1080);
        let mut audio = track(1, TrackKind::Audio);
        audio.codec = Some("ac3".to_string());
        audio.language = Some("fre".to_string());
        let mut sub = track(2, TrackKind::Subtitle);
        sub.language = Some("eng".to_string());
        vec![video, audio, sub]
    }

    fn ctx(tracks: &[TrackRecord]) -> ConditionContext<'_> {
        ConditionContext {
            tracks,
            container_format: Some("matroska"),
            file_size_bytes: Some(4 * 1024 * 1024 * 1024),
            duration_seconds: Some(5400.0),
            plugin_metadata: None,
            container_tags: None,
        }
    }

    #[test]
    fn track_exists_with_cross_standard_language() {
        let tracks = sample_tracks();
        let condition = Condition::TrackExists(TrackExistsCondition {
            track_type: TrackKind::Audio,
            language: Some("fra".to_string()),
            codec: None,
            title_regex: None,
        });
        let (matched, _) = evaluate_condition(&condition, &ctx(&tracks));
        assert!(matched);
    }

    #[test]
    fn codec_matches_uses_alias_sets() {
        let tracks = sample_tracks();
        let condition = Condition::CodecMatches(vec!["h265".to_string()]);
        let (matched, _) = evaluate_condition(&condition, &ctx(&tracks));
        assert!(matched);
    }

    #[test]
    fn combinators() {
        let tracks = sample_tracks();
        let c = ctx(&tracks);
        let both = Condition::And(vec![
            Condition::Container(vec!["matroska".to_string()]),
            Condition::Resolution(vec!["1080p".to_string()]),
        ]);
        assert!(evaluate_condition(&both, &c).0);

        let either = Condition::Or(vec![
            Condition::Container(vec!["mp4".to_string()]),
            Condition::Resolution(vec!["1080p".to_string()]),
        ]);
        assert!(evaluate_condition(&either, &c).0);

        let negated = Condition::Not(Box::new(Condition::Container(vec!["mp4".to_string()])));
        assert!(evaluate_condition(&negated, &c).0);
    }

    #[test]
    fn size_and_duration_bounds() {
        let tracks = sample_tracks();
        let c = ctx(&tracks);
        assert!(evaluate_condition(&Condition::FileSizeUnder("5GB".into()), &c).0);
        assert!(!evaluate_condition(&Condition::FileSizeUnder("1GB".into()), &c).0);
        assert!(evaluate_condition(&Condition::FileSizeOver("1GB".into()), &c).0);
        assert!(evaluate_condition(&Condition::DurationUnder("2h".into()), &c).0);
        assert!(evaluate_condition(&Condition::DurationOver("1h".into()), &c).0);
        assert!(!evaluate_condition(&Condition::DurationOver("2h".into()), &c).0);
    }

    #[test]
    fn plugin_metadata_operators() {
        let tracks = sample_tracks();
        let mut meta = PluginMetadata::new();
        meta.insert(
            "radarr".to_string(),
            serde_json::json!({"quality": "bluray", "score": 85}),
        );
        let mut c = ctx(&tracks);
        c.plugin_metadata = Some(&meta);

        let eq = Condition::PluginMetadata(PluginMetadataCondition {
            plugin: "radarr".to_string(),
            field: "quality".to_string(),
            value: serde_json::json!("bluray"),
            operator: MetadataOperator::Eq,
        });
        assert!(evaluate_condition(&eq, &c).0);

        let gte = Condition::PluginMetadata(PluginMetadataCondition {
            plugin: "radarr".to_string(),
            field: "score".to_string(),
            value: serde_json::json!(80),
            operator: MetadataOperator::Gte,
        });
        assert!(evaluate_condition(&gte, &c).0);

        let contains = Condition::PluginMetadata(PluginMetadataCondition {
            plugin: "radarr".to_string(),
            field: "quality".to_string(),
            value: serde_json::json!("blu"),
            operator: MetadataOperator::Contains,
        });
        assert!(evaluate_condition(&contains, &c).0);

        let missing = Condition::PluginMetadata(PluginMetadataCondition {
            plugin: "sonarr".to_string(),
            field: "quality".to_string(),
            value: serde_json::json!("bluray"),
            operator: MetadataOperator::Eq,
        });
        assert!(!evaluate_condition(&missing, &c).0);
    }

    #[test]
    fn human_size_and_duration_parsing() {
        assert_eq!(parse_file_size("5GB"), Some(5 * 1024_i64.pow(3)));
        assert_eq!(parse_file_size("500MB"), Some(500 * 1024_i64.pow(2)));
        assert_eq!(parse_file_size("10 KB"), Some(10 * 1024));
        assert_eq!(parse_file_size("nope"), None);

        assert_eq!(parse_duration("90s"), Some(90.0));
        assert_eq!(parse_duration("30m"), Some(1800.0));
        assert_eq!(parse_duration("2h"), Some(7200.0));
        assert_eq!(parse_duration("1h30m"), Some(5400.0));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn conditions_deserialize_from_yaml() {
        let yaml = r#"
and:
  - codec_matches: [hevc, h265]
  - not:
      container: [mp4]
  - track_exists:
      type: audio
      language: eng
"#;
        let condition: Condition = serde_yaml::from_str(yaml).unwrap();
        match condition {
            Condition::And(children) => assert_eq!(children.len(), 3),
            other => panic!("unexpected condition: {other:?}"),
        }
    }
}
