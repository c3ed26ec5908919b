//! Pure policy evaluation.
//!
//! [`evaluate`] maps `(tracks, policy, signals)` onto a typed [`Plan`]
//! with no side effects. Tie-breaking is deterministic throughout: the
//! same inputs always produce the same plan.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use vpo_model::{
    ContainerChange, LanguageAnalysisRecord, Plan, PlannedAction, PluginMetadata,
    TrackClassificationRecord, TrackDisposition, TrackKind, TrackRecord, TrackTranscodePlan,
    TranscriptionRecord,
};

use crate::language::{languages_match, normalize};
use crate::policy::matchers::{is_music_by_metadata, is_sfx_by_metadata, CommentaryMatcher};
use crate::policy::types::{PolicyConfig, PolicyDocument, TrackCategory};

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("file has no tracks to evaluate")]
    NoTracks,

    #[error("container '{container}' does not support {operation}; convert to MKV for full track manipulation")]
    UnsupportedContainer { container: String, operation: String },
}

/// External signals consulted during evaluation, keyed by track signal key
/// (catalog id when present, stream index otherwise).
#[derive(Debug, Clone, Default)]
pub struct EvaluationSignals<'a> {
    pub transcription_results: Option<&'a HashMap<i64, TranscriptionRecord>>,
    pub classification_results: Option<&'a HashMap<i64, TrackClassificationRecord>>,
    pub language_analysis: Option<&'a HashMap<i64, LanguageAnalysisRecord>>,
    pub plugin_metadata: Option<&'a PluginMetadata>,
    pub container_tags: Option<&'a BTreeMap<String, String>>,
    pub container_format: Option<&'a str>,
}

/// Index of a language in a preference list, via cross-standard matching;
/// `preferences.len()` when absent (sorts after every preferred language).
fn language_preference_index(language: Option<&str>, preferences: &[String]) -> usize {
    for (i, preferred) in preferences.iter().enumerate() {
        if languages_match(language, Some(preferred)) {
            return i;
        }
    }
    preferences.len()
}

/// Classifies a track for ordering and default-flag decisions.
///
/// Audio priority: metadata SFX, metadata music, metadata commentary,
/// transcription-based kind, then language preference (main vs alternate).
pub fn classify_track(
    track: &TrackRecord,
    config: &PolicyConfig,
    matcher: &CommentaryMatcher,
    transcription_results: Option<&HashMap<i64, TranscriptionRecord>>,
) -> TrackCategory {
    match track.track_type {
        TrackKind::Video => TrackCategory::Video,
        TrackKind::Audio => {
            if is_sfx_by_metadata(track.title.as_deref()) {
                return TrackCategory::AudioSfx;
            }
            if is_music_by_metadata(track.title.as_deref()) {
                return TrackCategory::AudioMusic;
            }
            if matcher.is_commentary(track.title.as_deref()) {
                return TrackCategory::AudioCommentary;
            }

            if let Some(results) = transcription_results
                && let Some(result) = results.get(&track.signal_key())
            {
                use vpo_model::AudioTrackKind::*;
                match result.track_type {
                    Sfx => return TrackCategory::AudioSfx,
                    Music => return TrackCategory::AudioMusic,
                    NonSpeech => return TrackCategory::AudioNonSpeech,
                    Commentary if config.detect_commentary_by_transcription() => {
                        return TrackCategory::AudioCommentary;
                    }
                    _ => {}
                }
            }

            for preferred in &config.audio_language_preference {
                if languages_match(track.language.as_deref(), Some(preferred)) {
                    return TrackCategory::AudioMain;
                }
            }
            TrackCategory::AudioAlternate
        }
        TrackKind::Subtitle => {
            if matcher.is_commentary(track.title.as_deref()) {
                return TrackCategory::SubtitleCommentary;
            }
            if track.is_forced {
                return TrackCategory::SubtitleForced;
            }
            TrackCategory::SubtitleMain
        }
        TrackKind::Attachment | TrackKind::Other => TrackCategory::Attachment,
    }
}

/// Desired track order: `(position in track_order, language preference
/// index, original index)`. Only main audio sorts by the audio preference
/// and main subtitles by the subtitle preference.
pub fn compute_desired_order(
    tracks: &[TrackRecord],
    config: &PolicyConfig,
    matcher: &CommentaryMatcher,
    transcription_results: Option<&HashMap<i64, TranscriptionRecord>>,
) -> Vec<i64> {
    if tracks.is_empty() {
        return Vec::new();
    }

    let order_map: HashMap<TrackCategory, usize> = config
        .track_order
        .iter()
        .enumerate()
        .map(|(i, category)| (*category, i))
        .collect();

    let mut sorted: Vec<&TrackRecord> = tracks.iter().collect();
    sorted.sort_by_key(|track| {
        let category = classify_track(track, config, matcher, transcription_results);
        let primary = order_map
            .get(&category)
            .copied()
            .unwrap_or(config.track_order.len());
        let secondary = match category {
            TrackCategory::AudioMain => language_preference_index(
                track.language.as_deref(),
                &config.audio_language_preference,
            ),
            TrackCategory::SubtitleMain => language_preference_index(
                track.language.as_deref(),
                &config.subtitle_language_preference,
            ),
            _ => 999,
        };
        (primary, secondary, track.track_index)
    });

    sorted.iter().map(|t| t.track_index).collect()
}

/// First non-commentary track matching the language preference, falling
/// back to the first non-commentary track, then the first track.
fn find_preferred_track<'a>(
    tracks: &[&'a TrackRecord],
    preferences: &[String],
    matcher: &CommentaryMatcher,
) -> Option<&'a TrackRecord> {
    let non_commentary: Vec<&TrackRecord> = tracks
        .iter()
        .copied()
        .filter(|t| !matcher.is_commentary(t.title.as_deref()))
        .collect();

    if non_commentary.is_empty() {
        return tracks.first().copied();
    }

    for preferred in preferences {
        for track in &non_commentary {
            if languages_match(track.language.as_deref(), Some(preferred)) {
                return Some(track);
            }
        }
    }
    non_commentary.first().copied()
}

fn audio_matches_preference(
    audio_tracks: &[&TrackRecord],
    preferences: &[String],
    matcher: &CommentaryMatcher,
) -> bool {
    let non_commentary: Vec<&&TrackRecord> = audio_tracks
        .iter()
        .filter(|t| !matcher.is_commentary(t.title.as_deref()))
        .collect();
    if non_commentary.is_empty() {
        return false;
    }
    non_commentary.iter().any(|track| {
        preferences
            .iter()
            .any(|p| languages_match(track.language.as_deref(), Some(p)))
    })
}

/// Desired default-flag state per track index. Only indices whose flag the
/// policy cares about appear in the map.
pub fn compute_default_flags(
    tracks: &[TrackRecord],
    config: &PolicyConfig,
    matcher: &CommentaryMatcher,
) -> BTreeMap<i64, bool> {
    let flags = &config.default_flags;
    let mut result = BTreeMap::new();

    let video: Vec<&TrackRecord> = tracks.iter().filter(|t| t.track_type == TrackKind::Video).collect();
    let audio: Vec<&TrackRecord> = tracks.iter().filter(|t| t.track_type == TrackKind::Audio).collect();
    let subtitles: Vec<&TrackRecord> =
        tracks.iter().filter(|t| t.track_type == TrackKind::Subtitle).collect();

    if flags.set_first_video_default && !video.is_empty() {
        result.insert(video[0].track_index, true);
        if flags.clear_other_defaults {
            for track in &video[1..] {
                result.insert(track.track_index, false);
            }
        }
    }

    if flags.set_preferred_audio_default && !audio.is_empty() {
        if let Some(preferred) =
            find_preferred_track(&audio, &config.audio_language_preference, matcher)
        {
            result.insert(preferred.track_index, true);
        }
        if flags.clear_other_defaults {
            for track in &audio {
                result.entry(track.track_index).or_insert(false);
            }
        }
    }

    if flags.set_preferred_subtitle_default && !subtitles.is_empty() {
        if let Some(preferred) =
            find_preferred_track(&subtitles, &config.subtitle_language_preference, matcher)
        {
            result.insert(preferred.track_index, true);
        }
        if flags.clear_other_defaults {
            for track in &subtitles {
                result.entry(track.track_index).or_insert(false);
            }
        }
    } else if flags.clear_other_defaults {
        for track in &subtitles {
            result.insert(track.track_index, false);
        }
    }

    // When no audio matches the preference, a preferred-language subtitle
    // can take the default instead.
    if flags.set_subtitle_default_when_audio_differs
        && !subtitles.is_empty()
        && !audio_matches_preference(&audio, &config.audio_language_preference, matcher)
        && !subtitles.iter().any(|t| result.get(&t.track_index) == Some(&true))
    {
        if let Some(preferred) =
            find_preferred_track(&subtitles, &config.subtitle_language_preference, matcher)
        {
            result.insert(preferred.track_index, true);
        }
        if flags.clear_other_defaults {
            for track in &subtitles {
                result.entry(track.track_index).or_insert(false);
            }
        }
    }

    result
}

/// Language updates from transcription results above the confidence
/// threshold. Tracks whose tag already matches the detected language
/// (cross-standard) are left alone.
pub fn compute_language_updates(
    tracks: &[TrackRecord],
    transcription_results: &HashMap<i64, TranscriptionRecord>,
    config: &PolicyConfig,
) -> BTreeMap<i64, String> {
    let mut result = BTreeMap::new();

    let Some(settings) = &config.transcription else {
        return result;
    };
    if !settings.enabled || !settings.update_language_from_transcription {
        return result;
    }

    for track in tracks {
        if track.track_type != TrackKind::Audio {
            continue;
        }
        let Some(detection) = transcription_results.get(&track.signal_key()) else {
            continue;
        };
        let Some(detected) = detection.detected_language.as_deref() else {
            continue;
        };
        if detection.confidence_score < settings.confidence_threshold {
            continue;
        }
        if languages_match(track.language.as_deref(), Some(detected)) {
            continue;
        }
        result.insert(track.track_index, normalize(Some(detected)));
    }
    result
}

/// Keep/remove decision for every track. Removal applies only to
/// unpreferred audio/subtitle tracks and never touches exempt tracks:
/// commentary, forced subtitles, or the only track of its type.
pub fn compute_dispositions(
    tracks: &[TrackRecord],
    config: &PolicyConfig,
    matcher: &CommentaryMatcher,
    transcription_results: Option<&HashMap<i64, TranscriptionRecord>>,
) -> Vec<TrackDisposition> {
    let filter = &config.track_filter;
    let audio_count = tracks.iter().filter(|t| t.track_type == TrackKind::Audio).count();
    let subtitle_count = tracks
        .iter()
        .filter(|t| t.track_type == TrackKind::Subtitle)
        .count();

    let mut dispositions = Vec::with_capacity(tracks.len());
    let mut audio_removed = 0usize;

    for track in tracks {
        let keep = TrackDisposition::Keep {
            track_index: track.track_index,
        };
        if !filter.is_enabled() {
            dispositions.push(keep);
            continue;
        }

        let category = classify_track(track, config, matcher, transcription_results);
        let removable = match track.track_type {
            TrackKind::Audio if filter.remove_unpreferred_audio => {
                category == TrackCategory::AudioAlternate
                    && audio_count > 1
                    // Removing every audio track is never allowed.
                    && audio_removed + 1 < audio_count
            }
            TrackKind::Subtitle if filter.remove_unpreferred_subtitles => {
                category == TrackCategory::SubtitleMain
                    && subtitle_count > 1
                    && !config.subtitle_language_preference.is_empty()
                    && language_preference_index(
                        track.language.as_deref(),
                        &config.subtitle_language_preference,
                    ) == config.subtitle_language_preference.len()
            }
            _ => false,
        };

        if removable {
            if track.track_type == TrackKind::Audio {
                audio_removed += 1;
            }
            dispositions.push(TrackDisposition::Remove {
                track_index: track.track_index,
                reason: format!(
                    "{} language '{}' not in preference list",
                    track.track_type,
                    track.language.as_deref().unwrap_or("und")
                ),
            });
        } else {
            dispositions.push(keep);
        }
    }
    dispositions
}

/// Codecs that cannot be carried as-is into a target container, with the
/// transcode target used for the sub-plan.
fn container_incompatibilities(target_format: &str) -> &'static [(&'static str, &'static str)] {
    match target_format {
        "mp4" | "m4v" | "mov" => &[("subrip", "mov_text"), ("ass", "mov_text"), ("pcm_s24le", "aac")],
        _ => &[],
    }
}

/// Evaluates a policy against a file's tracks, producing a plan of typed
/// actions. Pure and deterministic.
pub fn evaluate(
    tracks: &[TrackRecord],
    policy: &PolicyDocument,
    signals: &EvaluationSignals<'_>,
) -> Result<Plan, EvaluationError> {
    if tracks.is_empty() {
        return Err(EvaluationError::NoTracks);
    }

    let config = &policy.config;
    let matcher = CommentaryMatcher::new(&config.commentary_patterns);
    let mut plan = Plan::empty(policy.schema_version);

    // Tracks in container order for current-state comparisons.
    let mut current: Vec<&TrackRecord> = tracks.iter().collect();
    current.sort_by_key(|t| t.track_index);

    // Language updates. Ordering decisions below still use the stored
    // language; the new tags land when the plan executes.
    if let Some(results) = signals.transcription_results {
        for (track_index, language) in compute_language_updates(tracks, results, config) {
            plan.actions.push(PlannedAction::SetLanguage {
                track_index,
                language,
            });
        }
    }

    // Default flags, diffed against current state.
    for (track_index, desired) in compute_default_flags(tracks, config, &matcher) {
        let Some(track) = tracks.iter().find(|t| t.track_index == track_index) else {
            continue;
        };
        if track.is_default != desired {
            plan.actions.push(PlannedAction::SetDefault {
                track_index,
                value: desired,
            });
        }
    }

    // Track dispositions.
    plan.track_dispositions =
        compute_dispositions(tracks, config, &matcher, signals.transcription_results);
    let removed: Vec<i64> = plan
        .removals()
        .map(TrackDisposition::track_index)
        .collect();
    for track_index in &removed {
        plan.actions.push(PlannedAction::RemoveTrack {
            track_index: *track_index,
        });
    }

    // Desired order over surviving tracks.
    let surviving: Vec<TrackRecord> = current
        .iter()
        .filter(|t| !removed.contains(&t.track_index))
        .map(|t| (*t).clone())
        .collect();
    let desired_order =
        compute_desired_order(&surviving, config, &matcher, signals.transcription_results);
    let current_order: Vec<i64> = surviving.iter().map(|t| t.track_index).collect();
    if desired_order != current_order {
        plan.actions.push(PlannedAction::Reorder {
            order: desired_order,
        });
    }

    // Container conversion.
    if let Some(container) = &config.container {
        let source = signals.container_format.unwrap_or("").to_lowercase();
        let target = container.target_format.to_lowercase();
        // "matroska,webm" style multi-names count as a match on any member.
        let already_target = source.split(',').any(|part| {
            let part = part.trim();
            part == target || (target == "mkv" && part == "matroska")
        });
        if !already_target && !source.is_empty() {
            let incompatible = container_incompatibilities(&target);
            let track_plans: Vec<TrackTranscodePlan> = surviving
                .iter()
                .filter_map(|track| {
                    let codec = track.codec.as_deref()?.to_lowercase();
                    incompatible
                        .iter()
                        .find(|(from, _)| *from == codec)
                        .map(|(_, to)| TrackTranscodePlan {
                            track_index: track.track_index,
                            target_codec: (*to).to_string(),
                            reason: format!("codec '{codec}' not representable in {target}"),
                        })
                })
                .collect();
            let change = ContainerChange {
                source_format: source,
                target_format: target.clone(),
                track_plans,
            };
            plan.container_change = Some(change.clone());
            plan.actions.push(PlannedAction::Remux {
                target_container: target,
                container_change: Some(change),
            });
        }
    }

    plan.requires_remux = plan.has_structural_change();
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{
        DefaultFlagsConfig, PhaseDefinition, PhaseName, TrackFilterConfig, WorkflowConfig,
    };
    use chrono::Utc;
    use vpo_model::AudioTrackKind;

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

    fn audio(index: i64, language: &str, title: Option<&str>) -> TrackRecord {
        let mut t = track(index, TrackKind::Audio);
        t.language = Some(language.to_string());
        t.title = title.map(String::from);
        t
    }

    fn policy_with(config: PolicyConfig) -> PolicyDocument {
        PolicyDocument {
            schema_version: 13,
            config,
            phases: vec![PhaseDefinition {
                name: PhaseName::Apply,
                skip_when: Vec::new(),
                rules: None,
                on_error: None,
                transcode: None,
                synthesize: Vec::new(),
                move_config: None,
                file_timestamp: None,
            }],
            workflow: WorkflowConfig {
                phases: vec![PhaseName::Apply],
                on_error: Default::default(),
            },
        }
    }

    fn base_config() -> PolicyConfig {
        PolicyConfig {
            audio_language_preference: vec!["eng".into(), "fre".into()],
            subtitle_language_preference: vec!["eng".into()],
            track_order: vec![
                TrackCategory::Video,
                TrackCategory::AudioMain,
                TrackCategory::AudioAlternate,
                TrackCategory::AudioCommentary,
                TrackCategory::SubtitleMain,
            ],
            default_flags: DefaultFlagsConfig {
                set_first_video_default: false,
                set_preferred_audio_default: true,
                set_preferred_subtitle_default: false,
                set_subtitle_default_when_audio_differs: false,
                clear_other_defaults: true,
            },
            ..PolicyConfig::default()
        }
    }

    /// Preferred-language audio moves ahead of other audio and takes the
    /// default flag.
    #[test]
    fn reorders_by_language_preference_and_sets_default() {
        let mut video = track(0, TrackKind::Video);
        video.codec = Some("h264".into());
        let mut fre = audio(1, "fre", None);
        fre.is_default = true;
        fre.codec = Some("ac3".into());
        let mut eng = audio(2, "eng", None);
        eng.codec = Some("aac".into());
        let mut sub = track(3, TrackKind::Subtitle);
        sub.language = Some("eng".into());
        let tracks = vec![video, fre, eng, sub];

        let policy = policy_with(base_config());
        let plan = evaluate(&tracks, &policy, &EvaluationSignals::default()).unwrap();

        let reorder = plan
            .actions
            .iter()
            .find_map(|a| match a {
                PlannedAction::Reorder { order } => Some(order.clone()),
                _ => None,
            })
            .expect("expected a reorder action");
        assert_eq!(reorder, vec![0, 2, 1, 3]);

        let defaults: Vec<(i64, bool)> = plan
            .actions
            .iter()
            .filter_map(|a| match a {
                PlannedAction::SetDefault { track_index, value } => Some((*track_index, *value)),
                _ => None,
            })
            .collect();
        assert!(defaults.contains(&(2, true)));
        assert!(defaults.contains(&(1, false)));
        assert!(plan.requires_remux);
    }

    /// Commentary detected from the title sorts after main audio and never
    /// keeps the default flag.
    #[test]
    fn commentary_sorts_after_main_and_loses_default() {
        let video = track(0, TrackKind::Video);
        let commentary = audio(1, "eng", Some("Director's Commentary"));
        let main = audio(2, "eng", Some("Main"));
        let tracks = vec![video, commentary, main];

        let mut config = base_config();
        config.track_order = vec![
            TrackCategory::Video,
            TrackCategory::AudioMain,
            TrackCategory::AudioCommentary,
        ];
        let policy = policy_with(config);
        let plan = evaluate(&tracks, &policy, &EvaluationSignals::default()).unwrap();

        let reorder = plan
            .actions
            .iter()
            .find_map(|a| match a {
                PlannedAction::Reorder { order } => Some(order.clone()),
                _ => None,
            })
            .expect("expected a reorder action");
        assert_eq!(reorder, vec![0, 2, 1]);

        assert!(plan.actions.iter().any(|a| matches!(
            a,
            PlannedAction::SetDefault { track_index: 2, value: true }
        )));
    }

    #[test]
    fn stable_order_when_everything_already_preferred() {
        let video = track(0, TrackKind::Video);
        let a = audio(1, "eng", None);
        let b = audio(2, "eng", None);
        let tracks = vec![video, a, b];
        let mut config = base_config();
        config.default_flags.set_preferred_audio_default = false;
        config.default_flags.clear_other_defaults = false;
        let policy = policy_with(config);
        let plan = evaluate(&tracks, &policy, &EvaluationSignals::default()).unwrap();
        assert!(
            plan.is_empty(),
            "expected empty plan, got {:?}",
            plan.actions
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let tracks = vec![
            track(0, TrackKind::Video),
            audio(1, "ger", None),
            audio(2, "eng", None),
        ];
        let policy = policy_with(base_config());
        let a = evaluate(&tracks, &policy, &EvaluationSignals::default()).unwrap();
        let b = evaluate(&tracks, &policy, &EvaluationSignals::default()).unwrap();
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.track_dispositions, b.track_dispositions);
    }

    #[test]
    fn empty_track_list_is_an_error() {
        let policy = policy_with(base_config());
        assert!(matches!(
            evaluate(&[], &policy, &EvaluationSignals::default()),
            Err(EvaluationError::NoTracks)
        ));
    }

    #[test]
    fn language_update_respects_threshold_and_cross_standard_match() {
        let tracks = vec![audio(0, "und", None), audio(1, "ger", None)];
        let mut config = base_config();
        config.transcription = Some(crate::policy::types::TranscriptionSettings {
            enabled: true,
            update_language_from_transcription: true,
            confidence_threshold: 0.8,
            ..Default::default()
        });

        let mut results = HashMap::new();
        results.insert(
            1, // signal key of track 0 (id = index + 1)
            TranscriptionRecord {
                id: 1,
                track_id: 1,
                file_hash: "h".into(),
                detected_language: Some("en".into()),
                confidence_score: 0.9,
                track_type: AudioTrackKind::Main,
                plugin_name: "whisper".into(),
                transcript_sample: None,
                segments: Vec::new(),
                created_at: Utc::now(),
            },
        );
        // Below threshold: ignored.
        results.insert(
            2,
            TranscriptionRecord {
                id: 2,
                track_id: 2,
                file_hash: "h".into(),
                detected_language: Some("fre".into()),
                confidence_score: 0.5,
                track_type: AudioTrackKind::Main,
                plugin_name: "whisper".into(),
                transcript_sample: None,
                segments: Vec::new(),
                created_at: Utc::now(),
            },
        );

        let updates = compute_language_updates(&tracks, &results, &config);
        assert_eq!(updates.get(&0).map(String::as_str), Some("eng"));
        assert!(!updates.contains_key(&1));

        // Detected matching current tag (cross-standard) produces no update.
        let mut matching = HashMap::new();
        matching.insert(
            2,
            TranscriptionRecord {
                id: 3,
                track_id: 2,
                file_hash: "h".into(),
                detected_language: Some("de".into()),
                confidence_score: 0.95,
                track_type: AudioTrackKind::Main,
                plugin_name: "whisper".into(),
                transcript_sample: None,
                segments: Vec::new(),
                created_at: Utc::now(),
            },
        );
        let updates = compute_language_updates(&tracks, &matching, &config);
        assert!(updates.is_empty());
    }

    #[test]
    fn track_filter_removes_unpreferred_but_never_last_audio() {
        let video = track(0, TrackKind::Video);
        let eng = audio(1, "eng", None);
        let ger = audio(2, "ger", None);
        let tracks = vec![video, eng, ger];

        let mut config = base_config();
        config.track_filter = TrackFilterConfig {
            remove_unpreferred_audio: true,
            remove_unpreferred_subtitles: false,
        };
        let policy = policy_with(config);
        let plan = evaluate(&tracks, &policy, &EvaluationSignals::default()).unwrap();
        let removed: Vec<i64> = plan.removals().map(TrackDisposition::track_index).collect();
        assert_eq!(removed, vec![2]);

        // A lone unpreferred audio track is exempt.
        let tracks = vec![track(0, TrackKind::Video), audio(1, "ger", None)];
        let mut config = base_config();
        config.track_filter = TrackFilterConfig {
            remove_unpreferred_audio: true,
            remove_unpreferred_subtitles: false,
        };
        let policy = policy_with(config);
        let plan = evaluate(&tracks, &policy, &EvaluationSignals::default()).unwrap();
        assert_eq!(plan.removals().count(), 0);
    }

    #[test]
    fn commentary_audio_is_exempt_from_filtering() {
        let tracks = vec![
            audio(0, "eng", None),
            audio(1, "ger", Some("Director's Commentary")),
        ];
        let mut config = base_config();
        config.track_filter = TrackFilterConfig {
            remove_unpreferred_audio: true,
            remove_unpreferred_subtitles: false,
        };
        let matcher = CommentaryMatcher::new(&config.commentary_patterns);
        let dispositions = compute_dispositions(&tracks, &config, &matcher, None);
        assert!(dispositions.iter().all(|d| !d.is_remove()));
    }

    #[test]
    fn container_change_produces_remux_with_subplans() {
        let mut video = track(0, TrackKind::Video);
        video.codec = Some("h264".into());
        let mut sub = track(1, TrackKind::Subtitle);
        sub.codec = Some("subrip".into());
        sub.language = Some("eng".into());
        let tracks = vec![video, sub];

        let mut config = base_config();
        config.default_flags = DefaultFlagsConfig {
            set_first_video_default: false,
            set_preferred_audio_default: false,
            set_preferred_subtitle_default: false,
            set_subtitle_default_when_audio_differs: false,
            clear_other_defaults: false,
        };
        config.track_order = vec![TrackCategory::Video, TrackCategory::SubtitleMain];
        config.container = Some(crate::policy::types::ContainerPolicy {
            target_format: "mp4".into(),
        });
        let policy = policy_with(config);
        let signals = EvaluationSignals {
            container_format: Some("matroska,webm"),
            ..Default::default()
        };
        let plan = evaluate(&tracks, &policy, &signals).unwrap();

        let change = plan.container_change.expect("expected container change");
        assert_eq!(change.target_format, "mp4");
        assert_eq!(change.track_plans.len(), 1);
        assert_eq!(change.track_plans[0].target_codec, "mov_text");
        assert!(plan.requires_remux);
    }

    #[test]
    fn mkv_target_matches_matroska_source() {
        let mut video = track(0, TrackKind::Video);
        video.codec = Some("h264".into());
        let tracks = vec![video];
        let mut config = base_config();
        config.default_flags.set_preferred_audio_default = false;
        config.default_flags.clear_other_defaults = false;
        config.container = Some(crate::policy::types::ContainerPolicy {
            target_format: "mkv".into(),
        });
        let policy = policy_with(config);
        let signals = EvaluationSignals {
            container_format: Some("matroska,webm"),
            ..Default::default()
        };
        let plan = evaluate(&tracks, &policy, &signals).unwrap();
        assert!(plan.container_change.is_none());
    }
}
