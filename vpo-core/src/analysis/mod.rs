//! Language analysis and audio track classification.
//!
//! The analyze phase runs every audio track of a file through multi-sample
//! language detection, persisting results keyed by `(track_id, file_hash)`
//! so unchanged files hit the cache on the next run. Short tracks and
//! tracks without enough speech are skipped, not failed.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use vpo_model::{
    DetectionMethod, LanguageAnalysisRecord, LanguageClassification, TrackKind, TrackRecord,
    TranscriptSegment,
};

use crate::catalog::Catalog;
use crate::error::{Result, TranscriptionError};
use crate::language::languages_match;
use crate::policy::matchers::{is_music_by_metadata, is_sfx_by_metadata, CommentaryMatcher};
use crate::policy::types::PolicyConfig;
use crate::transcription::{
    smart_detect, AudioSampleExtractor, MultiSampleConfig, TranscriptionPlugin,
};

/// Tracks shorter than this are skipped outright; a 30-second sample of a
/// 5-second jingle tells us nothing.
pub const MIN_TRACK_DURATION_SECONDS: f64 = 10.0;

/// Duration assumed for tracks the probe could not measure.
const FALLBACK_TRACK_DURATION: f64 = 3600.0;

/// Counters for one file's analysis pass.
#[derive(Debug, Clone, Default)]
pub struct BatchAnalysisResult {
    pub analyzed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Keyed by track id.
    pub results: HashMap<i64, LanguageAnalysisRecord>,
    pub transcriber_available: bool,
}

/// Outcome of analyzing a single track, before persistence.
#[derive(Debug, Clone)]
pub struct TrackAnalysis {
    pub classification: LanguageClassification,
    pub primary_language: Option<String>,
    pub primary_percentage: f64,
    pub segments: Vec<TranscriptSegment>,
    pub confidence: f64,
}

/// Runs multi-sample detection on one audio track.
///
/// `ShortTrack` and `InsufficientSpeech` are the two non-fatal skip
/// conditions; callers count them as skipped rather than failed.
pub async fn analyze_track_languages(
    file_path: &Path,
    track_index: i64,
    track_duration: f64,
    extractor: &dyn AudioSampleExtractor,
    plugin: &dyn TranscriptionPlugin,
    config: &MultiSampleConfig,
    incumbent_language: Option<&str>,
) -> std::result::Result<TrackAnalysis, TranscriptionError> {
    if track_duration < MIN_TRACK_DURATION_SECONDS {
        return Err(TranscriptionError::ShortTrack {
            duration_seconds: track_duration,
        });
    }

    let aggregated = smart_detect(
        file_path,
        track_index,
        track_duration,
        extractor,
        plugin,
        config,
        incumbent_language,
    )
    .await?;

    let Some(language) = aggregated.language else {
        return Err(TranscriptionError::InsufficientSpeech);
    };

    // Distinct languages across valid samples decide single vs multi.
    let mut languages: Vec<String> = aggregated
        .sample_results
        .iter()
        .filter_map(|s| {
            s.language
                .as_deref()
                .map(|l| crate::language::normalize(Some(l)))
        })
        .collect();
    languages.sort();
    languages.dedup();
    let classification = if languages.len() > 1 {
        LanguageClassification::MultiLanguage
    } else {
        LanguageClassification::SingleLanguage
    };

    let winning = aggregated
        .sample_results
        .iter()
        .filter(|s| languages_match(s.language.as_deref(), Some(&language)))
        .count();
    let valid = aggregated
        .sample_results
        .iter()
        .filter(|s| s.language.is_some())
        .count()
        .max(1);
    let primary_percentage = (winning as f64 / valid as f64) * 100.0;

    let segments = aggregated
        .sample_results
        .iter()
        .map(|s| TranscriptSegment {
            start_s: s.position,
            end_s: s.position + f64::from(config.sample_duration),
            language: s.language.clone(),
            confidence: s.confidence,
            text: s.transcript_sample.clone(),
        })
        .collect();

    Ok(TrackAnalysis {
        classification,
        primary_language: Some(language),
        primary_percentage,
        segments,
        confidence: aggregated.confidence,
    })
}

/// Analyzes every audio track of a file, consulting the cache first.
pub async fn analyze_file_tracks(
    catalog: &Catalog,
    file_path: &Path,
    file_hash: &str,
    tracks: &[TrackRecord],
    extractor: &dyn AudioSampleExtractor,
    plugin: Option<&dyn TranscriptionPlugin>,
    config: &MultiSampleConfig,
    force: bool,
) -> Result<BatchAnalysisResult> {
    let mut result = BatchAnalysisResult {
        transcriber_available: plugin.is_some(),
        ..BatchAnalysisResult::default()
    };
    let Some(plugin) = plugin else {
        return Ok(result);
    };

    for track in tracks.iter().filter(|t| t.track_type == TrackKind::Audio) {
        if !force
            && let Some(cached) = catalog
                .cached_language_analysis(track.id, file_hash)
                .await?
        {
            debug!(track = track.track_index, "analysis cache hit");
            result.cached += 1;
            result.results.insert(track.id, cached);
            continue;
        }

        let duration = track.duration_seconds.unwrap_or(FALLBACK_TRACK_DURATION);
        match analyze_track_languages(
            file_path,
            track.track_index,
            duration,
            extractor,
            plugin,
            config,
            track.language.as_deref(),
        )
        .await
        {
            Ok(analysis) => {
                catalog
                    .persist_language_analysis(
                        track.id,
                        file_hash,
                        analysis.classification,
                        analysis.primary_language.as_deref(),
                        analysis.primary_percentage,
                        &analysis.segments,
                        None,
                    )
                    .await?;
                if let Some(record) = catalog
                    .cached_language_analysis(track.id, file_hash)
                    .await?
                {
                    result.results.insert(track.id, record);
                }
                result.analyzed += 1;
            }
            Err(
                e @ (TranscriptionError::ShortTrack { .. }
                | TranscriptionError::InsufficientSpeech),
            ) => {
                debug!(track = track.track_index, "analysis skipped: {e}");
                result.skipped += 1;
            }
            Err(e) => {
                warn!(track = track.track_index, error = %e, "language analysis failed");
                result.errors += 1;
            }
        }
    }
    Ok(result)
}

/// Classifies an audio track's commentary and original/dubbed status,
/// combining metadata keywords, transcription output, and language
/// analysis in that priority order, and persists the row.
pub async fn classify_and_persist_track(
    catalog: &Catalog,
    track: &TrackRecord,
    config: &PolicyConfig,
    analysis: Option<&LanguageAnalysisRecord>,
) -> Result<()> {
    let matcher = CommentaryMatcher::new(&config.commentary_patterns);

    let (commentary_status, method, confidence): (&str, DetectionMethod, f64) =
        if matcher.is_commentary(track.title.as_deref())
            || is_music_by_metadata(track.title.as_deref())
            || is_sfx_by_metadata(track.title.as_deref())
        {
            let status = if matcher.is_commentary(track.title.as_deref()) {
                "commentary"
            } else {
                "main"
            };
            (status, DetectionMethod::Metadata, 0.9)
        } else {
            ("main", DetectionMethod::Heuristic, 0.5)
        };

    // Original vs dubbed comes from comparing the stored tag with the
    // detected spoken language.
    let (original_dubbed, method, confidence) = match analysis {
        Some(record) => {
            let spoken = record.primary_language.as_deref();
            let matches = languages_match(track.language.as_deref(), spoken);
            let status = if matches { "original" } else { "dubbed" };
            (
                Some(status),
                if method == DetectionMethod::Metadata {
                    method
                } else {
                    DetectionMethod::Transcription
                },
                confidence.max(record.primary_percentage / 100.0),
            )
        }
        None => (None, method, confidence),
    };

    catalog
        .upsert_classification(
            track.id,
            original_dubbed,
            Some(commentary_status),
            confidence,
            method,
        )
        .await
}
