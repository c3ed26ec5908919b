//! Multi-sample language detection.
//!
//! Samples the track progressively (start, middle, quarter points, then
//! evenly filled), stopping early once a single sample clears the
//! confidence threshold. Aggregation weights votes by confidence and gives
//! the track's incumbent language a configurable bonus.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::TranscriptionError;
use crate::language::{languages_match, normalize};
use crate::transcription::{AudioSampleExtractor, TranscriptionPlugin};

#[derive(Debug, Clone)]
pub struct MultiSampleConfig {
    pub max_samples: u32,
    pub sample_duration: u32,
    /// A single sample at or above this confidence stops sampling early.
    pub confidence_threshold: f64,
    /// Extra vote weight for the track's existing language tag.
    pub incumbent_bonus: f64,
}

impl Default for MultiSampleConfig {
    fn default() -> Self {
        Self {
            max_samples: 3,
            sample_duration: 30,
            confidence_threshold: 0.85,
            incumbent_bonus: 0.15,
        }
    }
}

/// Result from a single audio sample.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub position: f64,
    pub language: Option<String>,
    pub confidence: f64,
    pub transcript_sample: Option<String>,
}

/// Final aggregated result across samples.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResult {
    pub language: Option<String>,
    pub confidence: f64,
    pub samples_taken: usize,
    pub sample_results: Vec<SampleResult>,
    pub transcript_sample: Option<String>,
}

fn position_exists(pos: f64, positions: &[f64]) -> bool {
    positions.iter().any(|p| (p - pos).abs() < 0.001)
}

/// Sample start positions ordered for progressive sampling: start, middle,
/// quarter, three-quarter, then evenly filled.
pub fn calculate_sample_positions(
    track_duration: f64,
    num_samples: u32,
    sample_duration: u32,
) -> Vec<f64> {
    if num_samples < 1 {
        return Vec::new();
    }

    let max_start = (track_duration - f64::from(sample_duration)).max(0.0);
    if track_duration <= 0.0 || max_start == 0.0 || num_samples == 1 {
        return vec![0.0];
    }

    let priority_fractions = [0.0, 0.5, 0.25, 0.75];
    let mut positions: Vec<f64> = priority_fractions
        .iter()
        .take(num_samples as usize)
        .map(|fraction| max_start * fraction)
        .collect();

    for i in 4..num_samples {
        let fraction = f64::from(i) / f64::from(num_samples);
        let pos = max_start * fraction;
        if !position_exists(pos, &positions) {
            positions.push(pos);
        }
    }

    positions.truncate(num_samples as usize);
    positions
}

/// Majority vote with confidence weighting and incumbent bias.
///
/// Votes are keyed by canonical language; the winner's reported confidence
/// is the arithmetic mean of its samples' confidences (the bonus never
/// inflates confidence, only the vote).
pub fn aggregate_results(
    samples: Vec<SampleResult>,
    incumbent_language: Option<&str>,
    incumbent_bonus: f64,
) -> AggregatedResult {
    if samples.is_empty() {
        return AggregatedResult::default();
    }

    let valid: Vec<&SampleResult> = samples.iter().filter(|s| s.language.is_some()).collect();
    if valid.is_empty() {
        return AggregatedResult {
            samples_taken: samples.len(),
            sample_results: samples,
            ..AggregatedResult::default()
        };
    }

    // BTreeMap keeps vote iteration deterministic for exact ties.
    let mut votes: BTreeMap<String, f64> = BTreeMap::new();
    for sample in &valid {
        let canonical = normalize(sample.language.as_deref());
        *votes.entry(canonical).or_insert(0.0) += sample.confidence;
    }

    if let Some(incumbent) = incumbent_language {
        let canonical = normalize(Some(incumbent));
        let incumbent_key = votes
            .keys()
            .find(|lang| languages_match(Some(lang), Some(&canonical)))
            .cloned();
        if let Some(key) = incumbent_key {
            *votes.entry(key).or_insert(0.0) += incumbent_bonus;
            debug!(bonus = incumbent_bonus, language = %canonical, "added incumbent vote");
        }
    }

    let winner = votes
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(lang, _)| lang.clone())
        .unwrap_or_default();

    let winner_samples: Vec<&&SampleResult> = valid
        .iter()
        .filter(|s| languages_match(s.language.as_deref(), Some(&winner)))
        .collect();
    let confidence = winner_samples.iter().map(|s| s.confidence).sum::<f64>()
        / winner_samples.len() as f64;

    let transcript_sample = samples
        .iter()
        .filter(|s| s.transcript_sample.is_some())
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .and_then(|s| s.transcript_sample.clone());

    AggregatedResult {
        language: Some(winner),
        confidence,
        samples_taken: samples.len(),
        sample_results: samples,
        transcript_sample,
    }
}

/// Progressive multi-sample language detection for one audio track.
///
/// Raises only when every sample extraction or transcription fails.
pub async fn smart_detect(
    file_path: &Path,
    track_index: i64,
    track_duration: f64,
    extractor: &dyn AudioSampleExtractor,
    plugin: &dyn TranscriptionPlugin,
    config: &MultiSampleConfig,
    incumbent_language: Option<&str>,
) -> Result<AggregatedResult, TranscriptionError> {
    let positions =
        calculate_sample_positions(track_duration, config.max_samples, config.sample_duration);

    let mut samples: Vec<SampleResult> = Vec::with_capacity(positions.len());
    let mut errors: Vec<String> = Vec::new();

    for (i, position) in positions.iter().enumerate() {
        info!(
            position,
            sample = i + 1,
            of = positions.len(),
            track_index,
            "sampling audio"
        );

        let outcome = async {
            let audio = extractor
                .extract(file_path, track_index, *position, config.sample_duration)
                .await?;
            plugin.transcribe(&audio).await
        }
        .await;

        match outcome {
            Ok(result) => {
                let sample = SampleResult {
                    position: *position,
                    language: result.language,
                    confidence: result.confidence,
                    transcript_sample: result.transcript_sample,
                };
                debug!(
                    position,
                    language = sample.language.as_deref().unwrap_or("none"),
                    confidence = sample.confidence,
                    "sample result"
                );
                let early_exit = sample.confidence >= config.confidence_threshold;
                samples.push(sample);
                if early_exit {
                    info!(
                        sample = i + 1,
                        threshold = config.confidence_threshold,
                        "confidence threshold reached, stopping early"
                    );
                    break;
                }
            }
            Err(e) => {
                warn!(position, error = %e, "sample failed");
                errors.push(format!("position {position}s: {e}"));
            }
        }
    }

    if samples.is_empty() && !errors.is_empty() {
        return Err(TranscriptionError::AllSamplesFailed {
            attempts: errors.len(),
            detail: errors.join("; "),
        });
    }

    Ok(aggregate_results(
        samples,
        incumbent_language,
        config.incumbent_bonus,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(language: Option<&str>, confidence: f64) -> SampleResult {
        SampleResult {
            position: 0.0,
            language: language.map(String::from),
            confidence,
            transcript_sample: None,
        }
    }

    #[test]
    fn positions_prioritize_start_and_middle() {
        let positions = calculate_sample_positions(1030.0, 3, 30);
        assert_eq!(positions, vec![0.0, 500.0, 250.0]);
    }

    #[test]
    fn short_track_gets_single_position() {
        assert_eq!(calculate_sample_positions(20.0, 3, 30), vec![0.0]);
        assert_eq!(calculate_sample_positions(0.0, 3, 30), vec![0.0]);
        assert_eq!(calculate_sample_positions(1000.0, 1, 30), vec![0.0]);
    }

    #[test]
    fn more_than_four_samples_fill_evenly() {
        let positions = calculate_sample_positions(1030.0, 6, 30);
        assert_eq!(positions.len(), 6);
        assert_eq!(&positions[..4], &[0.0, 500.0, 250.0, 750.0]);
    }

    /// The incumbent bonus only flips the vote once it outweighs the
    /// sample margin.
    #[test]
    fn incumbent_bonus_shifts_votes() {
        let samples = vec![
            sample(Some("eng"), 0.60),
            sample(Some("ger"), 0.55),
            sample(Some("eng"), 0.58),
        ];

        // eng 1.18 vs ger 0.55 + 0.15 = 0.70: eng wins.
        let result = aggregate_results(samples.clone(), Some("ger"), 0.15);
        assert_eq!(result.language.as_deref(), Some("eng"));
        assert!((result.confidence - 0.59).abs() < 1e-9);

        // Without the bonus eng still wins.
        let result = aggregate_results(samples.clone(), None, 0.0);
        assert_eq!(result.language.as_deref(), Some("eng"));

        // A large bonus flips the vote to the incumbent.
        let result = aggregate_results(samples, Some("ger"), 0.90);
        assert_eq!(result.language.as_deref(), Some("ger"));
        assert!((result.confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn incumbent_matches_cross_standard() {
        let samples = vec![sample(Some("de"), 0.4), sample(Some("eng"), 0.45)];
        // Incumbent tagged 639-2/T "deu" must find the "ger" vote bucket.
        let result = aggregate_results(samples, Some("deu"), 0.2);
        assert_eq!(result.language.as_deref(), Some("ger"));
    }

    #[test]
    fn identical_samples_aggregate_to_same_confidence() {
        let samples = vec![sample(Some("eng"), 0.7), sample(Some("eng"), 0.7)];
        let result = aggregate_results(samples, None, 0.15);
        assert_eq!(result.language.as_deref(), Some("eng"));
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn no_valid_samples_yields_no_language() {
        let samples = vec![sample(None, 0.0), sample(None, 0.0)];
        let result = aggregate_results(samples, Some("eng"), 0.15);
        assert_eq!(result.language, None);
        assert_eq!(result.samples_taken, 2);
    }

    #[test]
    fn empty_input_yields_default() {
        let result = aggregate_results(Vec::new(), None, 0.15);
        assert_eq!(result.language, None);
        assert_eq!(result.samples_taken, 0);
    }

    #[test]
    fn best_transcript_comes_from_highest_confidence_sample() {
        let mut a = sample(Some("eng"), 0.5);
        a.transcript_sample = Some("low".into());
        let mut b = sample(Some("eng"), 0.9);
        b.transcript_sample = Some("high".into());
        let result = aggregate_results(vec![a, b], None, 0.0);
        assert_eq!(result.transcript_sample.as_deref(), Some("high"));
    }
}
