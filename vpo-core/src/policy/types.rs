//! Typed policy document.
//!
//! A policy is an immutable YAML document with a `schema_version`, global
//! `config` preferences, an ordered list of `phases`, and a `workflow`
//! section naming which phases run. Validation happens once at load time;
//! after that the document is frozen and shared by reference.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::policy::rules::RulesConfig;

/// Minimum supported policy schema version.
pub const MIN_SCHEMA_VERSION: u32 = 12;

/// Closed set of resolution tokens accepted in policies.
pub const VALID_RESOLUTIONS: &[&str] = &["480p", "720p", "1080p", "1440p", "2160p", "4k", "8k"];

/// Closed set of encoder presets.
pub const VALID_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow", "slower",
    "veryslow", "placebo",
];

/// Closed set of x264/x265 tune tokens.
pub const VALID_TUNES: &[&str] = &[
    "film", "animation", "grain", "stillimage", "fastdecode", "zerolatency", "psnr", "ssim",
];

pub const VALID_VIDEO_CODECS: &[&str] = &["hevc", "h265", "h264", "av1", "vp9"];

pub const VALID_AUDIO_CODECS: &[&str] =
    &["aac", "ac3", "eac3", "opus", "flac", "mp3", "dts", "truehd", "pcm_s16le", "pcm_s24le"];

/// Shell metacharacters forbidden in free-form tool argument lists.
const FORBIDDEN_ARG_PATTERNS: &[&str] =
    &[";", "|", "&", "$(", "`", "${", ">", "<", "\\n", "\n"];

const MAX_FFMPEG_ARGS_COUNT: usize = 50;
const MAX_FFMPEG_ARG_LENGTH: usize = 1024;

/// Parses a bitrate string (`10M`, `192k`, `2.5M`, or raw bits-per-second)
/// into bits per second. Returns `None` for malformed strings.
pub fn parse_bitrate(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(raw) = trimmed.parse::<u64>() {
        return Some(raw);
    }
    let (number, multiplier) = match trimmed.chars().last()? {
        'M' | 'm' => (&trimmed[..trimmed.len() - 1], 1_000_000f64),
        'K' | 'k' => (&trimmed[..trimmed.len() - 1], 1_000f64),
        _ => return None,
    };
    let parsed: f64 = number.parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some((parsed * multiplier) as u64)
}

/// Track categories the evaluator sorts and flags by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackCategory {
    Video,
    AudioMain,
    AudioAlternate,
    AudioCommentary,
    AudioMusic,
    AudioSfx,
    AudioNonSpeech,
    SubtitleMain,
    SubtitleForced,
    SubtitleCommentary,
    Attachment,
}

/// Which phase a definition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Analyze,
    Apply,
    Transcode,
    Synthesize,
    Move,
    Timestamp,
}

impl PhaseName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Analyze => "analyze",
            PhaseName::Apply => "apply",
            PhaseName::Transcode => "transcode",
            PhaseName::Synthesize => "synthesize",
            PhaseName::Move => "move",
            PhaseName::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for PhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure handling mode for a phase or the whole workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Log, mark the phase failed, move on to the next phase.
    #[default]
    Skip,
    /// Log, mark the phase failed, run subsequent phases anyway.
    Continue,
    /// Abort the file immediately.
    Fail,
}

/// Which tracks get the default flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DefaultFlagsConfig {
    pub set_first_video_default: bool,
    pub set_preferred_audio_default: bool,
    pub set_preferred_subtitle_default: bool,
    /// When no audio track matches the audio preference, mark the preferred
    /// subtitle default instead.
    pub set_subtitle_default_when_audio_differs: bool,
    pub clear_other_defaults: bool,
}

impl Default for DefaultFlagsConfig {
    fn default() -> Self {
        Self {
            set_first_video_default: true,
            set_preferred_audio_default: true,
            set_preferred_subtitle_default: false,
            set_subtitle_default_when_audio_differs: false,
            clear_other_defaults: true,
        }
    }
}

/// Transcription behavior knobs used by analysis and the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TranscriptionSettings {
    pub enabled: bool,
    pub plugin: String,
    /// Minimum confidence before a detected language updates a track tag.
    pub confidence_threshold: f64,
    pub update_language_from_transcription: bool,
    pub detect_commentary: bool,
    pub max_samples: u32,
    pub sample_duration: u32,
    pub incumbent_bonus: f64,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            plugin: "whisper".to_string(),
            confidence_threshold: 0.8,
            update_language_from_transcription: false,
            detect_commentary: false,
            max_samples: 3,
            sample_duration: 30,
            incumbent_bonus: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LanguageSettings {
    /// Canonical storage standard; `639-2/B` unless overridden.
    pub standard: String,
    pub warn_on_conversion: bool,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            standard: "639-2/B".to_string(),
            warn_on_conversion: false,
        }
    }
}

/// Which unpreferred tracks the evaluator may mark for removal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrackFilterConfig {
    pub remove_unpreferred_audio: bool,
    pub remove_unpreferred_subtitles: bool,
}

impl TrackFilterConfig {
    pub fn is_enabled(&self) -> bool {
        self.remove_unpreferred_audio || self.remove_unpreferred_subtitles
    }
}

/// Optional container conversion applied during the apply phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerPolicy {
    /// Target container format, e.g. `mkv`.
    pub target_format: String,
}

/// Global preferences shared by every phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicyConfig {
    pub audio_language_preference: Vec<String>,
    pub subtitle_language_preference: Vec<String>,
    pub track_order: Vec<TrackCategory>,
    pub commentary_patterns: Vec<String>,
    pub default_flags: DefaultFlagsConfig,
    pub transcription: Option<TranscriptionSettings>,
    pub language: LanguageSettings,
    pub track_filter: TrackFilterConfig,
    pub container: Option<ContainerPolicy>,
    pub on_error: OnError,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            audio_language_preference: Vec::new(),
            subtitle_language_preference: Vec::new(),
            track_order: vec![
                TrackCategory::Video,
                TrackCategory::AudioMain,
                TrackCategory::AudioAlternate,
                TrackCategory::AudioCommentary,
                TrackCategory::SubtitleMain,
                TrackCategory::SubtitleForced,
                TrackCategory::SubtitleCommentary,
                TrackCategory::Attachment,
            ],
            commentary_patterns: vec!["commentary".to_string(), "director".to_string()],
            default_flags: DefaultFlagsConfig::default(),
            transcription: None,
            language: LanguageSettings::default(),
            track_filter: TrackFilterConfig::default(),
            container: None,
            on_error: OnError::default(),
        }
    }
}

impl PolicyConfig {
    pub fn transcription_enabled(&self) -> bool {
        self.transcription.as_ref().is_some_and(|t| t.enabled)
    }

    pub fn detect_commentary_by_transcription(&self) -> bool {
        self.transcription
            .as_ref()
            .is_some_and(|t| t.enabled && t.detect_commentary)
    }
}

/// Transcode skip heuristics; all configured leaves must hold for the skip
/// to fire (a file already matching codec, resolution, and bitrate bounds
/// gains nothing from a re-encode).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TranscodeSkipIf {
    pub codec_matches: Option<Vec<String>>,
    pub resolution_within: Option<String>,
    pub bitrate_under: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoTranscodeConfig {
    /// Target video codec.
    pub to: String,
    #[serde(default)]
    pub skip_if: Option<TranscodeSkipIf>,
    #[serde(default)]
    pub crf: Option<u32>,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub tune: Option<String>,
    #[serde(default)]
    pub target_bitrate: Option<String>,
    #[serde(default)]
    pub max_bitrate: Option<String>,
    #[serde(default)]
    pub two_pass: bool,
    #[serde(default)]
    pub max_resolution: Option<String>,
    #[serde(default)]
    pub ffmpeg_args: Option<Vec<String>>,
}

fn default_preset() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioTranscodeConfig {
    /// Codecs preserved via stream copy.
    #[serde(default = "default_preserve")]
    pub preserve: Vec<String>,
    #[serde(default = "default_audio_codec")]
    pub to: String,
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: String,
}

fn default_preserve() -> Vec<String> {
    ["truehd", "dts-hd", "flac", "pcm_s24le"]
        .map(String::from)
        .to_vec()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TranscodeConfig {
    pub video: Option<VideoTranscodeConfig>,
    pub audio: Option<AudioTranscodeConfig>,
}

/// One audio synthesis definition: derive a new track from an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesisDefinition {
    /// Language of the source track to synthesize from; preferred audio
    /// track when absent.
    #[serde(default)]
    pub from_language: Option<String>,
    pub to: String,
    pub channels: u32,
    #[serde(default)]
    pub bitrate: Option<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Skip synthesis when a track with the target codec and channel count
    /// already exists.
    #[serde(default = "default_true")]
    pub skip_if_exists: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveConfig {
    /// Destination template; `{title}`, `{year}`, `{season}`, `{episode}`,
    /// `{resolution}`, `{filename}`, `{ext}` are substituted from parsed
    /// filename metadata.
    pub destination: String,
    /// Literal used for template fields that did not parse.
    #[serde(default = "default_move_fallback")]
    pub fallback: String,
}

fn default_move_fallback() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileTimestampConfig {
    pub mode: TimestampPolicyMode,
    #[serde(default)]
    pub date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub fallback: Option<TimestampPolicyMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicyMode {
    MetadataDate,
    FixedDate,
    Preserve,
}

/// Union-of-conditions skip gate attached to a phase. The phase is skipped
/// when any configured field of any entry matches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PhaseSkipCondition {
    pub video_codec: Option<Vec<String>>,
    pub audio_codec_exists: Option<String>,
    pub subtitle_language_exists: Option<String>,
    pub container: Option<Vec<String>>,
    pub resolution: Option<String>,
    pub resolution_under: Option<String>,
    pub file_size_under: Option<String>,
    pub file_size_over: Option<String>,
    pub duration_under: Option<String>,
    pub duration_over: Option<String>,
}

/// One phase of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseDefinition {
    pub name: PhaseName,
    #[serde(default)]
    pub skip_when: Vec<PhaseSkipCondition>,
    #[serde(default)]
    pub rules: Option<RulesConfig>,
    #[serde(default)]
    pub on_error: Option<OnError>,
    #[serde(default)]
    pub transcode: Option<TranscodeConfig>,
    #[serde(default)]
    pub synthesize: Vec<SynthesisDefinition>,
    #[serde(default, rename = "move")]
    pub move_config: Option<MoveConfig>,
    #[serde(default)]
    pub file_timestamp: Option<FileTimestampConfig>,
}

/// Which phases run, in order, plus the workflow-level failure policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkflowConfig {
    pub phases: Vec<PhaseName>,
    pub on_error: OnError,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            phases: vec![PhaseName::Analyze, PhaseName::Apply],
            on_error: OnError::default(),
        }
    }
}

/// A full policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub config: PolicyConfig,
    /// Mandatory; flat pre-phases policies are rejected at parse time by
    /// this field's absence.
    pub phases: Vec<PhaseDefinition>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl PolicyDocument {
    /// Finds the definition for a phase, if the document carries one.
    pub fn phase(&self, name: PhaseName) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Validates the whole document. Called once at load time.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.schema_version < MIN_SCHEMA_VERSION {
            return Err(PolicyError::SchemaVersion {
                found: self.schema_version,
                minimum: MIN_SCHEMA_VERSION,
            });
        }
        if self.phases.is_empty() {
            return Err(PolicyError::Validation(
                "policy must declare at least one phase".to_string(),
            ));
        }
        for workflow_phase in &self.workflow.phases {
            if self.phase(*workflow_phase).is_none() {
                return Err(PolicyError::Validation(format!(
                    "workflow references phase '{workflow_phase}' with no definition"
                )));
            }
        }
        for phase in &self.phases {
            if let Some(transcode) = &phase.transcode {
                if let Some(video) = &transcode.video {
                    validate_video_transcode(video)?;
                }
                if let Some(audio) = &transcode.audio {
                    validate_audio_transcode(audio)?;
                }
            }
            for synthesis in &phase.synthesize {
                validate_synthesis(synthesis)?;
            }
        }
        Ok(())
    }
}

fn validate_resolution_token(value: &str, field: &str) -> Result<(), PolicyError> {
    if !VALID_RESOLUTIONS.contains(&value.to_lowercase().as_str()) {
        return Err(PolicyError::Validation(format!(
            "invalid {field} '{value}'; must be one of: {}",
            VALID_RESOLUTIONS.join(", ")
        )));
    }
    Ok(())
}

fn validate_bitrate_token(value: &str, field: &str) -> Result<(), PolicyError> {
    if parse_bitrate(value).is_none() {
        return Err(PolicyError::Validation(format!(
            "invalid {field} '{value}'; must be a number followed by M or k, or raw bits per second"
        )));
    }
    Ok(())
}

/// Hard security guard on free-form tool argument lists.
pub fn validate_ffmpeg_args(args: &[String]) -> Result<(), PolicyError> {
    if args.len() > MAX_FFMPEG_ARGS_COUNT {
        return Err(PolicyError::Validation(format!(
            "ffmpeg_args count exceeds limit: {} > {MAX_FFMPEG_ARGS_COUNT}",
            args.len()
        )));
    }
    for (i, arg) in args.iter().enumerate() {
        if arg.len() > MAX_FFMPEG_ARG_LENGTH {
            return Err(PolicyError::Validation(format!(
                "ffmpeg_args[{i}] exceeds length limit: {} > {MAX_FFMPEG_ARG_LENGTH}",
                arg.len()
            )));
        }
        for pattern in FORBIDDEN_ARG_PATTERNS {
            if arg.contains(pattern) {
                return Err(PolicyError::Validation(format!(
                    "ffmpeg_args[{i}] contains forbidden character '{pattern}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_video_transcode(video: &VideoTranscodeConfig) -> Result<(), PolicyError> {
    if !VALID_VIDEO_CODECS.contains(&video.to.to_lowercase().as_str()) {
        return Err(PolicyError::Validation(format!(
            "invalid target video codec '{}'; must be one of: {}",
            video.to,
            VALID_VIDEO_CODECS.join(", ")
        )));
    }
    if video.crf.is_some() && video.target_bitrate.is_some() {
        return Err(PolicyError::Validation(
            "cannot set both 'crf' and 'target_bitrate'; use crf alone for CRF mode, \
             target_bitrate alone for bitrate mode, or crf + max_bitrate for constrained quality"
                .to_string(),
        ));
    }
    if let Some(crf) = video.crf
        && crf > 51
    {
        return Err(PolicyError::Validation(format!(
            "crf {crf} out of range 0..=51"
        )));
    }
    if !VALID_PRESETS.contains(&video.preset.as_str()) {
        return Err(PolicyError::Validation(format!(
            "invalid preset '{}'; must be one of: {}",
            video.preset,
            VALID_PRESETS.join(", ")
        )));
    }
    if let Some(tune) = &video.tune
        && !VALID_TUNES.contains(&tune.as_str())
    {
        return Err(PolicyError::Validation(format!(
            "invalid tune '{tune}'; must be one of: {}",
            VALID_TUNES.join(", ")
        )));
    }
    for (field, value) in [
        ("target_bitrate", &video.target_bitrate),
        ("max_bitrate", &video.max_bitrate),
    ] {
        if let Some(v) = value {
            validate_bitrate_token(v, field)?;
        }
    }
    if let Some(resolution) = &video.max_resolution {
        validate_resolution_token(resolution, "max_resolution")?;
    }
    if let Some(skip_if) = &video.skip_if {
        if let Some(resolution) = &skip_if.resolution_within {
            validate_resolution_token(resolution, "skip_if.resolution_within")?;
        }
        if let Some(bitrate) = &skip_if.bitrate_under {
            validate_bitrate_token(bitrate, "skip_if.bitrate_under")?;
        }
    }
    if let Some(args) = &video.ffmpeg_args {
        validate_ffmpeg_args(args)?;
    }
    Ok(())
}

fn validate_audio_transcode(audio: &AudioTranscodeConfig) -> Result<(), PolicyError> {
    if !VALID_AUDIO_CODECS.contains(&audio.to.to_lowercase().as_str()) {
        return Err(PolicyError::Validation(format!(
            "invalid target audio codec '{}'; must be one of: {}",
            audio.to,
            VALID_AUDIO_CODECS.join(", ")
        )));
    }
    validate_bitrate_token(&audio.bitrate, "audio.bitrate")
}

fn validate_synthesis(synthesis: &SynthesisDefinition) -> Result<(), PolicyError> {
    if !VALID_AUDIO_CODECS.contains(&synthesis.to.to_lowercase().as_str()) {
        return Err(PolicyError::Validation(format!(
            "invalid synthesis target codec '{}'",
            synthesis.to
        )));
    }
    if synthesis.channels == 0 {
        return Err(PolicyError::Validation(
            "synthesis channels must be at least 1".to_string(),
        ));
    }
    if let Some(bitrate) = &synthesis.bitrate {
        validate_bitrate_token(bitrate, "synthesis.bitrate")?;
    }
    validate_ffmpeg_args(&synthesis.filters)?;
    Ok(())
}
