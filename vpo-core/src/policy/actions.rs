//! Actions attached to conditional rules.
//!
//! Matched rules execute their actions against an [`ActionContext`], which
//! accumulates skip flags, warnings, and pending track / container changes
//! for the phase to fold into its effective policy. A `fail` action aborts
//! the phase immediately.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use vpo_model::{TrackKind, TrackRecord};

use crate::error::PhaseError;
use crate::language::languages_match;

/// Which boolean track flag an action flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackFlag {
    Default,
    Forced,
}

/// Selects the tracks an action applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackSelector {
    #[serde(rename = "type")]
    pub track_type: TrackKind,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub index: Option<i64>,
}

impl TrackSelector {
    pub fn matches(&self, track: &TrackRecord) -> bool {
        if track.track_type != self.track_type {
            return false;
        }
        if let Some(language) = &self.language
            && !languages_match(track.language.as_deref(), Some(language))
        {
            return false;
        }
        if let Some(index) = self.index
            && track.track_index != index
        {
            return false;
        }
        true
    }
}

/// One action in a rule's `then` / `else` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    SkipVideoTranscode,
    SkipAudioTranscode,
    SkipTrackFilter,
    Warn { message: String },
    SetTrackFlag {
        selector: TrackSelector,
        flag: TrackFlag,
        value: bool,
    },
    SetTrackLanguage {
        selector: TrackSelector,
        language: String,
    },
    SetContainerMetadata { key: String, value: String },
    Fail { message: String },
}

/// Skip flags OR-combined across matched rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipFlags {
    pub skip_video_transcode: bool,
    pub skip_audio_transcode: bool,
    pub skip_track_filter: bool,
}

impl SkipFlags {
    pub fn merge(self, other: SkipFlags) -> SkipFlags {
        SkipFlags {
            skip_video_transcode: self.skip_video_transcode || other.skip_video_transcode,
            skip_audio_transcode: self.skip_audio_transcode || other.skip_audio_transcode,
            skip_track_filter: self.skip_track_filter || other.skip_track_filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackFlagChange {
    pub track_index: i64,
    pub flag: TrackFlag,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackLanguageChange {
    pub track_index: i64,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerMetadataChange {
    pub key: String,
    pub value: String,
}

/// Accumulator for a single rule's action list.
#[derive(Debug, Clone)]
pub struct ActionContext<'a> {
    pub file_path: &'a PathBuf,
    pub rule_name: &'a str,
    pub tracks: &'a [TrackRecord],
    pub skip_flags: SkipFlags,
    pub warnings: Vec<String>,
    pub track_flag_changes: Vec<TrackFlagChange>,
    pub track_language_changes: Vec<TrackLanguageChange>,
    pub container_metadata_changes: Vec<ContainerMetadataChange>,
}

impl<'a> ActionContext<'a> {
    pub fn new(file_path: &'a PathBuf, rule_name: &'a str, tracks: &'a [TrackRecord]) -> Self {
        Self {
            file_path,
            rule_name,
            tracks,
            skip_flags: SkipFlags::default(),
            warnings: Vec::new(),
            track_flag_changes: Vec::new(),
            track_language_changes: Vec::new(),
            container_metadata_changes: Vec::new(),
        }
    }
}

/// Runs a rule's actions against the context. A `fail` action raises
/// immediately; everything else accumulates.
pub fn execute_actions<'a>(
    actions: &[RuleAction],
    mut ctx: ActionContext<'a>,
) -> Result<ActionContext<'a>, PhaseError> {
    for action in actions {
        match action {
            RuleAction::SkipVideoTranscode => ctx.skip_flags.skip_video_transcode = true,
            RuleAction::SkipAudioTranscode => ctx.skip_flags.skip_audio_transcode = true,
            RuleAction::SkipTrackFilter => ctx.skip_flags.skip_track_filter = true,
            RuleAction::Warn { message } => {
                debug!(
                    rule = ctx.rule_name,
                    path = %ctx.file_path.display(),
                    "rule warning: {message}"
                );
                ctx.warnings
                    .push(format!("[{}] {message}", ctx.rule_name));
            }
            RuleAction::SetTrackFlag {
                selector,
                flag,
                value,
            } => {
                for track in ctx.tracks.iter().filter(|t| selector.matches(t)) {
                    ctx.track_flag_changes.push(TrackFlagChange {
                        track_index: track.track_index,
                        flag: *flag,
                        value: *value,
                    });
                }
            }
            RuleAction::SetTrackLanguage { selector, language } => {
                let canonical = crate::language::normalize(Some(language));
                for track in ctx.tracks.iter().filter(|t| selector.matches(t)) {
                    ctx.track_language_changes.push(TrackLanguageChange {
                        track_index: track.track_index,
                        language: canonical.clone(),
                    });
                }
            }
            RuleAction::SetContainerMetadata { key, value } => {
                ctx.container_metadata_changes.push(ContainerMetadataChange {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            RuleAction::Fail { message } => {
                return Err(PhaseError::RuleFail {
                    phase: String::new(),
                    rule: ctx.rule_name.to_string(),
                    message: message.clone(),
                });
            }
        }
    }
    Ok(ctx)
}
