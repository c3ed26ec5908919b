//! Conditional rule evaluation.
//!
//! Rules gate a phase: the first (or every) matching rule's actions adjust
//! the effective policy before the phase body runs. A trace of every rule
//! evaluation is returned for observability.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PhaseError;
use crate::policy::actions::{
    execute_actions, ActionContext, ContainerMetadataChange, RuleAction, SkipFlags,
    TrackFlagChange, TrackLanguageChange,
};
use crate::policy::conditions::{evaluate_condition, Condition, ConditionContext};

/// First-match-wins vs evaluate-everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    First,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalRule {
    pub name: String,
    pub when: Condition,
    #[serde(rename = "then")]
    pub then_actions: Vec<RuleAction>,
    #[serde(default, rename = "else")]
    pub else_actions: Option<Vec<RuleAction>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    pub items: Vec<ConditionalRule>,
}

/// One row of the evaluation trace.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    pub rule_name: String,
    pub matched: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBranch {
    Then,
    Else,
}

/// Outcome of evaluating a phase's rules.
#[derive(Debug, Clone, Default)]
pub struct ConditionalResult {
    pub matched_rule: Option<String>,
    pub matched_branch: Option<MatchedBranch>,
    pub skip_flags: SkipFlags,
    pub warnings: Vec<String>,
    pub track_flag_changes: Vec<TrackFlagChange>,
    pub track_language_changes: Vec<TrackLanguageChange>,
    pub container_metadata_changes: Vec<ContainerMetadataChange>,
    pub evaluation_trace: Vec<RuleEvaluation>,
}

fn run_branch<'a>(
    rule: &'a ConditionalRule,
    actions: &[RuleAction],
    file_path: &'a PathBuf,
    ctx: &ConditionContext<'a>,
) -> Result<ActionContext<'a>, PhaseError> {
    let action_ctx = ActionContext::new(file_path, &rule.name, ctx.tracks);
    execute_actions(actions, action_ctx)
}

fn absorb(result: &mut ConditionalResult, ctx: ActionContext<'_>, merge: bool) {
    if merge {
        result.skip_flags = result.skip_flags.merge(ctx.skip_flags);
        result.warnings.extend(ctx.warnings);
        result.track_flag_changes.extend(ctx.track_flag_changes);
        result
            .track_language_changes
            .extend(ctx.track_language_changes);
        result
            .container_metadata_changes
            .extend(ctx.container_metadata_changes);
    } else {
        result.skip_flags = ctx.skip_flags;
        result.warnings = ctx.warnings;
        result.track_flag_changes = ctx.track_flag_changes;
        result.track_language_changes = ctx.track_language_changes;
        result.container_metadata_changes = ctx.container_metadata_changes;
    }
}

/// Evaluates conditional rules and executes matching actions.
///
/// FIRST mode stops at the first matching rule; when nothing matches, the
/// last rule's `else` clause fires if present. ALL mode runs every matching
/// rule's `then` and merges results (skip flags OR-combined, lists
/// concatenated); `else` clauses on non-last rules are ignored with a
/// warning.
pub fn evaluate_conditional_rules(
    rules: &RulesConfig,
    file_path: &PathBuf,
    ctx: &ConditionContext<'_>,
) -> Result<ConditionalResult, PhaseError> {
    let mut result = ConditionalResult::default();
    if rules.items.is_empty() {
        return Ok(result);
    }

    match rules.match_mode {
        MatchMode::First => evaluate_first_match(rules, file_path, ctx, &mut result)?,
        MatchMode::All => evaluate_all_match(rules, file_path, ctx, &mut result)?,
    }
    Ok(result)
}

fn evaluate_first_match(
    rules: &RulesConfig,
    file_path: &PathBuf,
    ctx: &ConditionContext<'_>,
    result: &mut ConditionalResult,
) -> Result<(), PhaseError> {
    let last = rules.items.len() - 1;
    for (i, rule) in rules.items.iter().enumerate() {
        let (matched, reason) = evaluate_condition(&rule.when, ctx);
        result.evaluation_trace.push(RuleEvaluation {
            rule_name: rule.name.clone(),
            matched,
            reason,
        });

        if matched {
            result.matched_rule = Some(rule.name.clone());
            result.matched_branch = Some(MatchedBranch::Then);
            let action_ctx = run_branch(rule, &rule.then_actions, file_path, ctx)?;
            absorb(result, action_ctx, false);
            return Ok(());
        }

        if i == last
            && let Some(else_actions) = &rule.else_actions
        {
            result.matched_rule = Some(rule.name.clone());
            result.matched_branch = Some(MatchedBranch::Else);
            let action_ctx = run_branch(rule, else_actions, file_path, ctx)?;
            absorb(result, action_ctx, false);
        }
    }
    Ok(())
}

fn evaluate_all_match(
    rules: &RulesConfig,
    file_path: &PathBuf,
    ctx: &ConditionContext<'_>,
    result: &mut ConditionalResult,
) -> Result<(), PhaseError> {
    let last = rules.items.len() - 1;
    for (i, rule) in rules.items.iter().enumerate() {
        if i != last && rule.else_actions.is_some() {
            warn!(
                rule = %rule.name,
                "rule has else actions but is not the last rule in ALL mode; \
                 only the last rule's else clause fires when no rules match"
            );
        }
    }

    let mut any_matched = false;
    for rule in &rules.items {
        let (matched, reason) = evaluate_condition(&rule.when, ctx);
        result.evaluation_trace.push(RuleEvaluation {
            rule_name: rule.name.clone(),
            matched,
            reason,
        });
        if matched {
            any_matched = true;
            result.matched_rule = Some(rule.name.clone());
            result.matched_branch = Some(MatchedBranch::Then);
            let action_ctx = run_branch(rule, &rule.then_actions, file_path, ctx)?;
            absorb(result, action_ctx, true);
        }
    }

    if !any_matched
        && let Some(last_rule) = rules.items.last()
        && let Some(else_actions) = &last_rule.else_actions
    {
        result.matched_rule = Some(last_rule.name.clone());
        result.matched_branch = Some(MatchedBranch::Else);
        let action_ctx = run_branch(last_rule, else_actions, file_path, ctx)?;
        absorb(result, action_ctx, true);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpo_model::{TrackKind, TrackRecord};

    fn track(index: i64, kind: TrackKind, codec: &str) -> TrackRecord {
        TrackRecord {
            id: index + 1,
            file_id: 1,
            track_index: index,
            track_type: kind,
            codec: Some(codec.to_string()),
            language: None,
            title: None,
            is_default: false,
            is_forced: false,
            channels: None,
            channel_layout: None,
            width: None,
            height: if kind == TrackKind::Video { Some(1080) } else { None },
            frame_rate: None,
            color_transfer: None,
            color_primaries: None,
            color_space: None,
            color_range: None,
            duration_seconds: None,
        }
    }

    fn cond_ctx<'a>(tracks: &'a [TrackRecord]) -> ConditionContext<'a> {
        ConditionContext {
            tracks,
            container_format: Some("matroska"),
            file_size_bytes: Some(1024),
            duration_seconds: Some(3600.0),
            plugin_metadata: None,
            container_tags: None,
        }
    }

    fn rule(name: &str, when: Condition, then: Vec<RuleAction>) -> ConditionalRule {
        ConditionalRule {
            name: name.to_string(),
            when,
            then_actions: then,
            else_actions: None,
        }
    }

    #[test]
    fn first_mode_stops_at_first_match() {
        let tracks = vec![track(0, TrackKind::Video, "hevc")];
        let rules = RulesConfig {
            match_mode: MatchMode::First,
            items: vec![
                rule(
                    "already-hevc",
                    Condition::CodecMatches(vec!["hevc".into()]),
                    vec![RuleAction::SkipVideoTranscode],
                ),
                rule(
                    "also-matches",
                    Condition::Container(vec!["matroska".into()]),
                    vec![RuleAction::SkipAudioTranscode],
                ),
            ],
        };
        let path = PathBuf::from("/x/a.mkv");
        let result = evaluate_conditional_rules(&rules, &path, &cond_ctx(&tracks)).unwrap();
        assert_eq!(result.matched_rule.as_deref(), Some("already-hevc"));
        assert!(result.skip_flags.skip_video_transcode);
        assert!(!result.skip_flags.skip_audio_transcode);
        // Trace stops at the first match.
        assert_eq!(result.evaluation_trace.len(), 1);
    }

    #[test]
    fn first_mode_no_match_fires_last_else() {
        let tracks = vec![track(0, TrackKind::Video, "h264")];
        let rules = RulesConfig {
            match_mode: MatchMode::First,
            items: vec![
                rule(
                    "never",
                    Condition::Container(vec!["avi".into()]),
                    vec![RuleAction::SkipVideoTranscode],
                ),
                ConditionalRule {
                    name: "fallback".to_string(),
                    when: Condition::Container(vec!["mp4".into()]),
                    then_actions: vec![],
                    else_actions: Some(vec![RuleAction::Warn {
                        message: "no rule matched".into(),
                    }]),
                },
            ],
        };
        let path = PathBuf::from("/x/a.mkv");
        let result = evaluate_conditional_rules(&rules, &path, &cond_ctx(&tracks)).unwrap();
        assert_eq!(result.matched_rule.as_deref(), Some("fallback"));
        assert_eq!(result.matched_branch, Some(MatchedBranch::Else));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn first_mode_no_match_no_else_leaves_result_empty() {
        let tracks = vec![track(0, TrackKind::Video, "h264")];
        let rules = RulesConfig {
            match_mode: MatchMode::First,
            items: vec![rule(
                "never",
                Condition::Container(vec!["avi".into()]),
                vec![RuleAction::SkipVideoTranscode],
            )],
        };
        let path = PathBuf::from("/x/a.mkv");
        let result = evaluate_conditional_rules(&rules, &path, &cond_ctx(&tracks)).unwrap();
        assert!(result.matched_rule.is_none());
        assert_eq!(result.skip_flags, SkipFlags::default());
        assert_eq!(result.evaluation_trace.len(), 1);
    }

    #[test]
    fn all_mode_merges_overlapping_actions() {
        let tracks = vec![track(0, TrackKind::Video, "hevc")];
        let rules = RulesConfig {
            match_mode: MatchMode::All,
            items: vec![
                rule(
                    "skip-video",
                    Condition::CodecMatches(vec!["hevc".into()]),
                    vec![
                        RuleAction::SkipVideoTranscode,
                        RuleAction::Warn { message: "a".into() },
                    ],
                ),
                rule(
                    "skip-audio",
                    Condition::Container(vec!["matroska".into()]),
                    vec![
                        RuleAction::SkipAudioTranscode,
                        RuleAction::Warn { message: "b".into() },
                    ],
                ),
            ],
        };
        let path = PathBuf::from("/x/a.mkv");
        let result = evaluate_conditional_rules(&rules, &path, &cond_ctx(&tracks)).unwrap();
        assert!(result.skip_flags.skip_video_transcode);
        assert!(result.skip_flags.skip_audio_transcode);
        // Warnings concatenate in rule order.
        assert_eq!(result.warnings, vec!["[skip-video] a", "[skip-audio] b"]);
        assert_eq!(result.evaluation_trace.len(), 2);
    }

    #[test]
    fn fail_action_aborts() {
        let tracks = vec![track(0, TrackKind::Video, "hevc")];
        let rules = RulesConfig {
            match_mode: MatchMode::First,
            items: vec![rule(
                "guard",
                Condition::CodecMatches(vec!["hevc".into()]),
                vec![RuleAction::Fail {
                    message: "refusing to touch hevc".into(),
                }],
            )],
        };
        let path = PathBuf::from("/x/a.mkv");
        let err = evaluate_conditional_rules(&rules, &path, &cond_ctx(&tracks)).unwrap_err();
        assert!(err.to_string().contains("refusing"));
    }

    #[test]
    fn rules_deserialize_from_yaml() {
        let yaml = r#"
match: all
items:
  - name: hevc-done
    when:
      codec_matches: [hevc, h265]
    then:
      - skip_video_transcode
      - warn:
          message: already encoded
  - name: fallback
    when:
      container: [avi]
    then: []
    else:
      - warn:
          message: nothing matched
"#;
        let rules: RulesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.match_mode, MatchMode::All);
        assert_eq!(rules.items.len(), 2);
        assert!(rules.items[1].else_actions.is_some());
    }
}
