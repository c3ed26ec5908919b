//! The per-file phase runner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use vpo_model::{
    FileRecord, Plan, PlannedAction, QualityMode, TrackKind, TrackRecord, TranscriptionRecord,
};

use crate::analysis;
use crate::catalog::Catalog;
use crate::error::{PhaseError, Result};
use crate::executor::{CancelFlag, ExecutorResult, PlanExecutor, ProgressCallback, ProgressSink};
use crate::filename::FilenameParser;
use crate::plugins::{EventBus, PluginEvent};
use crate::policy::conditions::ConditionContext;
use crate::policy::rules::{evaluate_conditional_rules, ConditionalResult};
use crate::policy::types::{
    parse_bitrate, OnError, PhaseDefinition, PhaseName, PolicyDocument, TranscodeSkipIf,
};
use crate::policy::{evaluate, EvaluationSignals};
use crate::transcription::{AudioSampleExtractor, MultiSampleConfig, TranscriptionPlugin};
use crate::workflow::skip::{evaluate_phase_skip, SkipReason, SkipReasonType};

/// Result of one phase for one file.
#[derive(Debug)]
pub struct PhaseOutcome {
    pub name: PhaseName,
    pub success: bool,
    pub duration_seconds: f64,
    pub skip_reason: Option<SkipReason>,
    pub changes_made: usize,
    pub warnings: Vec<String>,
    pub message: Option<String>,
}

/// Everything that happened to one file across its workflow.
#[derive(Debug, Default)]
pub struct FileProcessingResult {
    pub phase_results: Vec<PhaseOutcome>,
    pub total_changes: usize,
    pub phases_completed: usize,
    pub phases_failed: usize,
    pub phases_skipped: usize,
    pub error_message: Option<String>,
    /// False only when a phase failed under `on_error: fail`.
    pub success: bool,
}

/// Runs the declared phases for one file.
pub struct WorkflowProcessor {
    catalog: Catalog,
    executor: PlanExecutor,
    extractor: Arc<dyn AudioSampleExtractor>,
    transcriber: Option<Arc<dyn TranscriptionPlugin>>,
    bus: Option<Arc<EventBus>>,
    parser: FilenameParser,
}

impl std::fmt::Debug for WorkflowProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowProcessor")
            .field("transcriber", &self.transcriber.is_some())
            .finish()
    }
}

impl WorkflowProcessor {
    pub fn new(
        catalog: Catalog,
        executor: PlanExecutor,
        extractor: Arc<dyn AudioSampleExtractor>,
        transcriber: Option<Arc<dyn TranscriptionPlugin>>,
        bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            catalog,
            executor,
            extractor,
            transcriber,
            bus,
            parser: FilenameParser::new(),
        }
    }

    /// Processes one file through every phase the policy's workflow names,
    /// in declared order.
    pub async fn process_file(
        &self,
        file: &FileRecord,
        policy: &PolicyDocument,
        job_id: Option<&str>,
        cancel: Option<&CancelFlag>,
        progress: Option<ProgressSink>,
    ) -> FileProcessingResult {
        let mut result = FileProcessingResult {
            success: true,
            ..FileProcessingResult::default()
        };

        for phase_name in &policy.workflow.phases {
            let Some(phase) = policy.phase(*phase_name) else {
                // Validation rejects this; a defensive log is all that is
                // appropriate at runtime.
                warn!(phase = %phase_name, "workflow phase has no definition, skipping");
                continue;
            };

            let started = Instant::now();
            let outcome = self
                .run_phase(file, policy, phase, job_id, cancel, progress.clone())
                .await;
            let duration_seconds = started.elapsed().as_secs_f64();

            match outcome {
                Ok(mut phase_outcome) => {
                    phase_outcome.duration_seconds = duration_seconds;
                    if phase_outcome.skip_reason.is_some() {
                        result.phases_skipped += 1;
                    } else {
                        result.phases_completed += 1;
                        result.total_changes += phase_outcome.changes_made;
                    }
                    result.phase_results.push(phase_outcome);
                }
                Err(e) => {
                    let mode = phase.on_error.unwrap_or(policy.workflow.on_error);
                    error!(
                        path = %file.path.display(),
                        job_id = job_id.unwrap_or("-"),
                        phase = %phase_name,
                        error = %e,
                        "phase failed"
                    );
                    result.phases_failed += 1;
                    result.phase_results.push(PhaseOutcome {
                        name: *phase_name,
                        success: false,
                        duration_seconds,
                        skip_reason: None,
                        changes_made: 0,
                        warnings: Vec::new(),
                        message: Some(e.to_string()),
                    });
                    match mode {
                        OnError::Skip => {
                            // Phase failed; give up on this file but do not
                            // fail the whole run.
                            break;
                        }
                        OnError::Continue => continue,
                        OnError::Fail => {
                            result.success = false;
                            result.error_message = Some(e.to_string());
                            break;
                        }
                    }
                }
            }
        }

        result
    }

    async fn run_phase(
        &self,
        file: &FileRecord,
        policy: &PolicyDocument,
        phase: &PhaseDefinition,
        job_id: Option<&str>,
        cancel: Option<&CancelFlag>,
        progress: Option<ProgressSink>,
    ) -> Result<PhaseOutcome> {
        let tracks = self.catalog.tracks_for_file(file.id).await?;

        // Skip evaluation comes first; a skipped phase contributes zero
        // changes.
        if let Some(reason) = evaluate_phase_skip(&phase.skip_when, file, &tracks, &file.path) {
            info!(
                path = %file.path.display(),
                phase = %phase.name,
                reason = %reason.message,
                "phase skipped"
            );
            return Ok(PhaseOutcome {
                name: phase.name,
                success: true,
                duration_seconds: 0.0,
                skip_reason: Some(reason),
                changes_made: 0,
                warnings: Vec::new(),
                message: None,
            });
        }

        // Conditional rules pre-gate the phase; their skip flags mutate the
        // effective policy for this phase only.
        let conditional = match &phase.rules {
            Some(rules) => {
                let duration = tracks
                    .iter()
                    .find(|t| t.track_type == TrackKind::Video)
                    .and_then(|t| t.duration_seconds);
                let ctx = ConditionContext {
                    tracks: &tracks,
                    container_format: file.container_format.as_deref(),
                    file_size_bytes: Some(file.size_bytes),
                    duration_seconds: duration,
                    plugin_metadata: Some(&file.plugin_metadata),
                    container_tags: None,
                };
                let conditional = evaluate_conditional_rules(rules, &file.path, &ctx)
                    .map_err(|e| match e {
                        PhaseError::RuleFail { rule, message, .. } => PhaseError::RuleFail {
                            phase: phase.name.to_string(),
                            rule,
                            message,
                        },
                        other => other,
                    })?;
                for trace in &conditional.evaluation_trace {
                    debug!(
                        phase = %phase.name,
                        rule = %trace.rule_name,
                        matched = trace.matched,
                        reason = %trace.reason,
                        "rule evaluated"
                    );
                }
                conditional
            }
            None => ConditionalResult::default(),
        };

        let mut outcome = match phase.name {
            PhaseName::Analyze => self.run_analyze(file, policy, &tracks).await?,
            PhaseName::Apply => {
                self.run_apply(file, policy, &tracks, &conditional, job_id, cancel)
                    .await?
            }
            PhaseName::Transcode => {
                self.run_transcode(file, phase, &tracks, &conditional, job_id, cancel, progress)
                    .await?
            }
            PhaseName::Synthesize => {
                self.run_synthesize(file, policy, phase, &tracks, job_id, cancel)
                    .await?
            }
            PhaseName::Move => self.run_move(file, phase).await?,
            PhaseName::Timestamp => self.run_timestamp(file, phase).await?,
        };
        outcome
            .warnings
            .extend(conditional.warnings.iter().cloned());
        Ok(outcome)
    }

    async fn run_analyze(
        &self,
        file: &FileRecord,
        policy: &PolicyDocument,
        tracks: &[TrackRecord],
    ) -> Result<PhaseOutcome> {
        let settings = policy.config.transcription.clone().unwrap_or_default();
        let config = MultiSampleConfig {
            max_samples: settings.max_samples,
            sample_duration: settings.sample_duration,
            confidence_threshold: settings.confidence_threshold,
            incumbent_bonus: settings.incumbent_bonus,
        };
        let file_hash = file.content_hash.clone().unwrap_or_default();

        let batch = analysis::analyze_file_tracks(
            &self.catalog,
            &file.path,
            &file_hash,
            tracks,
            self.extractor.as_ref(),
            self.transcriber.as_deref(),
            &config,
            false,
        )
        .await?;

        for track in tracks.iter().filter(|t| t.track_type == TrackKind::Audio) {
            let record = batch.results.get(&track.id);
            analysis::classify_and_persist_track(&self.catalog, track, &policy.config, record)
                .await?;
        }

        let mut warnings = Vec::new();
        if !batch.transcriber_available {
            warnings.push("transcription plugin unavailable; metadata-only analysis".into());
        }
        Ok(PhaseOutcome {
            name: PhaseName::Analyze,
            success: true,
            duration_seconds: 0.0,
            skip_reason: None,
            changes_made: batch.analyzed,
            warnings,
            message: Some(format!(
                "analyzed {} cached {} skipped {} errors {}",
                batch.analyzed, batch.cached, batch.skipped, batch.errors
            )),
        })
    }

    async fn run_apply(
        &self,
        file: &FileRecord,
        policy: &PolicyDocument,
        tracks: &[TrackRecord],
        conditional: &ConditionalResult,
        job_id: Option<&str>,
        cancel: Option<&CancelFlag>,
    ) -> Result<PhaseOutcome> {
        if let Some(bus) = &self.bus {
            bus.dispatch(&PluginEvent::PolicyBeforeEvaluate { file: file.clone() })
                .await;
        }

        // Rule-driven skip flags mutate the effective policy for this
        // phase only.
        let mut effective = policy.clone();
        if conditional.skip_flags.skip_track_filter {
            effective.config.track_filter = Default::default();
        }

        let file_hash = file.content_hash.clone().unwrap_or_default();
        let mut transcriptions: HashMap<i64, TranscriptionRecord> = HashMap::new();
        for record in self.catalog.transcriptions_for_file(file.id).await? {
            if record.file_hash == file_hash {
                transcriptions.insert(record.track_id, record);
            }
        }

        let signals = EvaluationSignals {
            transcription_results: Some(&transcriptions),
            plugin_metadata: Some(&file.plugin_metadata),
            container_format: file.container_format.as_deref(),
            ..EvaluationSignals::default()
        };

        let mut plan = evaluate(tracks, &effective, &signals)
            .map_err(|e| crate::error::CoreError::Internal(e.to_string()))?;
        append_rule_changes(&mut plan, conditional, tracks);

        if let Some(bus) = &self.bus {
            bus.dispatch(&PluginEvent::PolicyAfterEvaluate {
                file: file.clone(),
                plan: plan.clone(),
            })
            .await;
        }

        if plan.is_empty() {
            return Ok(PhaseOutcome {
                name: PhaseName::Apply,
                success: true,
                duration_seconds: 0.0,
                skip_reason: Some(SkipReason::noop("plan is empty")),
                changes_made: 0,
                warnings: plan.warnings,
                message: None,
            });
        }

        if let Some(bus) = &self.bus {
            bus.dispatch(&PluginEvent::PlanBeforeExecute {
                file: file.clone(),
                plan: plan.clone(),
            })
            .await;
        }

        let executed = self
            .execute_with_operation(file, &plan, tracks, job_id, "apply", cancel, None)
            .await?;

        if let Some(bus) = &self.bus {
            let event = if executed.success {
                PluginEvent::PlanAfterExecute {
                    file: file.clone(),
                    plan: plan.clone(),
                }
            } else {
                PluginEvent::PlanExecutionFailed {
                    file: file.clone(),
                    error: executed.message.clone(),
                }
            };
            bus.dispatch(&event).await;
        }

        if !executed.success {
            return Err(PhaseError::Failed {
                phase: PhaseName::Apply.to_string(),
                message: executed.message,
            }
            .into());
        }

        // Structural changes invalidate the cataloged layout; re-scan of
        // the file happens on the next scanner pass, but the moved/renamed
        // output path must land now.
        if let Some(output) = &executed.output_path
            && output != &file.path
        {
            self.catalog
                .update_file_path(file.id, &output.display().to_string())
                .await?;
        }

        Ok(PhaseOutcome {
            name: PhaseName::Apply,
            success: true,
            duration_seconds: 0.0,
            skip_reason: None,
            changes_made: plan.actions.len(),
            warnings: plan.warnings.clone(),
            message: Some(executed.message),
        })
    }

    async fn run_transcode(
        &self,
        file: &FileRecord,
        phase: &PhaseDefinition,
        tracks: &[TrackRecord],
        conditional: &ConditionalResult,
        job_id: Option<&str>,
        cancel: Option<&CancelFlag>,
        progress: Option<ProgressSink>,
    ) -> Result<PhaseOutcome> {
        let Some(transcode) = &phase.transcode else {
            return Ok(noop_outcome(PhaseName::Transcode, "no transcode configuration"));
        };

        let mut actions: Vec<PlannedAction> = Vec::new();

        if let Some(video) = &transcode.video
            && !conditional.skip_flags.skip_video_transcode
        {
            if let Some(skip_if) = &video.skip_if
                && let Some(reason) = transcode_skip_reason(skip_if, file, tracks)
            {
                return Ok(PhaseOutcome {
                    name: PhaseName::Transcode,
                    success: true,
                    duration_seconds: 0.0,
                    skip_reason: Some(reason),
                    changes_made: 0,
                    warnings: Vec::new(),
                    message: None,
                });
            }
            let quality = match (video.crf, &video.target_bitrate) {
                (Some(crf), _) => QualityMode::Crf { value: crf },
                (None, Some(bitrate)) => QualityMode::Bitrate {
                    bits_per_second: parse_bitrate(bitrate).unwrap_or(0),
                },
                (None, None) => QualityMode::Crf { value: 23 },
            };
            actions.push(PlannedAction::TranscodeVideo {
                target_codec: video.to.clone(),
                quality,
                preset: Some(video.preset.clone()),
                tune: video.tune.clone(),
                max_resolution: video.max_resolution.clone(),
                extra_args: video.ffmpeg_args.clone().unwrap_or_default(),
            });
        }

        if let Some(audio) = &transcode.audio
            && !conditional.skip_flags.skip_audio_transcode
        {
            actions.push(PlannedAction::TranscodeAudio {
                target_codec: audio.to.clone(),
                bitrate: Some(audio.bitrate.clone()),
                preserve_codecs: audio.preserve.clone(),
            });
        }

        if actions.is_empty() {
            return Ok(noop_outcome(
                PhaseName::Transcode,
                "transcode skipped by rules",
            ));
        }
        // An audio-only rewrite still needs the video stream mapped
        // through untouched.
        if !actions
            .iter()
            .any(|a| matches!(a, PlannedAction::TranscodeVideo { .. }))
        {
            actions.insert(
                0,
                PlannedAction::TranscodeVideo {
                    target_codec: "copy".to_string(),
                    quality: QualityMode::Crf { value: 0 },
                    preset: None,
                    tune: None,
                    max_resolution: None,
                    extra_args: Vec::new(),
                },
            );
        }

        let mut plan = Plan::empty(12);
        plan.actions = actions;
        plan.requires_remux = true;

        let changes = plan.actions.len();
        let executed = self
            .execute_with_operation(file, &plan, tracks, job_id, "transcode", cancel, progress)
            .await?;
        if !executed.success {
            return Err(PhaseError::Failed {
                phase: PhaseName::Transcode.to_string(),
                message: executed.message,
            }
            .into());
        }

        Ok(PhaseOutcome {
            name: PhaseName::Transcode,
            success: true,
            duration_seconds: 0.0,
            skip_reason: None,
            changes_made: changes,
            warnings: Vec::new(),
            message: Some(executed.message),
        })
    }

    async fn run_synthesize(
        &self,
        file: &FileRecord,
        policy: &PolicyDocument,
        phase: &PhaseDefinition,
        tracks: &[TrackRecord],
        job_id: Option<&str>,
        cancel: Option<&CancelFlag>,
    ) -> Result<PhaseOutcome> {
        if phase.synthesize.is_empty() {
            return Ok(noop_outcome(
                PhaseName::Synthesize,
                "no synthesis definitions",
            ));
        }

        let audio_tracks: Vec<&TrackRecord> = tracks
            .iter()
            .filter(|t| t.track_type == TrackKind::Audio)
            .collect();
        let mut actions = Vec::new();

        for definition in &phase.synthesize {
            // A matching track already in the container makes this
            // definition a no-op.
            if definition.skip_if_exists {
                let exists = audio_tracks.iter().any(|t| {
                    t.codec
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase() == definition.to.to_lowercase())
                        && t.channels == Some(i64::from(definition.channels))
                });
                if exists {
                    continue;
                }
            }

            let source = match &definition.from_language {
                Some(language) => audio_tracks.iter().find(|t| {
                    crate::language::languages_match(t.language.as_deref(), Some(language))
                }),
                None => {
                    let preference = &policy.config.audio_language_preference;
                    audio_tracks
                        .iter()
                        .find(|t| {
                            preference.iter().any(|p| {
                                crate::language::languages_match(
                                    t.language.as_deref(),
                                    Some(p),
                                )
                            })
                        })
                        .or_else(|| audio_tracks.first())
                }
            };
            let Some(source) = source else {
                continue;
            };

            actions.push(PlannedAction::SynthesizeAudio {
                source_track_index: source.track_index,
                target_codec: definition.to.clone(),
                target_channels: definition.channels,
                target_bitrate: definition.bitrate.clone(),
                filter_chain: definition.filters.clone(),
                language: source.language.clone(),
                title: definition.title.clone(),
            });
        }

        if actions.is_empty() {
            return Ok(noop_outcome(
                PhaseName::Synthesize,
                "all synthesis targets already present",
            ));
        }

        let mut plan = Plan::empty(12);
        plan.actions = actions;
        plan.requires_remux = true;

        let changes = plan.actions.len();
        let executed = self
            .execute_with_operation(file, &plan, tracks, job_id, "synthesize", cancel, None)
            .await?;
        if !executed.success {
            return Err(PhaseError::Failed {
                phase: PhaseName::Synthesize.to_string(),
                message: executed.message,
            }
            .into());
        }

        Ok(PhaseOutcome {
            name: PhaseName::Synthesize,
            success: true,
            duration_seconds: 0.0,
            skip_reason: None,
            changes_made: changes,
            warnings: Vec::new(),
            message: Some(format!(
                "synthesized {} track(s)",
                executed.tracks_created.unwrap_or(0)
            )),
        })
    }

    async fn run_move(
        &self,
        file: &FileRecord,
        phase: &PhaseDefinition,
    ) -> Result<PhaseOutcome> {
        let Some(config) = &phase.move_config else {
            return Ok(noop_outcome(PhaseName::Move, "no move configuration"));
        };

        let parsed = self.parser.parse(&file.path);
        let destination = crate::executor::render_destination(
            &config.destination,
            &parsed,
            &file.path,
            &config.fallback,
        );
        if destination == file.path {
            return Ok(noop_outcome(PhaseName::Move, "already at destination"));
        }

        let operation_id = self
            .catalog
            .begin_operation(file.id, None, "move", None)
            .await?;
        match crate::executor::move_file(&file.path, &destination).await {
            Ok(()) => {
                self.catalog
                    .update_file_path(file.id, &destination.display().to_string())
                    .await?;
                self.catalog
                    .finish_operation(
                        operation_id,
                        vpo_model::OperationStatus::Completed,
                        Some(&format!("{{\"destination\":\"{}\"}}", destination.display())),
                    )
                    .await?;
                Ok(PhaseOutcome {
                    name: PhaseName::Move,
                    success: true,
                    duration_seconds: 0.0,
                    skip_reason: None,
                    changes_made: 1,
                    warnings: Vec::new(),
                    message: Some(format!("moved to {}", destination.display())),
                })
            }
            Err(e) => {
                self.catalog
                    .finish_operation(
                        operation_id,
                        vpo_model::OperationStatus::Failed,
                        Some(&format!("{{\"error\":\"{e}\"}}")),
                    )
                    .await?;
                Err(PhaseError::Failed {
                    phase: PhaseName::Move.to_string(),
                    message: e.to_string(),
                }
                .into())
            }
        }
    }

    async fn run_timestamp(
        &self,
        file: &FileRecord,
        phase: &PhaseDefinition,
    ) -> Result<PhaseOutcome> {
        let Some(config) = &phase.file_timestamp else {
            return Ok(noop_outcome(PhaseName::Timestamp, "no timestamp configuration"));
        };

        let metadata_date = plugin_release_date(file);
        let applied = crate::executor::apply_timestamp(&file.path, config, metadata_date)?;

        Ok(PhaseOutcome {
            name: PhaseName::Timestamp,
            success: true,
            duration_seconds: 0.0,
            skip_reason: applied
                .is_none()
                .then(|| SkipReason::noop("timestamp preserved")),
            changes_made: usize::from(applied.is_some()),
            warnings: Vec::new(),
            message: applied.map(|d| format!("set mtime to {d}")),
        })
    }

    /// Executes a plan, bracketing it with an operation record.
    async fn execute_with_operation(
        &self,
        file: &FileRecord,
        plan: &Plan,
        tracks: &[TrackRecord],
        job_id: Option<&str>,
        operation_type: &str,
        cancel: Option<&CancelFlag>,
        progress: Option<ProgressSink>,
    ) -> Result<ExecutorResult> {
        let operation_id = self
            .catalog
            .begin_operation(file.id, job_id, operation_type, None)
            .await?;

        let callback: Option<ProgressCallback> = progress
            .map(|sink| Box::new(move |update| sink(update)) as ProgressCallback);
        let result = self
            .executor
            .execute_plan(
                plan,
                &file.path,
                tracks,
                file.container_format.as_deref(),
                cancel,
                callback,
            )
            .await;

        let status = if result.success {
            vpo_model::OperationStatus::Completed
        } else {
            vpo_model::OperationStatus::Failed
        };
        let details = serde_json::json!({
            "message": result.message,
            "size_before": result.size_before,
            "size_after": result.size_after,
        });
        self.catalog
            .finish_operation(operation_id, status, Some(&details.to_string()))
            .await?;
        Ok(result)
    }
}

fn noop_outcome(name: PhaseName, message: &str) -> PhaseOutcome {
    PhaseOutcome {
        name,
        success: true,
        duration_seconds: 0.0,
        skip_reason: Some(SkipReason::noop(message)),
        changes_made: 0,
        warnings: Vec::new(),
        message: None,
    }
}

/// Folds rule-driven flag/language/tag changes into the plan as extra
/// actions, skipping ones the plan already covers.
fn append_rule_changes(plan: &mut Plan, conditional: &ConditionalResult, tracks: &[TrackRecord]) {
    for change in &conditional.track_flag_changes {
        let covered = plan.actions.iter().any(|a| match a {
            PlannedAction::SetDefault { track_index, .. }
            | PlannedAction::SetForced { track_index, .. } => *track_index == change.track_index,
            _ => false,
        });
        if covered {
            continue;
        }
        let current = tracks.iter().find(|t| t.track_index == change.track_index);
        let action = match change.flag {
            crate::policy::actions::TrackFlag::Default => {
                if current.is_some_and(|t| t.is_default == change.value) {
                    continue;
                }
                PlannedAction::SetDefault {
                    track_index: change.track_index,
                    value: change.value,
                }
            }
            crate::policy::actions::TrackFlag::Forced => {
                if current.is_some_and(|t| t.is_forced == change.value) {
                    continue;
                }
                PlannedAction::SetForced {
                    track_index: change.track_index,
                    value: change.value,
                }
            }
        };
        plan.actions.push(action);
    }
    for change in &conditional.track_language_changes {
        let current = tracks.iter().find(|t| t.track_index == change.track_index);
        if current.is_some_and(|t| {
            crate::language::languages_match(t.language.as_deref(), Some(&change.language))
        }) {
            continue;
        }
        plan.actions.push(PlannedAction::SetLanguage {
            track_index: change.track_index,
            language: change.language.clone(),
        });
    }
    for change in &conditional.container_metadata_changes {
        plan.actions.push(PlannedAction::SetContainerTag {
            key: change.key.clone(),
            value: change.value.clone(),
        });
    }
}

/// All configured `skip_if` leaves must hold for the transcode skip to
/// fire; the reason names every leaf that matched.
fn transcode_skip_reason(
    skip_if: &TranscodeSkipIf,
    file: &FileRecord,
    tracks: &[TrackRecord],
) -> Option<SkipReason> {
    let video = tracks.iter().find(|t| t.track_type == TrackKind::Video)?;
    let mut matched: Vec<String> = Vec::new();

    if let Some(codecs) = &skip_if.codec_matches {
        let codec = video.codec.as_deref()?;
        let aliases = vpo_model::codec_aliases(codec);
        if codecs.iter().any(|c| aliases.contains(&c.to_lowercase())) {
            matched.push("codec_matches".to_string());
        } else {
            return None;
        }
    }
    if let Some(resolution) = &skip_if.resolution_within {
        let height = video.height?;
        let threshold = vpo_model::resolution_label_to_height(resolution)?;
        if height <= threshold {
            matched.push("resolution_within".to_string());
        } else {
            return None;
        }
    }
    if let Some(limit) = &skip_if.bitrate_under {
        let threshold = parse_bitrate(limit)?;
        let duration = video.duration_seconds.filter(|d| *d > 0.0)?;
        let actual_bps = (file.size_bytes.max(0) as f64 * 8.0 / duration) as u64;
        if actual_bps < threshold {
            matched.push("bitrate_under".to_string());
        } else {
            return None;
        }
    }

    if matched.is_empty() {
        return None;
    }
    Some(SkipReason {
        reason_type: SkipReasonType::Condition,
        message: format!("transcode skip_if matched: {}", matched.join(" AND ")),
        condition_name: Some(matched.join("+")),
        condition_value: video.codec.clone(),
    })
}

/// Picks a release/air date out of plugin metadata for the timestamp
/// phase.
fn plugin_release_date(file: &FileRecord) -> Option<DateTime<Utc>> {
    for blob in file.plugin_metadata.values() {
        for key in ["release_date", "air_date", "digital_release"] {
            if let Some(value) = blob.get(key).and_then(|v| v.as_str()) {
                if let Ok(date) = value.parse::<DateTime<Utc>>() {
                    return Some(date);
                }
                if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                    return Some(DateTime::from_naive_utc_and_offset(
                        date.and_hms_opt(12, 0, 0)?,
                        Utc,
                    ));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn file_with(size: i64, duration: f64) -> (FileRecord, Vec<TrackRecord>) {
        let file = FileRecord {
            id: 1,
            path: PathBuf::from("/x/movie.mkv"),
            filename: "movie.mkv".into(),
            directory: "/x".into(),
            extension: "mkv".into(),
            size_bytes: size,
            modified_at: Utc::now(),
            content_hash: None,
            container_format: Some("matroska".into()),
            scanned_at: None,
            scan_status: vpo_model::ScanStatus::Ok,
            scan_error: None,
            plugin_metadata: Default::default(),
        };
        let video = TrackRecord {
            id: 1,
            file_id: 1,
            track_index: 0,
            track_type: TrackKind::Video,
            codec: Some("hevc".into()),
            language: None,
            title: None,
            is_default: true,
            is_forced: false,
            channels: None,
            channel_layout: None,
            width: Some(1920),
            height: Some(1080),
            frame_rate: None,
            color_transfer: None,
            color_primaries: None,
            color_space: None,
            color_range: None,
            duration_seconds: Some(duration),
        };
        (file, vec![video])
    }

    /// An HEVC 1080p file at 6 Mbps satisfies all three leaves, so the
    /// transcode is skipped.
    #[test]
    fn transcode_skip_if_requires_all_leaves() {
        // 6 Mbps over an hour.
        let size = (6_000_000.0 / 8.0 * 3600.0) as i64;
        let (file, tracks) = file_with(size, 3600.0);
        let skip_if = TranscodeSkipIf {
            codec_matches: Some(vec!["hevc".into(), "h265".into()]),
            resolution_within: Some("1080p".into()),
            bitrate_under: Some("10M".into()),
        };
        let reason = transcode_skip_reason(&skip_if, &file, &tracks).expect("should skip");
        assert_eq!(reason.reason_type, SkipReasonType::Condition);
        assert!(reason.message.contains("codec_matches"));
        assert!(reason.message.contains("resolution_within"));
        assert!(reason.message.contains("bitrate_under"));

        // Bitrate over the limit breaks the conjunction.
        let big = (20_000_000.0 / 8.0 * 3600.0) as i64;
        let (file, tracks) = file_with(big, 3600.0);
        assert!(transcode_skip_reason(&skip_if, &file, &tracks).is_none());
    }

    #[test]
    fn plugin_release_date_parses_plain_dates() {
        let (mut file, _) = file_with(1, 1.0);
        file.plugin_metadata.insert(
            "radarr".into(),
            serde_json::json!({"release_date": "2019-07-04"}),
        );
        let date = plugin_release_date(&file).unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2019-07-04");
    }
}
