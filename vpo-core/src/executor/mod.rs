//! Plan execution.
//!
//! Every plan runs inside a file-scoped critical section: advisory lock,
//! disk-space guard, backup, dispatch to the right operation executor,
//! atomic replace, and restore-on-failure. Executors translate typed
//! errors into a flat [`ExecutorResult`]; only the lock and guard checks
//! refuse to start at all.

mod backup;
mod container;
mod disk;
mod lock;
mod process;
mod progress;
mod relocate;
mod timestamp;
mod transcode;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use vpo_model::{Plan, PlannedAction, TrackDisposition, TrackKind, TrackRecord};

use crate::error::{CoreError, Result};

pub use backup::{
    backup_path_for, cleanup_backup, create_backup, has_backup, restore_from_backup,
    safe_restore_from_backup, BACKUP_SUFFIX,
};
pub use container::{supports_in_place_edit, ContainerTool, TrackEdit};
pub use disk::{check_disk_space, check_min_free_percent, space_multiplier};
pub use lock::{lock_path_for, FileLock, LOCK_SUFFIX};
pub use process::{run_tool, run_tool_streaming, CancelFlag, ToolInvocation};
pub use progress::{parse_progress_line, FfmpegProgress};
pub use relocate::{move_file, render_destination};
pub use timestamp::apply_timestamp;
pub use transcode::{encoder_for_codec, ProgressCallback, ProgressSink, TranscodeTool};

/// Executor tuning knobs, sourced from configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Minimum percentage of the filesystem that must stay free after an
    /// operation; zero disables the guard.
    pub min_free_disk_percent: f64,
    /// Keep the `.vpo-backup` sibling after success.
    pub keep_backup: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_free_disk_percent: 5.0,
            keep_backup: false,
        }
    }
}

/// Flat result of one executor invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutorResult {
    pub success: bool,
    pub message: String,
    pub output_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub tracks_created: Option<u32>,
    pub size_before: Option<u64>,
    pub size_after: Option<u64>,
    pub encoder_type: Option<String>,
    pub encoding_fps: Option<f64>,
}

impl ExecutorResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Plan actions split by the executor that handles them.
#[derive(Debug, Default)]
struct SplitActions<'a> {
    track_edits: Vec<TrackEdit>,
    container_tags: Vec<(String, String)>,
    reorder: Option<&'a [i64]>,
    synthesize: Vec<&'a PlannedAction>,
    transcode_video: Option<&'a PlannedAction>,
    transcode_audio: Option<&'a PlannedAction>,
    remux: Option<&'a PlannedAction>,
}

fn split_actions(plan: &Plan) -> SplitActions<'_> {
    let mut split = SplitActions::default();
    for action in &plan.actions {
        match action {
            PlannedAction::SetDefault { track_index, value } => {
                split.track_edits.push(TrackEdit::Default {
                    track_index: *track_index,
                    value: *value,
                });
            }
            PlannedAction::SetForced { track_index, value } => {
                split.track_edits.push(TrackEdit::Forced {
                    track_index: *track_index,
                    value: *value,
                });
            }
            PlannedAction::SetLanguage {
                track_index,
                language,
            } => {
                split.track_edits.push(TrackEdit::Language {
                    track_index: *track_index,
                    language: language.clone(),
                });
            }
            PlannedAction::SetTitle { track_index, title } => {
                split.track_edits.push(TrackEdit::Title {
                    track_index: *track_index,
                    title: title.clone(),
                });
            }
            PlannedAction::SetContainerTag { key, value } => {
                split.container_tags.push((key.clone(), value.clone()));
            }
            PlannedAction::Reorder { order } => split.reorder = Some(order),
            PlannedAction::SynthesizeAudio { .. } => split.synthesize.push(action),
            PlannedAction::TranscodeVideo { .. } => split.transcode_video = Some(action),
            PlannedAction::TranscodeAudio { .. } => split.transcode_audio = Some(action),
            PlannedAction::Remux { .. } => split.remux = Some(action),
            PlannedAction::RemoveTrack { .. }
            | PlannedAction::AddTrack { .. }
            | PlannedAction::Move { .. }
            | PlannedAction::SetFileTimestamp { .. } => {}
        }
    }
    split
}

/// Dispatches plan actions to the operation executors.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    container: ContainerTool,
    transcoder: TranscodeTool,
    config: ExecutorConfig,
}

impl PlanExecutor {
    pub fn new(
        container: ContainerTool,
        transcoder: TranscodeTool,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            container,
            transcoder,
            config,
        }
    }

    /// Executes a plan against a file. The returned result is always
    /// populated; typed errors become `success: false` with the original
    /// message, and any taken backup is restored before returning a
    /// failure.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        file_path: &Path,
        tracks: &[TrackRecord],
        container_format: Option<&str>,
        cancel: Option<&CancelFlag>,
        progress: Option<ProgressCallback>,
    ) -> ExecutorResult {
        if plan.is_empty() {
            return ExecutorResult {
                success: true,
                message: "no changes needed".to_string(),
                ..ExecutorResult::default()
            };
        }

        let size_before = std::fs::metadata(file_path).map(|m| m.len()).ok();
        let structural = plan.has_structural_change();

        // Non-blocking exclusive lock; a held lock fails immediately.
        let lock = match FileLock::acquire(file_path) {
            Ok(lock) => lock,
            Err(e) => return ExecutorResult::failure(e.to_string()),
        };

        // Disk guard before any destructive work; the backup is not yet
        // created, so a refusal leaves the file untouched.
        let op_type = if !structural {
            "metadata_edit"
        } else if plan
            .actions
            .iter()
            .any(|a| matches!(a, PlannedAction::TranscodeVideo { target_codec, .. } if target_codec == "hevc"))
        {
            "transcode_hevc"
        } else if self.needs_transcode(plan) {
            "transcode"
        } else {
            "remux"
        };
        let multiplier = space_multiplier(op_type);
        if let Err(e) = check_disk_space(file_path, multiplier) {
            return ExecutorResult::failure(e.to_string());
        }
        let required = size_before
            .map(|s| (s as f64 * multiplier) as u64)
            .unwrap_or(0);
        let parent = file_path.parent().unwrap_or(Path::new("."));
        if let Some(message) =
            check_min_free_percent(parent, required, self.config.min_free_disk_percent)
        {
            return ExecutorResult::failure(message);
        }

        let backup = match create_backup(file_path) {
            Ok(backup) => backup,
            Err(e) => return ExecutorResult::failure(format!("backup failed: {e}")),
        };

        let outcome = self
            .dispatch(plan, file_path, tracks, container_format, cancel, progress)
            .await;
        drop(lock);

        match outcome {
            Ok((output_path, tracks_created, encoder_type)) => {
                if self.config.keep_backup {
                    info!(backup = %backup.display(), "keeping backup");
                } else {
                    cleanup_backup(&backup);
                }
                let size_after = std::fs::metadata(&output_path).map(|m| m.len()).ok();
                ExecutorResult {
                    success: true,
                    message: format!("applied {} action(s)", plan.actions.len()),
                    output_path: Some(output_path),
                    backup_path: self.config.keep_backup.then_some(backup),
                    tracks_created,
                    size_before,
                    size_after,
                    encoder_type,
                    encoding_fps: None,
                }
            }
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "plan execution failed, restoring backup");
                safe_restore_from_backup(&backup, file_path);
                ExecutorResult::failure(e.to_string())
            }
        }
    }

    fn needs_transcode(&self, plan: &Plan) -> bool {
        plan.actions.iter().any(|a| {
            matches!(
                a,
                PlannedAction::TranscodeVideo { .. } | PlannedAction::TranscodeAudio { .. }
            )
        })
    }

    /// Runs the actual tool work. Returns `(output_path, tracks_created,
    /// encoder_type)`.
    async fn dispatch(
        &self,
        plan: &Plan,
        file_path: &Path,
        tracks: &[TrackRecord],
        container_format: Option<&str>,
        cancel: Option<&CancelFlag>,
        progress: Option<ProgressCallback>,
    ) -> Result<(PathBuf, Option<u32>, Option<String>)> {
        let split = split_actions(plan);

        // Pure metadata edits apply in place on MKV-family containers.
        if !plan.has_structural_change() {
            if !supports_in_place_edit(container_format) {
                return Err(CoreError::Tool(format!(
                    "container '{}' does not support in-place metadata edits; convert to MKV first",
                    container_format.unwrap_or("unknown")
                )));
            }
            self.container
                .edit_metadata(file_path, &split.track_edits, &split.container_tags)
                .await?;
            return Ok((file_path.to_path_buf(), None, None));
        }

        if let Some(video) = split.transcode_video {
            return self
                .run_transcode(file_path, tracks, video, split.transcode_audio, cancel, progress)
                .await;
        }

        if !split.synthesize.is_empty() {
            return self.run_synthesis(file_path, &split).await;
        }

        self.run_remux(plan, file_path, tracks, &split).await
    }

    async fn run_transcode(
        &self,
        file_path: &Path,
        tracks: &[TrackRecord],
        video: &PlannedAction,
        audio: Option<&PlannedAction>,
        cancel: Option<&CancelFlag>,
        progress: Option<ProgressCallback>,
    ) -> Result<(PathBuf, Option<u32>, Option<String>)> {
        let temp = temp_sibling(file_path, file_path.extension().and_then(|e| e.to_str()));
        let duration = tracks
            .iter()
            .find(|t| t.track_type == TrackKind::Video)
            .and_then(|t| t.duration_seconds)
            .unwrap_or(0.0);
        let audio_codecs: Vec<(i64, String)> = tracks
            .iter()
            .filter(|t| t.track_type == TrackKind::Audio)
            .enumerate()
            .filter_map(|(audio_index, t)| {
                t.codec.as_ref().map(|c| (audio_index as i64, c.clone()))
            })
            .collect();

        let encoder = match video {
            PlannedAction::TranscodeVideo { target_codec, .. } => {
                Some(encoder_for_codec(target_codec).to_string())
            }
            _ => None,
        };

        let result = self
            .transcoder
            .transcode(
                file_path,
                &temp,
                video,
                audio,
                &audio_codecs,
                duration,
                cancel,
                progress,
            )
            .await;
        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }

        atomic_replace(&temp, file_path)?;
        Ok((file_path.to_path_buf(), None, encoder))
    }

    async fn run_synthesis(
        &self,
        file_path: &Path,
        split: &SplitActions<'_>,
    ) -> Result<(PathBuf, Option<u32>, Option<String>)> {
        let mut created = 0u32;
        let mut current = file_path.to_path_buf();

        for action in &split.synthesize {
            let PlannedAction::SynthesizeAudio {
                source_track_index,
                target_codec,
                target_channels,
                target_bitrate,
                filter_chain,
                language,
                title,
            } = action
            else {
                continue;
            };

            let elementary = temp_sibling(file_path, Some("mka"));
            self.transcoder
                .extract_synthesized_audio(
                    &current,
                    *source_track_index,
                    target_codec,
                    *target_channels,
                    target_bitrate.as_deref(),
                    filter_chain,
                    &elementary,
                )
                .await?;

            let merged = temp_sibling(file_path, file_path.extension().and_then(|e| e.to_str()));
            let merge_result = self
                .container
                .merge_audio(
                    &current,
                    &elementary,
                    language.as_deref(),
                    title.as_deref(),
                    &merged,
                )
                .await;
            let _ = std::fs::remove_file(&elementary);
            merge_result?;

            atomic_replace(&merged, file_path)?;
            current = file_path.to_path_buf();
            created += 1;
        }

        Ok((file_path.to_path_buf(), Some(created), None))
    }

    async fn run_remux(
        &self,
        plan: &Plan,
        file_path: &Path,
        tracks: &[TrackRecord],
        split: &SplitActions<'_>,
    ) -> Result<(PathBuf, Option<u32>, Option<String>)> {
        let removals: Vec<(i64, TrackKind)> = plan
            .removals()
            .filter_map(|d| {
                let index = d.track_index();
                tracks
                    .iter()
                    .find(|t| t.track_index == index)
                    .map(|t| (index, t.track_type))
            })
            .collect();
        let order = split.reorder.map(<[i64]>::to_vec).unwrap_or_default();

        // Container conversion goes through the transcode tool's
        // stream-copy path; MKV-internal rewrites use the mux tool.
        if let Some(PlannedAction::Remux {
            target_container,
            container_change,
        }) = split.remux
        {
            let output = file_path.with_extension(target_container);
            let temp = temp_sibling(&output, Some(target_container));
            let removed: Vec<i64> = removals.iter().map(|(index, _)| *index).collect();
            let track_transcodes: Vec<(i64, String)> = container_change
                .as_ref()
                .map(|change| {
                    change
                        .track_plans
                        .iter()
                        .map(|p| (p.track_index, p.target_codec.clone()))
                        .collect()
                })
                .unwrap_or_default();
            let faststart = matches!(target_container.as_str(), "mp4" | "m4v" | "mov");

            let result = self
                .transcoder
                .remux_convert(file_path, &temp, &removed, &track_transcodes, faststart)
                .await;
            if let Err(e) = result {
                let _ = std::fs::remove_file(&temp);
                return Err(e);
            }

            fsync_file(&temp)?;
            std::fs::rename(&temp, &output)?;
            if output != file_path {
                std::fs::remove_file(file_path)?;
            }
            return Ok((output, None, None));
        }

        let temp = temp_sibling(file_path, file_path.extension().and_then(|e| e.to_str()));
        let result = self
            .container
            .remux(file_path, &temp, &order, &removals)
            .await;
        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }

        // Metadata edits land on the rewritten file before it replaces the
        // original; indices refer to the post-remux layout only when no
        // tracks moved, so flag edits are re-targeted through the order.
        if !split.track_edits.is_empty() || !split.container_tags.is_empty() {
            let remapped = remap_edits(&split.track_edits, &order, &removals);
            self.container
                .edit_metadata(&temp, &remapped, &split.container_tags)
                .await?;
        }

        atomic_replace(&temp, file_path)?;
        Ok((file_path.to_path_buf(), None, None))
    }
}

/// Re-targets track edits from original indices to post-remux positions.
fn remap_edits(
    edits: &[TrackEdit],
    order: &[i64],
    removals: &[(i64, TrackKind)],
) -> Vec<TrackEdit> {
    if order.is_empty() && removals.is_empty() {
        return edits.to_vec();
    }
    let position_of = |original: i64| -> Option<i64> {
        if order.is_empty() {
            Some(original)
        } else {
            order.iter().position(|i| *i == original).map(|p| p as i64)
        }
    };
    edits
        .iter()
        .filter_map(|edit| {
            let remapped = match edit {
                TrackEdit::Default { track_index, value } => TrackEdit::Default {
                    track_index: position_of(*track_index)?,
                    value: *value,
                },
                TrackEdit::Forced { track_index, value } => TrackEdit::Forced {
                    track_index: position_of(*track_index)?,
                    value: *value,
                },
                TrackEdit::Language {
                    track_index,
                    language,
                } => TrackEdit::Language {
                    track_index: position_of(*track_index)?,
                    language: language.clone(),
                },
                TrackEdit::Title { track_index, title } => TrackEdit::Title {
                    track_index: position_of(*track_index)?,
                    title: title.clone(),
                },
            };
            Some(remapped)
        })
        .collect()
}

/// Temp sibling next to the destination so the final rename stays on one
/// filesystem.
fn temp_sibling(path: &Path, extension: Option<&str>) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let suffix = extension.unwrap_or("tmp");
    let name = format!(".{stem}.vpo-tmp.{suffix}");
    path.with_file_name(name)
}

fn fsync_file(path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)?;
    file.sync_all()?;
    Ok(())
}

/// fsync + rename: the final step of every structural rewrite.
fn atomic_replace(temp: &Path, target: &Path) -> Result<()> {
    fsync_file(temp)?;
    std::fs::rename(temp, target)?;
    Ok(())
}

/// Dispositions of removed tracks paired with their kinds, used by tests
/// and the workflow's summaries.
pub fn removed_with_kinds<'a>(
    plan: &'a Plan,
    tracks: &'a [TrackRecord],
) -> Vec<(&'a TrackDisposition, TrackKind)> {
    plan.removals()
        .filter_map(|d| {
            tracks
                .iter()
                .find(|t| t.track_index == d.track_index())
                .map(|t| (d, t.track_type))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_sibling_stays_in_directory() {
        let temp = temp_sibling(Path::new("/media/movie.mkv"), Some("mkv"));
        assert_eq!(temp.parent(), Some(Path::new("/media")));
        assert!(temp.file_name().unwrap().to_str().unwrap().contains("vpo-tmp"));
    }

    #[test]
    fn remap_edits_follows_reorder() {
        let edits = vec![TrackEdit::Default {
            track_index: 2,
            value: true,
        }];
        let remapped = remap_edits(&edits, &[0, 2, 1], &[]);
        assert_eq!(
            remapped,
            vec![TrackEdit::Default {
                track_index: 1,
                value: true
            }]
        );
    }

    #[test]
    fn remap_without_structural_changes_is_identity() {
        let edits = vec![TrackEdit::Forced {
            track_index: 3,
            value: false,
        }];
        assert_eq!(remap_edits(&edits, &[], &[]), edits);
    }
}
