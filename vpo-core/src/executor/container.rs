//! Container mux/edit tool adapter (mkvpropedit + mkvmerge).

use std::path::{Path, PathBuf};
use std::time::Duration;

use vpo_model::TrackKind;

use crate::error::Result;
use crate::executor::process::{run_tool, ToolInvocation};

/// Timeout for in-place metadata edits.
const METADATA_EDIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for full container rewrites.
const REMUX_TIMEOUT: Duration = Duration::from_secs(1800);

/// One track-scoped property edit.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEdit {
    Default { track_index: i64, value: bool },
    Forced { track_index: i64, value: bool },
    Language { track_index: i64, language: String },
    Title { track_index: i64, title: String },
}

impl TrackEdit {
    fn track_index(&self) -> i64 {
        match self {
            TrackEdit::Default { track_index, .. }
            | TrackEdit::Forced { track_index, .. }
            | TrackEdit::Language { track_index, .. }
            | TrackEdit::Title { track_index, .. } => *track_index,
        }
    }
}

/// Adapter over the MKV container tools. Metadata edits go through
/// mkvpropedit (no rewrite); structural changes go through mkvmerge into a
/// new file.
#[derive(Debug, Clone)]
pub struct ContainerTool {
    mkvpropedit: PathBuf,
    mkvmerge: PathBuf,
}

impl ContainerTool {
    pub fn new(mkvpropedit: PathBuf, mkvmerge: PathBuf) -> Self {
        Self {
            mkvpropedit,
            mkvmerge,
        }
    }

    /// Builds the mkvpropedit argument list for a batch of edits.
    /// Track selectors are 1-based track numbers in container order.
    pub fn metadata_edit_args(
        path: &Path,
        edits: &[TrackEdit],
        container_tags: &[(String, String)],
    ) -> Vec<String> {
        let mut args = vec![path.display().to_string()];
        for edit in edits {
            args.push("--edit".to_string());
            args.push(format!("track:{}", edit.track_index() + 1));
            args.push("--set".to_string());
            args.push(match edit {
                TrackEdit::Default { value, .. } => {
                    format!("flag-default={}", i32::from(*value))
                }
                TrackEdit::Forced { value, .. } => {
                    format!("flag-forced={}", i32::from(*value))
                }
                TrackEdit::Language { language, .. } => format!("language={language}"),
                TrackEdit::Title { title, .. } => format!("name={title}"),
            });
        }
        for (key, value) in container_tags {
            args.push("--edit".to_string());
            args.push("info".to_string());
            args.push("--set".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }

    /// Applies metadata edits in place. MKV-family containers only.
    pub async fn edit_metadata(
        &self,
        path: &Path,
        edits: &[TrackEdit],
        container_tags: &[(String, String)],
    ) -> Result<()> {
        if edits.is_empty() && container_tags.is_empty() {
            return Ok(());
        }
        let invocation = ToolInvocation {
            program: self.mkvpropedit.clone(),
            args: Self::metadata_edit_args(path, edits, container_tags),
            timeout: METADATA_EDIT_TIMEOUT,
        };
        run_tool(&invocation).await?;
        Ok(())
    }

    /// Builds the mkvmerge argument list for a structural rewrite:
    /// excluded tracks per type, then the desired track order.
    pub fn remux_args(
        input: &Path,
        output: &Path,
        order: &[i64],
        removals: &[(i64, TrackKind)],
    ) -> Vec<String> {
        let mut args = vec!["-o".to_string(), output.display().to_string()];

        for (flag, kind) in [
            ("--video-tracks", TrackKind::Video),
            ("--audio-tracks", TrackKind::Audio),
            ("--subtitle-tracks", TrackKind::Subtitle),
        ] {
            let excluded: Vec<String> = removals
                .iter()
                .filter(|(_, k)| *k == kind)
                .map(|(index, _)| index.to_string())
                .collect();
            if !excluded.is_empty() {
                args.push(flag.to_string());
                args.push(format!("!{}", excluded.join(",")));
            }
        }

        args.push(input.display().to_string());

        if !order.is_empty() {
            args.push("--track-order".to_string());
            let order_spec: Vec<String> = order.iter().map(|index| format!("0:{index}")).collect();
            args.push(order_spec.join(","));
        }
        args
    }

    /// Rewrites the container into `output`, dropping removed tracks and
    /// applying the new track order.
    pub async fn remux(
        &self,
        input: &Path,
        output: &Path,
        order: &[i64],
        removals: &[(i64, TrackKind)],
    ) -> Result<()> {
        let invocation = ToolInvocation {
            program: self.mkvmerge.clone(),
            args: Self::remux_args(input, output, order, removals),
            timeout: REMUX_TIMEOUT,
        };
        run_tool(&invocation).await?;
        Ok(())
    }

    /// Merges an elementary audio stream into the container, preserving
    /// every existing track.
    pub async fn merge_audio(
        &self,
        input: &Path,
        audio_stream: &Path,
        language: Option<&str>,
        title: Option<&str>,
        output: &Path,
    ) -> Result<()> {
        let mut args = vec![
            "-o".to_string(),
            output.display().to_string(),
            input.display().to_string(),
        ];
        if let Some(language) = language {
            args.push("--language".to_string());
            args.push(format!("0:{language}"));
        }
        if let Some(title) = title {
            args.push("--track-name".to_string());
            args.push(format!("0:{title}"));
        }
        args.push(audio_stream.display().to_string());

        let invocation = ToolInvocation {
            program: self.mkvmerge.clone(),
            args,
            timeout: REMUX_TIMEOUT,
        };
        run_tool(&invocation).await?;
        Ok(())
    }
}

/// Whether a container format supports in-place metadata edits.
pub fn supports_in_place_edit(container_format: Option<&str>) -> bool {
    let Some(format) = container_format else {
        return false;
    };
    format
        .to_lowercase()
        .split(',')
        .any(|part| matches!(part.trim(), "matroska" | "mkv" | "webm"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_edit_args_use_one_based_track_selectors() {
        let args = ContainerTool::metadata_edit_args(
            Path::new("/x/movie.mkv"),
            &[
                TrackEdit::Default {
                    track_index: 2,
                    value: true,
                },
                TrackEdit::Language {
                    track_index: 1,
                    language: "eng".to_string(),
                },
            ],
            &[("title".to_string(), "Movie".to_string())],
        );
        assert_eq!(
            args,
            vec![
                "/x/movie.mkv",
                "--edit",
                "track:3",
                "--set",
                "flag-default=1",
                "--edit",
                "track:2",
                "--set",
                "language=eng",
                "--edit",
                "info",
                "--set",
                "title=Movie",
            ]
        );
    }

    #[test]
    fn remux_args_exclude_removed_tracks_by_type() {
        let args = ContainerTool::remux_args(
            Path::new("/x/in.mkv"),
            Path::new("/x/out.mkv"),
            &[0, 2, 1],
            &[(3, TrackKind::Audio), (4, TrackKind::Subtitle)],
        );
        assert_eq!(
            args,
            vec![
                "-o",
                "/x/out.mkv",
                "--audio-tracks",
                "!3",
                "--subtitle-tracks",
                "!4",
                "/x/in.mkv",
                "--track-order",
                "0:0,0:2,0:1",
            ]
        );
    }

    #[test]
    fn in_place_edit_support_is_mkv_family_only() {
        assert!(supports_in_place_edit(Some("matroska,webm")));
        assert!(supports_in_place_edit(Some("mkv")));
        assert!(!supports_in_place_edit(Some("mov,mp4,m4a")));
        assert!(!supports_in_place_edit(None));
    }
}
