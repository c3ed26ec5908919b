//! Transcode tool adapter and executor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use vpo_model::{resolution_label_to_height, PlannedAction, QualityMode};

use crate::error::{CoreError, Result};
use crate::executor::process::{run_tool_streaming, CancelFlag, ToolInvocation};
use crate::executor::progress::{parse_progress_line, FfmpegProgress};

/// Timeout for full transcode runs.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Callback invoked with each parsed progress update.
pub type ProgressCallback = Box<dyn FnMut(FfmpegProgress) + Send>;

/// Shared, clonable progress sink; the worker hands one to the processor
/// so tool progress lands in the job row.
pub type ProgressSink = std::sync::Arc<dyn Fn(FfmpegProgress) + Send + Sync>;

/// Maps a policy codec token onto the tool's encoder name.
pub fn encoder_for_codec(codec: &str) -> &'static str {
    match codec.to_lowercase().as_str() {
        "hevc" | "h265" => "libx265",
        "h264" => "libx264",
        "av1" => "libsvtav1",
        "vp9" => "libvpx-vp9",
        "aac" => "aac",
        "ac3" => "ac3",
        "eac3" => "eac3",
        "opus" => "libopus",
        "flac" => "flac",
        "mp3" => "libmp3lame",
        _ => "copy",
    }
}

/// ffmpeg-backed transcode executor.
#[derive(Debug, Clone)]
pub struct TranscodeTool {
    ffmpeg: PathBuf,
}

impl TranscodeTool {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    /// Builds the full argument list for a video (and optional audio)
    /// transcode into `output`.
    pub fn transcode_args(
        input: &Path,
        output: &Path,
        video: &PlannedAction,
        audio: Option<&PlannedAction>,
        audio_codecs: &[(i64, String)],
    ) -> Result<Vec<String>> {
        let PlannedAction::TranscodeVideo {
            target_codec,
            quality,
            preset,
            tune,
            max_resolution,
            extra_args,
        } = video
        else {
            return Err(CoreError::Internal(
                "transcode executor handed a non-transcode action".to_string(),
            ));
        };

        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-c:v".to_string(),
            encoder_for_codec(target_codec).to_string(),
        ];

        match quality {
            QualityMode::Crf { value } => {
                args.push("-crf".to_string());
                args.push(value.to_string());
            }
            QualityMode::Bitrate { bits_per_second } => {
                args.push("-b:v".to_string());
                args.push(bits_per_second.to_string());
            }
        }
        if let Some(preset) = preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }
        if let Some(tune) = tune {
            args.push("-tune".to_string());
            args.push(tune.clone());
        }
        if let Some(resolution) = max_resolution
            && let Some(height) = resolution_label_to_height(resolution)
        {
            // Never upscale; -2 keeps the width divisible by two.
            args.push("-vf".to_string());
            args.push(format!("scale=-2:'min({height},ih)'"));
        }

        match audio {
            Some(PlannedAction::TranscodeAudio {
                target_codec,
                bitrate,
                preserve_codecs,
            }) => {
                for (stream_index, codec) in audio_codecs {
                    let preserved = preserve_codecs
                        .iter()
                        .any(|p| p.to_lowercase() == codec.to_lowercase());
                    args.push(format!("-c:a:{stream_index}"));
                    if preserved {
                        args.push("copy".to_string());
                    } else {
                        args.push(encoder_for_codec(target_codec).to_string());
                        if let Some(bitrate) = bitrate {
                            args.push(format!("-b:a:{stream_index}"));
                            args.push(bitrate.clone());
                        }
                    }
                }
            }
            _ => {
                args.push("-c:a".to_string());
                args.push("copy".to_string());
            }
        }
        args.push("-c:s".to_string());
        args.push("copy".to_string());

        args.extend(extra_args.iter().cloned());
        args.push(output.display().to_string());
        Ok(args)
    }

    /// Runs a transcode, delivering progress updates and honoring the
    /// cancel flag between stderr chunks.
    pub async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        video: &PlannedAction,
        audio: Option<&PlannedAction>,
        audio_codecs: &[(i64, String)],
        input_duration: f64,
        cancel: Option<&CancelFlag>,
        mut progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let args = Self::transcode_args(input, output, video, audio, audio_codecs)?;
        let encoder = match video {
            PlannedAction::TranscodeVideo { target_codec, .. } => {
                encoder_for_codec(target_codec).to_string()
            }
            _ => "copy".to_string(),
        };
        info!(input = %input.display(), encoder, "starting transcode");

        let invocation = ToolInvocation {
            program: self.ffmpeg.clone(),
            args,
            timeout: TRANSCODE_TIMEOUT,
        };
        run_tool_streaming(&invocation, cancel, |line| {
            if let Some(update) = parse_progress_line(line, input_duration, &encoder)
                && let Some(callback) = progress.as_mut()
            {
                callback(update);
            }
        })
        .await?;
        Ok(())
    }

    /// Transcodes one audio track into a standalone elementary stream,
    /// used by audio synthesis before the mux-add step.
    pub async fn extract_synthesized_audio(
        &self,
        input: &Path,
        source_track_index: i64,
        target_codec: &str,
        channels: u32,
        bitrate: Option<&str>,
        filter_chain: &[String],
        output: &Path,
    ) -> Result<()> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-map".to_string(),
            format!("0:{source_track_index}"),
            "-vn".to_string(),
            "-c:a".to_string(),
            encoder_for_codec(target_codec).to_string(),
            "-ac".to_string(),
            channels.to_string(),
        ];
        if let Some(bitrate) = bitrate {
            args.push("-b:a".to_string());
            args.push(bitrate.to_string());
        }
        if !filter_chain.is_empty() {
            args.push("-af".to_string());
            args.push(filter_chain.join(","));
        }
        args.push(output.display().to_string());

        let invocation = ToolInvocation {
            program: self.ffmpeg.clone(),
            args,
            timeout: TRANSCODE_TIMEOUT,
        };
        run_tool_streaming(&invocation, None, |_| {}).await?;
        Ok(())
    }

    /// Stream-copy remux into a different container, selectively
    /// transcoding tracks the target cannot carry.
    pub async fn remux_convert(
        &self,
        input: &Path,
        output: &Path,
        removed_tracks: &[i64],
        track_transcodes: &[(i64, String)],
        faststart: bool,
    ) -> Result<()> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-map".to_string(),
            "0".to_string(),
        ];
        for index in removed_tracks {
            args.push("-map".to_string());
            args.push(format!("-0:{index}"));
        }
        args.push("-c".to_string());
        args.push("copy".to_string());
        for (index, codec) in track_transcodes {
            args.push(format!("-c:{index}"));
            args.push(encoder_for_codec(codec).to_string());
        }
        if faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        args.push(output.display().to_string());

        let invocation = ToolInvocation {
            program: self.ffmpeg.clone(),
            args,
            timeout: Duration::from_secs(1800),
        };
        run_tool_streaming(&invocation, None, |_| {}).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_mapping() {
        assert_eq!(encoder_for_codec("hevc"), "libx265");
        assert_eq!(encoder_for_codec("H264"), "libx264");
        assert_eq!(encoder_for_codec("av1"), "libsvtav1");
        assert_eq!(encoder_for_codec("opus"), "libopus");
        assert_eq!(encoder_for_codec("unknown"), "copy");
    }

    #[test]
    fn crf_transcode_args_include_preset_and_scale() {
        let video = PlannedAction::TranscodeVideo {
            target_codec: "hevc".to_string(),
            quality: QualityMode::Crf { value: 22 },
            preset: Some("slow".to_string()),
            tune: None,
            max_resolution: Some("1080p".to_string()),
            extra_args: Vec::new(),
        };
        let args = TranscodeTool::transcode_args(
            Path::new("/x/in.mkv"),
            Path::new("/x/out.mkv"),
            &video,
            None,
            &[],
        )
        .unwrap();
        assert!(args.contains(&"libx265".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"22".to_string()));
        assert!(args.contains(&"slow".to_string()));
        assert!(args.iter().any(|a| a.contains("min(1080,ih)")));
        // Audio untouched without an audio config.
        let a_pos = args.iter().position(|a| a == "-c:a").unwrap();
        assert_eq!(args[a_pos + 1], "copy");
    }

    #[test]
    fn audio_preserve_list_stream_copies() {
        let video = PlannedAction::TranscodeVideo {
            target_codec: "hevc".to_string(),
            quality: QualityMode::Crf { value: 20 },
            preset: None,
            tune: None,
            max_resolution: None,
            extra_args: Vec::new(),
        };
        let audio = PlannedAction::TranscodeAudio {
            target_codec: "aac".to_string(),
            bitrate: Some("192k".to_string()),
            preserve_codecs: vec!["truehd".to_string()],
        };
        let args = TranscodeTool::transcode_args(
            Path::new("/x/in.mkv"),
            Path::new("/x/out.mkv"),
            &video,
            Some(&audio),
            &[(0, "truehd".to_string()), (1, "ac3".to_string())],
        )
        .unwrap();
        let c0 = args.iter().position(|a| a == "-c:a:0").unwrap();
        assert_eq!(args[c0 + 1], "copy");
        let c1 = args.iter().position(|a| a == "-c:a:1").unwrap();
        assert_eq!(args[c1 + 1], "aac");
        assert!(args.contains(&"-b:a:1".to_string()));
    }
}
