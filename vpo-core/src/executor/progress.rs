//! Transcode tool progress parsing.
//!
//! ffmpeg reports progress on stderr as `frame= ... fps= 24 ... time=00:12:34.56
//! ... speed=1.2x` lines. The transcode executor parses these and delivers
//! [`FfmpegProgress`] updates through a callback so the worker can persist
//! `progress_json`.

use regex::Regex;

/// One parsed progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegProgress {
    /// 0..=100, derived from `time=` against the input duration.
    pub percent: f64,
    pub fps: Option<f64>,
    pub encoder_type: String,
}

/// Parses `HH:MM:SS.cc` into seconds.
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parses one stderr line into a progress update. Returns `None` for
/// non-progress lines. Percent is clamped to 100.
pub fn parse_progress_line(
    line: &str,
    total_duration_seconds: f64,
    encoder_type: &str,
) -> Option<FfmpegProgress> {
    let time_re = Regex::new(r"time=(\d+:\d+:\d+\.?\d*)").unwrap();
    let caps = time_re.captures(line)?;
    let elapsed = parse_timestamp(&caps[1])?;

    let percent = if total_duration_seconds > 0.0 {
        ((elapsed / total_duration_seconds) * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let fps = Regex::new(r"fps=\s*(\d+(?:\.\d+)?)")
        .unwrap()
        .captures(line)
        .and_then(|c| c[1].parse().ok());

    Some(FfmpegProgress {
        percent,
        fps,
        encoder_type: encoder_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_progress_line() {
        let line = "frame= 1234 fps= 48.5 q=28.0 size=  512kB time=00:30:00.00 bitrate= 233.2kbits/s speed=1.94x";
        let progress = parse_progress_line(line, 3600.0, "libx265").unwrap();
        assert!((progress.percent - 50.0).abs() < 1e-9);
        assert_eq!(progress.fps, Some(48.5));
        assert_eq!(progress.encoder_type, "libx265");
    }

    #[test]
    fn non_progress_lines_are_ignored() {
        assert!(parse_progress_line("Stream mapping:", 3600.0, "libx265").is_none());
        assert!(parse_progress_line("", 3600.0, "libx265").is_none());
    }

    #[test]
    fn percent_clamps_at_hundred() {
        let line = "time=02:00:00.00";
        let progress = parse_progress_line(line, 3600.0, "libx264").unwrap();
        assert_eq!(progress.percent, 100.0);
    }

    #[test]
    fn zero_duration_reports_zero_percent() {
        let progress = parse_progress_line("time=00:01:00.00", 0.0, "copy").unwrap();
        assert_eq!(progress.percent, 0.0);
    }
}
