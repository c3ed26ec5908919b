//! Filename metadata extraction for destination templates.
//!
//! Pulls title/year/season/episode/resolution/codec/source tokens out of
//! release-style file names so the move executor can render templates like
//! `{title} ({year})/{title} - S{season:02}E{episode:02}.{ext}`.

use std::path::Path;

use regex::Regex;

use vpo_model::ParsedFilename;

#[derive(Debug, Clone, Default)]
pub struct FilenameParser;

impl FilenameParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses a file path into template metadata. Episode patterns take
    /// precedence; anything else is treated as a movie-style name.
    pub fn parse<P: AsRef<Path>>(&self, path: P) -> ParsedFilename {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let (season, episode) = Self::extract_episode(stem)
            .map(|(s, e)| (Some(s), Some(e)))
            .unwrap_or((None, None));

        ParsedFilename {
            title: Self::extract_title(stem),
            year: Self::extract_year(stem),
            season,
            episode,
            resolution: Self::extract_resolution(stem),
            codec: Self::extract_codec(stem),
            source: Self::extract_source(stem),
            release_group: Self::extract_release_group(stem),
        }
    }

    /// Episode naming patterns in order of preference.
    fn extract_episode(stem: &str) -> Option<(u32, u32)> {
        let patterns = [
            Regex::new(r"[Ss](\d{1,3})[Ee](\d{1,3})").unwrap(),
            Regex::new(r"(\d{1,2})[xX](\d{1,3})").unwrap(),
            Regex::new(r"(?i)season\s*(\d{1,3})\s*episode\s*(\d{1,3})").unwrap(),
        ];
        for pattern in &patterns {
            if let Some(caps) = pattern.captures(stem) {
                let season = caps.get(1)?.as_str().parse().ok()?;
                let episode = caps.get(2)?.as_str().parse().ok()?;
                return Some((season, episode));
            }
        }
        None
    }

    fn extract_year(stem: &str) -> Option<u16> {
        // Prefer a parenthesized year, then any plausible standalone one.
        let bracketed = Regex::new(r"[(\[](19\d{2}|20\d{2})[)\]]").unwrap();
        if let Some(caps) = bracketed.captures(stem) {
            return caps.get(1)?.as_str().parse().ok();
        }
        let bare = Regex::new(r"(?:^|[.\s_-])(19\d{2}|20\d{2})(?:$|[.\s_-])").unwrap();
        bare.captures(stem)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn extract_resolution(stem: &str) -> Option<String> {
        let pattern = Regex::new(r"(?i)\b(480p|720p|1080p|1440p|2160p|4k|8k)\b").unwrap();
        pattern
            .captures(stem)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
    }

    fn extract_codec(stem: &str) -> Option<String> {
        let pattern =
            Regex::new(r"(?i)\b(x264|x265|h\.?264|h\.?265|hevc|avc|av1|vp9|xvid)\b").unwrap();
        pattern
            .captures(stem)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase().replace('.', ""))
    }

    fn extract_source(stem: &str) -> Option<String> {
        let pattern = Regex::new(
            r"(?i)\b(remux|blu-?ray|bdrip|brrip|web-?dl|webrip|hdtv|dvdrip|dvd)\b",
        )
        .unwrap();
        pattern
            .captures(stem)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase().replace('-', ""))
    }

    fn extract_release_group(stem: &str) -> Option<String> {
        let pattern = Regex::new(r"-([A-Za-z0-9]+)$").unwrap();
        pattern
            .captures(stem)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Title is everything before the first year / episode / quality token,
    /// with separators flattened to spaces.
    fn extract_title(stem: &str) -> String {
        let boundary = Regex::new(
            r"(?i)[.\s_-]*(\(?(19|20)\d{2}\)?|[Ss]\d{1,3}[Ee]\d{1,3}|\d{1,2}x\d{1,3}|480p|720p|1080p|1440p|2160p|4k|8k|remux|blu-?ray|bdrip|brrip|web-?dl|webrip|hdtv|dvdrip)\b.*$",
        )
        .unwrap();
        let head = boundary.replace(stem, "");
        let cleaned = head.replace(['.', '_'], " ");
        let squashed = Regex::new(r"\s+").unwrap().replace_all(cleaned.trim(), " ");
        squashed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_movie_with_year_and_quality() {
        let parser = FilenameParser::new();
        let info = parser.parse("The.Matrix.1999.1080p.BluRay.x264-GROUP.mkv");
        assert_eq!(info.title, "The Matrix");
        assert_eq!(info.year, Some(1999));
        assert_eq!(info.resolution.as_deref(), Some("1080p"));
        assert_eq!(info.codec.as_deref(), Some("x264"));
        assert_eq!(info.source.as_deref(), Some("bluray"));
        assert_eq!(info.release_group.as_deref(), Some("GROUP"));
        assert!(!info.is_episode());
    }

    #[test]
    fn parses_episode_markers() {
        let parser = FilenameParser::new();
        let info = parser.parse("Show.Name.S02E05.720p.WEB-DL.mkv");
        assert_eq!(info.title, "Show Name");
        assert_eq!(info.season, Some(2));
        assert_eq!(info.episode, Some(5));
        assert!(info.is_episode());
        assert_eq!(info.source.as_deref(), Some("webdl"));
    }

    #[test]
    fn parses_x_style_episode() {
        let parser = FilenameParser::new();
        let info = parser.parse("Show Name 3x12 HDTV.mkv");
        assert_eq!(info.season, Some(3));
        assert_eq!(info.episode, Some(12));
    }

    #[test]
    fn parenthesized_year_wins() {
        let parser = FilenameParser::new();
        let info = parser.parse("Blade Runner 2049 (2017) 2160p.mkv");
        assert_eq!(info.year, Some(2017));
        assert_eq!(info.resolution.as_deref(), Some("2160p"));
    }

    #[test]
    fn bare_name_parses_to_title_only() {
        let parser = FilenameParser::new();
        let info = parser.parse("home_video.mkv");
        assert_eq!(info.title, "home video");
        assert_eq!(info.year, None);
        assert_eq!(info.resolution, None);
    }
}
