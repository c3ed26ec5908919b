//! Metadata keyword matchers for audio track classification.

/// Title keywords that mark a music-only track.
const MUSIC_KEYWORDS: &[&str] = &[
    "music only",
    "music track",
    "score only",
    "isolated score",
    "soundtrack",
];

/// Title keywords that mark an effects-only track.
const SFX_KEYWORDS: &[&str] = &["sfx", "effects only", "sound effects", "fx only"];

/// Case-insensitive substring matcher over policy-configured commentary
/// patterns.
#[derive(Debug, Clone)]
pub struct CommentaryMatcher {
    patterns: Vec<String>,
}

impl CommentaryMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn is_commentary(&self, title: Option<&str>) -> bool {
        let Some(title) = title else { return false };
        let lower = title.to_lowercase();
        self.patterns.iter().any(|p| !p.is_empty() && lower.contains(p))
    }
}

/// Whether a track title marks the track as music-only.
pub fn is_music_by_metadata(title: Option<&str>) -> bool {
    let Some(title) = title else { return false };
    let lower = title.to_lowercase();
    MUSIC_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Whether a track title marks the track as effects-only.
pub fn is_sfx_by_metadata(title: Option<&str>) -> bool {
    let Some(title) = title else { return false };
    let lower = title.to_lowercase();
    SFX_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commentary_matching_is_case_insensitive() {
        let matcher = CommentaryMatcher::new(["commentary", "director"]);
        assert!(matcher.is_commentary(Some("Director's Commentary")));
        assert!(matcher.is_commentary(Some("COMMENTARY TRACK")));
        assert!(!matcher.is_commentary(Some("Main Audio")));
        assert!(!matcher.is_commentary(None));
    }

    #[test]
    fn empty_patterns_never_match() {
        let matcher = CommentaryMatcher::new(Vec::<String>::new());
        assert!(!matcher.is_commentary(Some("Commentary")));
    }

    #[test]
    fn music_and_sfx_keywords() {
        assert!(is_music_by_metadata(Some("Isolated Score")));
        assert!(is_music_by_metadata(Some("Original Soundtrack")));
        assert!(!is_music_by_metadata(Some("English 5.1")));
        assert!(is_sfx_by_metadata(Some("SFX Only")));
        assert!(is_sfx_by_metadata(Some("Sound Effects")));
        assert!(!is_sfx_by_metadata(None));
    }
}
