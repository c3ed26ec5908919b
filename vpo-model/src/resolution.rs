//! Resolution labels and codec alias sets shared by skip conditions,
//! conditional rules, and the library views.

/// Converts a video height in pixels to its resolution label.
pub fn height_to_resolution_label(height: i64) -> &'static str {
    if height >= 2160 {
        "2160p"
    } else if height >= 1440 {
        "1440p"
    } else if height >= 1080 {
        "1080p"
    } else if height >= 720 {
        "720p"
    } else {
        "480p"
    }
}

/// Converts a resolution label to its nominal height. `4k` and `8k` map to
/// their progressive equivalents. Unknown labels return `None`.
pub fn resolution_label_to_height(label: &str) -> Option<i64> {
    match label.to_lowercase().as_str() {
        "480p" => Some(480),
        "720p" => Some(720),
        "1080p" => Some(1080),
        "1440p" => Some(1440),
        "2160p" | "4k" => Some(2160),
        "4320p" | "8k" => Some(4320),
        _ => None,
    }
}

/// Returns the alias set a codec name belongs to, lowercased. Comparisons
/// against any member of the set count as a match.
pub fn codec_aliases(codec: &str) -> Vec<String> {
    let lower = codec.to_lowercase();
    let mut aliases = vec![lower.clone(), lower.replace('-', "")];
    match lower.as_str() {
        "hevc" | "h265" | "h.265" => {
            aliases.extend(["hevc", "h265", "h.265"].map(String::from));
        }
        "h264" | "h.264" | "avc" => {
            aliases.extend(["h264", "h.264", "avc"].map(String::from));
        }
        _ => {}
    }
    aliases.sort();
    aliases.dedup();
    aliases
}

/// Whether two codec names refer to the same codec, honoring alias sets.
pub fn codecs_match(a: &str, b: &str) -> bool {
    codec_aliases(a).contains(&b.to_lowercase())
        || codec_aliases(b).contains(&a.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_map_to_labels() {
        assert_eq!(height_to_resolution_label(2160), "2160p");
        assert_eq!(height_to_resolution_label(1088), "1080p");
        assert_eq!(height_to_resolution_label(720), "720p");
        assert_eq!(height_to_resolution_label(576), "480p");
    }

    #[test]
    fn labels_map_to_heights() {
        assert_eq!(resolution_label_to_height("4k"), Some(2160));
        assert_eq!(resolution_label_to_height("1080P"), Some(1080));
        assert_eq!(resolution_label_to_height("900p"), None);
    }

    #[test]
    fn hevc_aliases_match() {
        assert!(codecs_match("hevc", "h265"));
        assert!(codecs_match("H.265", "hevc"));
        assert!(codecs_match("h264", "avc"));
        assert!(!codecs_match("hevc", "h264"));
    }
}
