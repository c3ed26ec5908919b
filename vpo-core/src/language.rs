//! Language code normalization across ISO 639-1 / 639-2/B / 639-2/T.
//!
//! Every language value written to the catalog goes through [`normalize`]
//! first, so the stored form is always the canonical three-letter
//! bibliographic code (or `und`).

use std::fmt;

/// Canonical target standard for stored language codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanguageStandard {
    /// ISO 639-1 two-letter codes.
    Iso639_1,
    /// ISO 639-2/B bibliographic three-letter codes (the default).
    #[default]
    Iso639_2B,
    /// ISO 639-2/T terminological three-letter codes.
    Iso639_2T,
}

impl LanguageStandard {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "639-1" => Some(LanguageStandard::Iso639_1),
            "639-2/B" => Some(LanguageStandard::Iso639_2B),
            "639-2/T" => Some(LanguageStandard::Iso639_2T),
            _ => None,
        }
    }
}

impl fmt::Display for LanguageStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LanguageStandard::Iso639_1 => "639-1",
            LanguageStandard::Iso639_2B => "639-2/B",
            LanguageStandard::Iso639_2T => "639-2/T",
        };
        f.write_str(s)
    }
}

/// The undefined-language code, used for absent or unrecognized values.
pub const UNDEFINED: &str = "und";

/// (639-1, 639-2/B, 639-2/T, English name). The 2/T column repeats the 2/B
/// code for languages without a distinct terminological form.
const LANGUAGES: &[(&str, &str, &str, &str)] = &[
    ("ar", "ara", "ara", "Arabic"),
    ("bg", "bul", "bul", "Bulgarian"),
    ("bn", "ben", "ben", "Bengali"),
    ("bs", "bos", "bos", "Bosnian"),
    ("ca", "cat", "cat", "Catalan"),
    ("cs", "cze", "ces", "Czech"),
    ("cy", "wel", "cym", "Welsh"),
    ("da", "dan", "dan", "Danish"),
    ("de", "ger", "deu", "German"),
    ("el", "gre", "ell", "Greek"),
    ("en", "eng", "eng", "English"),
    ("es", "spa", "spa", "Spanish"),
    ("et", "est", "est", "Estonian"),
    ("eu", "baq", "eus", "Basque"),
    ("fa", "per", "fas", "Persian"),
    ("fi", "fin", "fin", "Finnish"),
    ("fr", "fre", "fra", "French"),
    ("he", "heb", "heb", "Hebrew"),
    ("hi", "hin", "hin", "Hindi"),
    ("hr", "hrv", "hrv", "Croatian"),
    ("hu", "hun", "hun", "Hungarian"),
    ("hy", "arm", "hye", "Armenian"),
    ("id", "ind", "ind", "Indonesian"),
    ("is", "ice", "isl", "Icelandic"),
    ("it", "ita", "ita", "Italian"),
    ("ja", "jpn", "jpn", "Japanese"),
    ("ka", "geo", "kat", "Georgian"),
    ("ko", "kor", "kor", "Korean"),
    ("lt", "lit", "lit", "Lithuanian"),
    ("lv", "lav", "lav", "Latvian"),
    ("mk", "mac", "mkd", "Macedonian"),
    ("ms", "may", "msa", "Malay"),
    ("mt", "mlt", "mlt", "Maltese"),
    ("nb", "nob", "nob", "Norwegian Bokmål"),
    ("nl", "dut", "nld", "Dutch"),
    ("no", "nor", "nor", "Norwegian"),
    ("pl", "pol", "pol", "Polish"),
    ("pt", "por", "por", "Portuguese"),
    ("ro", "rum", "ron", "Romanian"),
    ("ru", "rus", "rus", "Russian"),
    ("sk", "slo", "slk", "Slovak"),
    ("sl", "slv", "slv", "Slovenian"),
    ("sq", "alb", "sqi", "Albanian"),
    ("sr", "srp", "srp", "Serbian"),
    ("sv", "swe", "swe", "Swedish"),
    ("ta", "tam", "tam", "Tamil"),
    ("te", "tel", "tel", "Telugu"),
    ("th", "tha", "tha", "Thai"),
    ("tl", "tgl", "tgl", "Tagalog"),
    ("tr", "tur", "tur", "Turkish"),
    ("uk", "ukr", "ukr", "Ukrainian"),
    ("ur", "urd", "urd", "Urdu"),
    ("vi", "vie", "vie", "Vietnamese"),
    ("zh", "chi", "zho", "Chinese"),
];

/// Special codes that pass through normalization untouched.
const SPECIAL: &[(&str, &str)] = &[
    ("und", "Undefined"),
    ("mis", "Uncoded languages"),
    ("mul", "Multiple"),
    ("zxx", "No linguistic content"),
];

fn lookup(code: &str) -> Option<&'static (&'static str, &'static str, &'static str, &'static str)>
{
    LANGUAGES
        .iter()
        .find(|(one, two_b, two_t, _)| *one == code || *two_b == code || *two_t == code)
}

/// Canonicalizes a language code to the given standard.
///
/// Accepts ISO 639-1, 639-2/B, and 639-2/T forms, case-insensitive and
/// whitespace-trimmed. `None`, empty, and unrecognized inputs all
/// canonicalize to `und`.
pub fn normalize_to(code: Option<&str>, target: LanguageStandard) -> String {
    let Some(code) = code else {
        return UNDEFINED.to_string();
    };
    let trimmed = code.trim().to_lowercase();
    if trimmed.is_empty() {
        return UNDEFINED.to_string();
    }

    if SPECIAL.iter().any(|(c, _)| *c == trimmed) {
        return trimmed;
    }

    match lookup(&trimmed) {
        Some((one, two_b, two_t, _)) => match target {
            LanguageStandard::Iso639_1 => (*one).to_string(),
            LanguageStandard::Iso639_2B => (*two_b).to_string(),
            LanguageStandard::Iso639_2T => (*two_t).to_string(),
        },
        None => UNDEFINED.to_string(),
    }
}

/// Canonicalizes a language code to ISO 639-2/B, the project standard.
pub fn normalize(code: Option<&str>) -> String {
    normalize_to(code, LanguageStandard::Iso639_2B)
}

/// Whether two language codes refer to the same language.
///
/// Compares canonical forms, so `de`, `ger`, and `deu` all match each
/// other. `None`, empty, and `und` are treated as the same undefined
/// value: undefined matches undefined and nothing else.
pub fn languages_match(a: Option<&str>, b: Option<&str>) -> bool {
    normalize(a) == normalize(b)
}

/// English display name for a language code. Unknown codes come back
/// uppercased rather than erroring.
pub fn language_name(code: Option<&str>) -> String {
    let Some(raw) = code else {
        return "Undefined".to_string();
    };
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        return "Undefined".to_string();
    }
    if let Some((_, name)) = SPECIAL.iter().find(|(c, _)| *c == trimmed) {
        return (*name).to_string();
    }
    if let Some((_, _, _, name)) = lookup(&trimmed) {
        return (*name).to_string();
    }
    raw.trim().to_uppercase()
}

/// Whether a code is a recognized ISO 639 code in any supported standard.
pub fn is_valid_language_code(code: Option<&str>) -> bool {
    let Some(code) = code else { return false };
    let trimmed = code.trim().to_lowercase();
    if trimmed.is_empty() {
        return false;
    }
    SPECIAL.iter().any(|(c, _)| *c == trimmed) || lookup(&trimmed).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_639_1_to_bibliographic() {
        assert_eq!(normalize(Some("de")), "ger");
        assert_eq!(normalize(Some("en")), "eng");
        assert_eq!(normalize(Some("ja")), "jpn");
        assert_eq!(normalize(Some("fr")), "fre");
        assert_eq!(normalize(Some("zh")), "chi");
        assert_eq!(normalize(Some("nl")), "dut");
    }

    #[test]
    fn normalizes_terminological_to_bibliographic() {
        assert_eq!(normalize(Some("deu")), "ger");
        assert_eq!(normalize(Some("fra")), "fre");
        assert_eq!(normalize(Some("zho")), "chi");
        assert_eq!(normalize(Some("ces")), "cze");
        assert_eq!(normalize(Some("slk")), "slo");
        assert_eq!(normalize(Some("ron")), "rum");
        assert_eq!(normalize(Some("ell")), "gre");
    }

    #[test]
    fn bibliographic_codes_are_fixed_points() {
        for code in ["eng", "ger", "jpn", "fre"] {
            assert_eq!(normalize(Some(code)), code);
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["de", "deu", "GER", "xx", "", "und", "mul"] {
            let once = normalize(Some(input));
            assert_eq!(normalize(Some(&once)), once);
        }
    }

    #[test]
    fn special_codes_pass_through() {
        for code in ["und", "mis", "mul", "zxx"] {
            assert_eq!(normalize(Some(code)), code);
        }
    }

    #[test]
    fn absent_and_unknown_become_und() {
        assert_eq!(normalize(None), "und");
        assert_eq!(normalize(Some("")), "und");
        assert_eq!(normalize(Some("xx")), "und");
        assert_eq!(normalize(Some("abcdef")), "und");
    }

    #[test]
    fn normalize_is_case_insensitive_and_trims() {
        assert_eq!(normalize(Some("DE")), "ger");
        assert_eq!(normalize(Some("  de  ")), "ger");
        assert_eq!(normalize(Some("\tENG\n")), "eng");
    }

    #[test]
    fn normalize_to_other_standards() {
        assert_eq!(normalize_to(Some("ger"), LanguageStandard::Iso639_1), "de");
        assert_eq!(
            normalize_to(Some("de"), LanguageStandard::Iso639_2T),
            "deu"
        );
        assert_eq!(
            normalize_to(Some("fre"), LanguageStandard::Iso639_2T),
            "fra"
        );
    }

    #[test]
    fn matching_is_cross_standard_and_symmetric() {
        for (a, b) in [
            ("de", "ger"),
            ("de", "deu"),
            ("ger", "deu"),
            ("en", "eng"),
            ("fr", "fra"),
            ("nl", "dut"),
            ("cs", "ces"),
        ] {
            assert!(languages_match(Some(a), Some(b)), "{a} vs {b}");
            assert!(languages_match(Some(b), Some(a)), "{b} vs {a}");
        }
        assert!(!languages_match(Some("en"), Some("de")));
        assert!(!languages_match(Some("eng"), Some("ger")));
    }

    #[test]
    fn undefined_matches_only_undefined() {
        assert!(languages_match(None, None));
        assert!(languages_match(None, Some("und")));
        assert!(languages_match(Some("und"), None));
        assert!(!languages_match(None, Some("eng")));
        assert!(!languages_match(Some("eng"), None));
    }

    #[test]
    fn names_resolve_through_normalization() {
        assert_eq!(language_name(Some("eng")), "English");
        assert_eq!(language_name(Some("de")), "German");
        assert_eq!(language_name(Some("deu")), "German");
        assert_eq!(language_name(Some("und")), "Undefined");
        assert_eq!(language_name(Some("zxx")), "No linguistic content");
        assert_eq!(language_name(Some("xyz")), "XYZ");
        assert_eq!(language_name(None), "Undefined");
    }

    #[test]
    fn validity_checks() {
        assert!(is_valid_language_code(Some("en")));
        assert!(is_valid_language_code(Some("ENG")));
        assert!(is_valid_language_code(Some("deu")));
        assert!(!is_valid_language_code(Some("xx")));
        assert!(!is_valid_language_code(Some("")));
        assert!(!is_valid_language_code(None));
    }
}
