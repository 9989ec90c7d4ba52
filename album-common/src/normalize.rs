//! Text normalization for grouping keys and artist matching
//!
//! Case-folds, strips diacritics (NFKD decomposition with combining marks
//! dropped), turns punctuation into word breaks and collapses whitespace.
//! Apostrophes are removed without a break so "Don't" and "Dont" agree.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize free text into a comparison key
///
/// Returns an empty string when the input has no letters or digits.
pub fn normalize_key(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_break = false;

    for ch in input.nfkd().filter(|c| !is_combining_mark(*c)) {
        if ch.is_alphanumeric() {
            if pending_break && !out.is_empty() {
                out.push(' ');
            }
            pending_break = false;
            out.extend(ch.to_lowercase());
        } else if matches!(ch, '\'' | '\u{2019}' | '`') {
            continue;
        } else {
            pending_break = true;
        }
    }

    out
}

/// Normalize an optional tag value, treating blank values as absent
pub fn normalize_opt(input: Option<&str>) -> Option<String> {
    input
        .map(normalize_key)
        .filter(|normalized| !normalized.is_empty())
}

/// Trim a tag value and drop it when nothing but whitespace remains
pub fn clean_tag(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().trim_matches('\0').trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(normalize_key("  Led   ZEPPELIN  "), "led zeppelin");
    }

    #[test]
    fn test_diacritic_folding() {
        assert_eq!(normalize_key("Beyoncé"), "beyonce");
        assert_eq!(normalize_key("Motörhead"), "motorhead");
        assert_eq!(normalize_key("Sigur Rós"), "sigur ros");
    }

    #[test]
    fn test_punctuation_becomes_break() {
        assert_eq!(normalize_key("AC/DC"), "ac dc");
        assert_eq!(normalize_key("Led Zeppelin IV (Remaster)"), "led zeppelin iv remaster");
        assert_eq!(normalize_key("Don't Stop"), normalize_key("Dont Stop"));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(normalize_key("?!..."), "");
        assert_eq!(normalize_opt(Some("  ")), None);
        assert_eq!(normalize_opt(None), None);
        assert_eq!(clean_tag(Some("  \0".to_string())), None);
        assert_eq!(clean_tag(Some(" Abbey Road ".to_string())), Some("Abbey Road".to_string()));
    }
}
