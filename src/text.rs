//! Small text helpers shared by the pipeline stages.

use std::sync::LazyLock;

use regex::Regex;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\wäöüß\s]").expect("non-word pattern"));

/// First `max` characters of `text` (never splits a code point).
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Deduplication key: lowercase, punctuation removed, whitespace collapsed,
/// truncated to `prefix` characters.
///
/// Normalizing a key again yields the same key.
pub fn normalize_key(text: &str, prefix: usize) -> String {
    let lower = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lower, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, prefix).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("Grüße", 3), "Grü");
        assert_eq!(truncate_chars("kurz", 10), "kurz");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn key_strips_punctuation_and_case() {
        assert_eq!(
            normalize_key("  Die Sperrung  der Daten, wird — vorgenommen! ", 80),
            "die sperrung der daten wird vorgenommen"
        );
    }

    #[test]
    fn key_keeps_umlauts() {
        assert_eq!(normalize_key("Rückerstattung über IBAN.", 80), "rückerstattung über iban");
    }

    #[test]
    fn key_is_truncated_without_trailing_space() {
        assert_eq!(normalize_key("abc def ghi", 4), "abc");
    }

    #[test]
    fn key_normalization_is_idempotent() {
        let samples = [
            "Wir haben die Sperrung der Daten, für weitere Übersendungen von Werbung und Angeboten aus unserem Unternehmen, vorgenommen.",
            "  Tel.: 0049 (0) 4431 -- 74 89 440!!  ",
            "ÄÖÜ straße   ẞ",
            "",
        ];
        for sample in samples {
            let once = normalize_key(sample, 80);
            assert_eq!(normalize_key(&once, 80), once, "sample: {sample}");
        }
    }
}
