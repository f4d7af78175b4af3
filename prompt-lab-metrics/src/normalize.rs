//! Answer normalization used by every exact-match comparison.
//!
//! The rule is deliberately literal: trim, collapse whitespace, lower-case and
//! strip [`STRIPPED_CHARS`]. There is no stemming and no synonym matching, so a
//! semantically right but differently worded answer counts as a miss.

/// Punctuation and quote characters removed wherever they occur.
pub const STRIPPED_CHARS: &[char] = &[
    '.', ',', '!', '?', ';', ':', '"', '\'', '`', '(', ')', '[', ']', '{', '}', '«', '»', '“',
    '”', '‘', '’',
];

const FINAL_ANSWER_MARKER: &str = "final answer:";

/// Canonical form of an answer string.
pub fn normalize(s: &str) -> String {
    let stripped: String = s.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `normalize(output) == normalize(truth)`.
pub fn exact_match(output: &str, truth: &str) -> bool {
    normalize(output) == normalize(truth)
}

/// Text following the last `Final answer:` marker (case-insensitive), up to
/// the end of that line. `None` when the marker is absent.
pub fn extract_final_answer(s: &str) -> Option<&str> {
    // ASCII lowering keeps byte offsets aligned with `s`.
    let lowered = s.to_ascii_lowercase();
    let start = lowered.rfind(FINAL_ANSWER_MARKER)? + FINAL_ANSWER_MARKER.len();
    let rest = &s[start..];
    let line = rest.lines().next().unwrap_or("");
    Some(line.trim())
}

/// Exact match on the whole output, or on the extracted final answer when the
/// output carries one. Reported separately from exact-match accuracy.
pub fn lenient_match(output: &str, truth: &str) -> bool {
    if exact_match(output, truth) {
        return true;
    }
    extract_final_answer(output)
        .map(|answer| exact_match(answer, truth))
        .unwrap_or(false)
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_anywhere() {
        assert_eq!(normalize("  \"Pos.itive!\"  "), "positive");
        assert_eq!(normalize("«Yes»"), "yes");
    }

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(normalize("Very \t\n  Positive"), "very positive");
    }

    #[test]
    fn extracts_last_marker() {
        let text = "Final answer: maybe\nOn reflection...\nFINAL ANSWER: Yes.\n";
        assert_eq!(extract_final_answer(text), Some("Yes."));
        assert_eq!(extract_final_answer("no marker"), None);
    }

    #[test]
    fn lenient_match_accepts_reasoned_answer() {
        let text = "The numbers add up to twelve.\nFinal answer: 12";
        assert!(!exact_match(text, "12"));
        assert!(lenient_match(text, "12"));
    }
}
