//! Question text normalisation and similarity
//!
//! Shared by the question queue (exact duplicate detection) and the
//! conversation state (near-duplicate detection).

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Anything that is neither a word character nor whitespace
static PUNCTUATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercases, strips punctuation and collapses whitespace
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = PUNCTUATION_PATTERN.replace_all(&lower, "");
    WHITESPACE_PATTERN
        .replace_all(stripped.trim(), " ")
        .into_owned()
}

/// Word-token set of an already normalised string
pub fn token_set(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().collect()
}

/// Jaccard index of the token sets of two normalised strings
///
/// Two empty token sets score 0.0; equality of empty strings is handled by
/// the callers' exact-match check.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}

/// Number of whitespace separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize("  Tell me,  about YOURSELF?! "),
            "tell me about yourself"
        );
    }

    #[test]
    fn test_normalize_collapses_internal_whitespace() {
        assert_eq!(normalize("what\t is\n\nyour   goal"), "what is your goal");
    }

    #[test]
    fn test_normalize_keeps_digits_and_apostrophe_free_words() {
        assert_eq!(normalize("Describe project #2."), "describe project 2");
        assert_eq!(normalize("What's next?"), "whats next");
    }

    #[test]
    fn test_jaccard_identical() {
        assert!((jaccard("a b c", "c b a") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        // {a,b,c} vs {b,c,d}: 2 / 4
        assert!((jaccard("a b c", "b c d") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jaccard_is_symmetric() {
        let a = "tell me about your last project";
        let b = "tell me about a recent project you led";
        assert!((jaccard(a, b) - jaccard(b, a)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jaccard_empty() {
        assert_eq!(jaccard("", ""), 0.0);
        assert_eq!(jaccard("word", ""), 0.0);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two   three "), 3);
        assert_eq!(word_count(""), 0);
    }
}
