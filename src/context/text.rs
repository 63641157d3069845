//! Text heuristics shared by scoring, selection and summarization

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word pattern"));

static FENCED_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?```").expect("valid fenced code pattern"));

static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`[^`]+`").expect("valid inline code pattern"));

/// Words ignored by keyword matching
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "can", "this", "that", "these", "those",
];

/// Lowercase word tokens, in order
pub fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Word tokens as they appear in the text, case preserved
pub fn raw_words(text: &str) -> impl Iterator<Item = &str> {
    WORD_RE.find_iter(text).map(|m| m.as_str())
}

/// Distinct meaningful keywords: longer than two chars and not a stop word
pub fn keywords(text: &str) -> HashSet<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard index of the two texts' keyword sets; 0 if either is empty
pub fn keyword_jaccard(a: &str, b: &str) -> f64 {
    let ka = keywords(a);
    let kb = keywords(b);
    if ka.is_empty() || kb.is_empty() {
        return 0.0;
    }

    let intersection = ka.intersection(&kb).count();
    let union = ka.union(&kb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Fenced code blocks followed by inline code spans outside those blocks
pub fn extract_code_blocks(content: &str) -> Vec<String> {
    let mut blocks: Vec<String> = FENCED_CODE_RE
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect();

    let outside_fences = FENCED_CODE_RE.replace_all(content, " ");
    blocks.extend(
        INLINE_CODE_RE
            .find_iter(&outside_fences)
            .map(|m| m.as_str().to_string()),
    );
    blocks
}

/// Split on periods and trim; empty pieces are kept out
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split('.').map(str::trim).filter(|s| !s.is_empty())
}

/// Number of case-insensitive substring occurrences of any term
pub fn count_occurrences(text: &str, terms: &[&str]) -> usize {
    let lower = text.to_lowercase();
    terms.iter().map(|term| lower.matches(term).count()).sum()
}

/// Whether the text contains any term, case-insensitively
pub fn contains_any(text: &str, terms: &[&str]) -> bool {
    let lower = text.to_lowercase();
    terms.iter().any(|term| lower.contains(term))
}

/// Truncate to at most `max_chars` characters, appending `...`
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}
