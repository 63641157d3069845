//! Summarization of evicted conversation blocks

use super::models::{ConversationSummary, ConversationTurn};
use super::text;
use super::token_estimator::TOKENS_PER_WORD;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use tracing::debug;

/// Words that raise a sentence's summary score, once per occurrence
pub const IMPORTANCE_KEYWORDS: &[&str] = &[
    "implement",
    "create",
    "solution",
    "problem",
    "error",
    "fix",
    "code",
    "function",
    "class",
    "method",
    "api",
    "database",
];

/// Lowercase terms always accepted as topics
pub const TECH_TERMS: &[&str] = &[
    "python",
    "javascript",
    "react",
    "api",
    "database",
    "function",
    "class",
    "method",
];

/// Assistant replies mentioning any of these are recorded as decisions
pub const DECISION_KEYWORDS: &[&str] = &[
    "solution",
    "approach",
    "recommend",
    "suggest",
    "should",
    "will",
];

const MIN_SENTENCE_CHARS: usize = 20;
const MAX_SUMMARY_SENTENCES: usize = 5;
const MAX_TOPICS: usize = 10;
const TOPICS_PER_TURN: usize = 5;
const MAX_CODE_FRAGMENTS: usize = 5;
const MAX_DECISIONS: usize = 3;
const DECISION_PREVIEW_CHARS: usize = 200;

/// Summarizer trait for different summarization strategies
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Compress a contiguous block of turns, oldest first
    ///
    /// Returns `None` when there is nothing to summarize.
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<Option<ConversationSummary>>;
}

/// Heuristic extractive summarizer
///
/// Picks the highest-scoring sentences from the block and collects topics,
/// code fragments and decisions alongside them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    /// Top sentences of `content`, re-joined in their original order
    pub fn summarize_text(&self, content: &str) -> String {
        let mut scored: Vec<(usize, &str, f64)> = text::sentences(content)
            .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
            .enumerate()
            .map(|(idx, sentence)| (idx, sentence, sentence_score(sentence)))
            .collect();

        if scored.is_empty() {
            return String::new();
        }

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));
        scored.truncate(MAX_SUMMARY_SENTENCES);
        scored.sort_by_key(|(idx, _, _)| *idx);

        let joined = scored
            .iter()
            .map(|(_, sentence, _)| *sentence)
            .collect::<Vec<_>>()
            .join(". ");
        format!("{}.", joined)
    }

    /// Distinct topic terms across the block
    pub fn extract_topics(&self, turns: &[ConversationTurn]) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();

        for turn in turns {
            let content = turn.text();
            let candidates = text::raw_words(&content)
                .filter(|word| is_topic(word))
                .take(TOPICS_PER_TURN)
                .map(str::to_lowercase);

            for topic in candidates {
                if !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
        }

        topics.truncate(MAX_TOPICS);
        topics
    }

    /// Previews of assistant replies that state a decision
    pub fn extract_decisions(&self, turns: &[ConversationTurn]) -> Vec<String> {
        turns
            .iter()
            .map(|t| t.assistant_message.content.as_str())
            .filter(|reply| text::contains_any(reply, DECISION_KEYWORDS))
            .take(MAX_DECISIONS)
            .map(|reply| text::truncate_with_ellipsis(reply, DECISION_PREVIEW_CHARS))
            .collect()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<Option<ConversationSummary>> {
        let (Some(first), Some(last)) = (turns.first(), turns.last()) else {
            return Ok(None);
        };

        let combined = turns
            .iter()
            .flat_map(|t| [t.user_message.content.as_str(), t.assistant_message.content.as_str()])
            .collect::<Vec<_>>()
            .join(" ");
        let summary_text = self.summarize_text(&combined);

        let original_tokens: usize = turns.iter().map(|t| t.tokens_used).sum();
        let summary_words = summary_text.split_whitespace().count();
        let tokens_saved = (original_tokens as f64 - summary_words as f64 * TOKENS_PER_WORD) as i64;

        let important_code = turns
            .iter()
            .flat_map(|t| t.code_blocks.iter().cloned())
            .take(MAX_CODE_FRAGMENTS)
            .collect();

        debug!(
            "Summarized {} turns: {} original tokens, {} saved",
            turns.len(),
            original_tokens,
            tokens_saved
        );

        Ok(Some(ConversationSummary {
            period_start: first.timestamp,
            period_end: last.timestamp,
            summary_text,
            key_topics: self.extract_topics(turns),
            important_code,
            decisions_made: self.extract_decisions(turns),
            tokens_saved,
            turns_covered: turns.len(),
            created_at: Utc::now(),
        }))
    }
}

fn sentence_score(sentence: &str) -> f64 {
    let length_bonus = (sentence.chars().count() as f64 / 100.0).min(1.0);
    length_bonus + text::count_occurrences(sentence, IMPORTANCE_KEYWORDS) as f64
}

fn is_topic(word: &str) -> bool {
    let mixed_case = word.chars().count() > 4 && word.chars().any(char::is_uppercase);
    mixed_case || TECH_TERMS.contains(&word.to_lowercase().as_str())
}
