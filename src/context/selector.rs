//! Budgeted window selection
//!
//! Selection runs in four steps:
//! 1. Charge the system reserve, the query and attachment summaries against the budget
//! 2. Rank every resident turn by relevance to the query
//! 3. Pack turns in score order according to the [`SelectionPolicy`]
//! 4. Restore chronological order, then attach a prior-period summary and key points

use super::models::{AttachmentContext, ContextWindow, ConversationSummary, ConversationTurn};
use super::scorer::Scorer;
use super::text;
use crate::config::WindowConfig;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Sentence markers that flag a key point
pub const EMPHASIS_MARKERS: &[&str] = &[
    "important",
    "note",
    "remember",
    "key",
    "main",
    "solution",
    "answer",
    "result",
    "conclusion",
];

/// Sentences at or below this length never become key points
const MIN_KEY_POINT_CHARS: usize = 20;

/// Code fragments at or above this length are left out of key points
const MAX_KEY_POINT_CODE_CHARS: usize = 200;

/// How ranked candidates are packed into the remaining budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Stop at the first candidate that does not fit
    #[default]
    GreedyStop,
    /// Skip candidates that do not fit and keep scanning
    BestFit,
}

/// Builds a [`ContextWindow`] from resident turns and summaries
#[derive(Debug, Clone)]
pub struct WindowSelector {
    config: WindowConfig,
}

impl WindowSelector {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Select a budgeted, chronologically ordered window
    ///
    /// `turns` must be oldest first. Reserves that exceed the budget yield an
    /// empty, degraded window rather than an error.
    pub fn select(
        &self,
        scorer: &Scorer,
        turns: &[ConversationTurn],
        summaries: &[ConversationSummary],
        query: &str,
        attachments: &[AttachmentContext],
        token_budget: usize,
    ) -> ContextWindow {
        let system_reserve = self.config.system_reserve;
        let query_tokens = scorer.estimate_tokens(query);
        let attachment_tokens: usize = attachments
            .iter()
            .map(|a| scorer.estimate_tokens(&a.summary))
            .sum();

        let prompt_tokens = query_tokens + attachment_tokens;
        let available_tokens = token_budget.saturating_sub(system_reserve + prompt_tokens);

        if available_tokens == 0 && !turns.is_empty() {
            debug!(
                "Reserves exhaust budget: reserve={}, query={}, attachments={}, budget={}",
                system_reserve, query_tokens, attachment_tokens, token_budget
            );
        }

        let selected = self.pack(scorer, turns, query, available_tokens);
        let selected_tokens: usize = selected.iter().map(|t| t.tokens_used).sum();

        let messages = selected
            .iter()
            .flat_map(|t| t.messages())
            .cloned()
            .collect();

        let summary = self
            .find_relevant_summary(summaries, query)
            .map(|s| s.summary_text.clone());
        let key_points = self.extract_key_points(&selected);

        // Prompt charge is capped at the budget so totals stay within budget + reserve
        let total_tokens = selected_tokens + system_reserve + prompt_tokens.min(token_budget);

        debug!(
            "Selected {}/{} turns ({} tokens, {} available), total={}",
            selected.len(),
            turns.len(),
            selected_tokens,
            available_tokens,
            total_tokens
        );

        ContextWindow {
            messages,
            total_tokens,
            summary,
            key_points,
            selected_turn_ids: selected.iter().map(|t| t.id.clone()).collect(),
            query_tokens,
            attachment_tokens,
            available_tokens,
        }
    }

    /// Rank and pack turns, returning the accepted ones oldest first
    fn pack<'a>(
        &self,
        scorer: &Scorer,
        turns: &'a [ConversationTurn],
        query: &str,
        available_tokens: usize,
    ) -> Vec<&'a ConversationTurn> {
        let mut ranked = scorer.rank(turns, query);
        // Newest first so that equal scores favour recent turns
        ranked.reverse();
        ranked.sort_by(|a, b| b.1.total.partial_cmp(&a.1.total).unwrap_or(Ordering::Equal));

        let mut selected = Vec::new();
        let mut used = 0usize;

        for (turn, score) in ranked {
            if used + turn.tokens_used <= available_tokens {
                used += turn.tokens_used;
                selected.push(turn);
                continue;
            }

            match self.config.policy {
                SelectionPolicy::GreedyStop => {
                    debug!(
                        "Turn {} (score {:.3}, {} tokens) does not fit, stopping",
                        turn.id, score.total, turn.tokens_used
                    );
                    break;
                }
                SelectionPolicy::BestFit => {
                    debug!(
                        "Turn {} (score {:.3}, {} tokens) does not fit, skipping",
                        turn.id, score.total, turn.tokens_used
                    );
                }
            }
        }

        selected.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        selected
    }

    /// Most relevant summary whose score clears the threshold
    ///
    /// Score is one point per key topic found in the query plus the keyword
    /// Jaccard index against the summary text. Earlier summaries win ties.
    pub fn find_relevant_summary<'a>(
        &self,
        summaries: &'a [ConversationSummary],
        query: &str,
    ) -> Option<&'a ConversationSummary> {
        let query_lower = query.to_lowercase();
        let mut best: Option<(&ConversationSummary, f64)> = None;

        for summary in summaries {
            let topic_hits = summary
                .key_topics
                .iter()
                .filter(|topic| query_lower.contains(&topic.to_lowercase()))
                .count();
            let score = topic_hits as f64 + text::keyword_jaccard(query, &summary.summary_text);

            if best.map_or(score > 0.0, |(_, best_score)| score > best_score) {
                best = Some((summary, score));
            }
        }

        best.filter(|(_, score)| *score > self.config.summary_relevance_threshold)
            .map(|(summary, _)| summary)
    }

    /// Emphasized sentences and short code fragments, in turn order
    pub fn extract_key_points(&self, turns: &[&ConversationTurn]) -> Vec<String> {
        let mut points = Vec::new();

        for turn in turns {
            for sentence in text::sentences(&turn.assistant_message.content) {
                if sentence.chars().count() > MIN_KEY_POINT_CHARS
                    && text::contains_any(sentence, EMPHASIS_MARKERS)
                {
                    points.push(sentence.to_string());
                }
            }

            points.extend(
                turn.code_blocks
                    .iter()
                    .filter(|code| code.chars().count() < MAX_KEY_POINT_CODE_CHARS)
                    .map(|code| format!("Code: {}", code)),
            );
        }

        points.truncate(self.config.max_key_points);
        points
    }
}
