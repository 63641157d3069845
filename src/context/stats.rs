//! Aggregate conversation statistics

use super::models::{ConversationSummary, ConversationTurn};
use serde::{Deserialize, Serialize};

/// Read-only snapshot of the engine's state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    /// Turns currently resident
    pub total_turns: usize,
    /// Tokens of resident turns
    pub total_tokens: usize,
    /// Mean importance of resident turns, two decimals; 0 when empty
    pub average_importance: f64,
    pub turns_with_code: usize,
    pub turns_with_attachments: usize,
    pub summaries_created: usize,
    pub tokens_saved_by_summaries: i64,
    /// Turns lost to capacity overflow rather than summarization
    pub overflow_drops: u64,
}

impl ConversationStats {
    pub fn compute<'a>(
        turns: impl IntoIterator<Item = &'a ConversationTurn>,
        summaries: &[ConversationSummary],
        overflow_drops: u64,
    ) -> Self {
        let mut stats = Self {
            summaries_created: summaries.len(),
            tokens_saved_by_summaries: summaries.iter().map(|s| s.tokens_saved).sum(),
            overflow_drops,
            ..Self::default()
        };

        let mut importance_sum = 0.0;
        for turn in turns {
            stats.total_turns += 1;
            stats.total_tokens += turn.tokens_used;
            importance_sum += turn.importance_score;
            if turn.has_code() {
                stats.turns_with_code += 1;
            }
            if turn.has_attachments() {
                stats.turns_with_attachments += 1;
            }
        }

        if stats.total_turns > 0 {
            let mean = importance_sum / stats.total_turns as f64;
            stats.average_importance = (mean * 100.0).round() / 100.0;
        }

        stats
    }
}
