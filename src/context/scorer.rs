//! Importance and relevance scoring
//!
//! Importance is a fixed property of a turn computed once at creation.
//! Relevance is recomputed for every query from importance, recency
//! position, semantic similarity and keyword overlap.

use super::models::{ChatMessage, ConversationTurn};
use super::similarity::SimilarityScorer;
use super::text;
use super::token_estimator::TokenEstimator;
use crate::config::ScoringConfig;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terms in the user message that mark a complex request
pub const COMPLEXITY_KEYWORDS: &[&str] = &[
    "implement",
    "create",
    "build",
    "design",
    "architecture",
    "debug",
    "fix",
    "error",
    "problem",
    "issue",
    "explain",
    "how",
    "why",
    "what",
    "when",
];

/// Bonus per complexity keyword occurrence
const COMPLEXITY_BONUS: f64 = 0.1;

/// Assistant reply length thresholds (chars) and their multipliers, largest first
const LENGTH_BONUSES: &[(usize, f64)] = &[(1000, 1.4), (500, 1.2)];

/// Breakdown of a turn's relevance to one query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    /// Importance discounted by recency position
    pub recency_weighted: f64,
    /// External similarity in [-1, 1], 0 when unavailable
    pub similarity: f64,
    /// Keyword Jaccard index in [0, 1]
    pub keyword_overlap: f64,
    /// Weighted total
    pub total: f64,
}

/// Scores turns for importance and per-query relevance
pub struct Scorer {
    config: ScoringConfig,
    estimator: Arc<dyn TokenEstimator>,
    similarity: Arc<dyn SimilarityScorer>,
}

impl Scorer {
    pub fn new(
        config: ScoringConfig,
        estimator: Arc<dyn TokenEstimator>,
        similarity: Arc<dyn SimilarityScorer>,
    ) -> Self {
        Self {
            config,
            estimator,
            similarity,
        }
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// Token estimate via the configured adapter
    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    /// Creation-time importance, clamped to [1.0, max_importance]
    pub fn importance(
        &self,
        user: &str,
        assistant: &str,
        code_blocks: &[String],
        attachments: &[String],
    ) -> f64 {
        let mut score = 1.0;

        if !code_blocks.is_empty() {
            score *= self.config.code_weight;
        }

        if !attachments.is_empty() {
            score *= self.config.attachment_weight;
        }

        let reply_len = assistant.chars().count();
        if let Some((_, bonus)) = LENGTH_BONUSES.iter().find(|(min, _)| reply_len > *min) {
            score *= bonus;
        }

        let complexity = text::count_occurrences(user, COMPLEXITY_KEYWORDS);
        score += complexity as f64 * COMPLEXITY_BONUS;

        score.clamp(1.0, self.config.max_importance)
    }

    /// Build an immutable turn with its token count and importance fixed
    pub fn build_turn(
        &self,
        user: &str,
        assistant: &str,
        attachments: Vec<String>,
    ) -> ConversationTurn {
        let timestamp = Utc::now();
        let code_blocks = text::extract_code_blocks(assistant);
        let tokens_used = self.estimate_tokens(&format!("{} {}", user, assistant));
        let importance_score = self.importance(user, assistant, &code_blocks, &attachments);

        ConversationTurn {
            id: ConversationTurn::compute_id(user, assistant, &timestamp),
            seq: 0,
            user_message: ChatMessage::user(user),
            assistant_message: ChatMessage::assistant(assistant),
            timestamp,
            tokens_used,
            importance_score,
            code_blocks,
            attachments,
        }
    }

    /// Relevance of a turn at reverse-chronological `position` (0 = newest)
    pub fn relevance(&self, turn: &ConversationTurn, position: usize, query: &str) -> RelevanceScore {
        let turn_text = turn.text();
        let recency_weighted = turn.importance_score * self.config.decay.powi(position as i32);
        let similarity = self.similarity.similarity_or_zero(query, &turn_text);
        let keyword_overlap = text::keyword_jaccard(query, &turn_text);

        RelevanceScore {
            recency_weighted,
            similarity,
            keyword_overlap,
            total: recency_weighted
                + similarity * self.config.similarity_weight
                + keyword_overlap * self.config.keyword_weight,
        }
    }

    /// Score turns given oldest first; results are in the same order
    pub fn rank<'a>(
        &self,
        turns: &'a [ConversationTurn],
        query: &str,
    ) -> Vec<(&'a ConversationTurn, RelevanceScore)> {
        let newest = turns.len().saturating_sub(1);
        turns
            .iter()
            .enumerate()
            .map(|(idx, turn)| (turn, self.relevance(turn, newest - idx, query)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::similarity::NoSimilarity;
    use crate::context::token_estimator::FallbackEstimator;
    use crate::error::AdapterError;

    fn scorer() -> Scorer {
        Scorer::new(
            ScoringConfig::default(),
            Arc::new(FallbackEstimator::word_based()),
            Arc::new(NoSimilarity),
        )
    }

    /// Similarity of 1.0 for texts sharing the word "cache", else 0
    struct CacheSimilarity;

    impl SimilarityScorer for CacheSimilarity {
        fn similarity(&self, a: &str, b: &str) -> Result<f32, AdapterError> {
            Ok(if a.contains("cache") && b.contains("cache") { 1.0 } else { 0.0 })
        }
    }

    #[test]
    fn test_plain_turn_has_base_importance() {
        let s = scorer();
        assert_eq!(s.importance("Question 1", "Answer 1", &[], &[]), 1.0);
    }

    #[test]
    fn test_long_code_reply_importance() {
        let s = scorer();
        let mut reply = String::from("```rust\nfn main() {}\n```\n");
        reply.push_str(&"x".repeat(1200 - reply.len()));
        assert_eq!(reply.len(), 1200);

        let turn = s.build_turn("Give me the snippet", &reply, vec![]);
        assert!(turn.has_code());
        assert!((turn.importance_score - 2.1).abs() < 1e-9);
    }

    #[test]
    fn test_medium_reply_gets_smaller_bonus() {
        let s = scorer();
        let reply = "y".repeat(600);
        assert!((s.importance("ok", &reply, &[], &[]) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_complexity_keywords_counted_per_occurrence() {
        let s = scorer();
        // "why" twice and "fix" once
        let score = s.importance("Why? Why can't I fix it", "short", &[], &[]);
        assert!((score - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_importance_is_clamped() {
        let s = scorer();
        let user = "how why what when implement create build design debug fix error ".repeat(5);
        let reply = format!("```x```{}", "z".repeat(1500));
        let score = s.importance(&user, &reply, &["```x```".to_string()], &["doc".to_string()]);
        assert_eq!(score, 3.0);
    }

    #[test]
    fn test_build_turn_counts_tokens_of_joined_text() {
        let s = scorer();
        let turn = s.build_turn("fix the bug", "done now", vec!["a1".to_string()]);
        // 5 words * 1.3 = 6.5 -> 7
        assert_eq!(turn.tokens_used, 7);
        assert!(turn.has_attachments());
        assert_eq!(turn.id.len(), 12);
    }

    #[test]
    fn test_relevance_decays_with_position() {
        let s = scorer();
        let turn = s.build_turn("Question", "Answer", vec![]);
        let newest = s.relevance(&turn, 0, "unrelated");
        let older = s.relevance(&turn, 2, "unrelated");
        assert!((newest.total - 1.0).abs() < 1e-9);
        assert!((older.total - 0.95 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_relevance_adds_similarity_and_keywords() {
        let s = Scorer::new(
            ScoringConfig::default(),
            Arc::new(FallbackEstimator::word_based()),
            Arc::new(CacheSimilarity),
        );
        let turn = s.build_turn("cache invalidation", "cache invalidation", vec![]);
        let score = s.relevance(&turn, 0, "cache invalidation");
        assert_eq!(score.similarity, 1.0);
        assert_eq!(score.keyword_overlap, 1.0);
        assert!((score.total - (1.0 + 0.5 + 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_rank_assigns_newest_position_zero() {
        let s = scorer();
        let turns = vec![
            s.build_turn("first", "one", vec![]),
            s.build_turn("second", "two", vec![]),
        ];
        let ranked = s.rank(&turns, "nothing");
        assert!(ranked[1].1.total > ranked[0].1.total);
        assert!((ranked[0].1.recency_weighted - 0.95).abs() < 1e-9);
    }
}
