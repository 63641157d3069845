//! Token estimation adapters
//!
//! The engine never tokenizes text itself. It asks a [`TokenEstimator`], and
//! when that adapter is missing or fails it falls back to the word heuristic
//! of ~1.3 tokens per word.

use crate::error::AdapterError;
use crate::metrics::METRICS;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::{debug, warn};

/// Tokens per whitespace-separated word used by the fallback heuristic
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Count tokens, reporting adapter failures
    fn try_estimate(&self, text: &str) -> Result<usize, AdapterError>;

    /// Count tokens, degrading to the word heuristic on failure
    fn estimate(&self, text: &str) -> usize {
        self.try_estimate(text)
            .unwrap_or_else(|_| WordBasedEstimator::default().count(text))
    }

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Tiktoken-based token estimator using cl100k_base (GPT-4, GPT-3.5-turbo)
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create a new tiktoken estimator with cl100k_base encoding
    pub fn new() -> Result<Self, AdapterError> {
        let bpe = cl100k_base().map_err(|e| AdapterError::Unavailable(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn try_estimate(&self, text: &str) -> Result<usize, AdapterError> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }

    fn name(&self) -> &'static str {
        "tiktoken"
    }
}

/// Word-based token estimator (fallback, ~1.3 tokens per word)
#[derive(Debug, Clone, Copy)]
pub struct WordBasedEstimator {
    tokens_per_word: f64,
}

impl WordBasedEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }

    /// Infallible word-count estimate, rounded up
    pub fn count(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }
}

impl Default for WordBasedEstimator {
    fn default() -> Self {
        Self::new(TOKENS_PER_WORD)
    }
}

impl TokenEstimator for WordBasedEstimator {
    fn try_estimate(&self, text: &str) -> Result<usize, AdapterError> {
        Ok(self.count(text))
    }

    fn name(&self) -> &'static str {
        "word_based"
    }
}

/// Wraps an optional primary estimator and degrades silently to word counts
///
/// The choice of primary is made once, at construction.
pub struct FallbackEstimator {
    primary: Option<Arc<dyn TokenEstimator>>,
    fallback: WordBasedEstimator,
}

impl FallbackEstimator {
    pub fn new(primary: Arc<dyn TokenEstimator>) -> Self {
        Self {
            primary: Some(primary),
            fallback: WordBasedEstimator::default(),
        }
    }

    /// Only the word heuristic
    pub fn word_based() -> Self {
        Self {
            primary: None,
            fallback: WordBasedEstimator::default(),
        }
    }

    /// Use tiktoken when it initializes, otherwise the word heuristic
    pub fn detect() -> Self {
        match TiktokenEstimator::new() {
            Ok(estimator) => {
                debug!("Using tiktoken for token estimation");
                Self::new(Arc::new(estimator))
            }
            Err(e) => {
                warn!("Tokenizer unavailable, falling back to word counts: {}", e);
                Self::word_based()
            }
        }
    }

    /// Name of the estimator that answers when it succeeds
    pub fn primary_name(&self) -> &'static str {
        self.primary
            .as_ref()
            .map(|p| p.name())
            .unwrap_or_else(|| self.fallback.name())
    }
}

impl TokenEstimator for FallbackEstimator {
    fn try_estimate(&self, text: &str) -> Result<usize, AdapterError> {
        Ok(self.estimate(text))
    }

    fn estimate(&self, text: &str) -> usize {
        let Some(primary) = &self.primary else {
            return self.fallback.count(text);
        };

        match primary.try_estimate(text) {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!("{} estimator failed, using word counts: {}", primary.name(), e);
                METRICS.record_adapter_fallback("tokenizer");
                self.fallback.count(text)
            }
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenEstimator;

    impl TokenEstimator for BrokenEstimator {
        fn try_estimate(&self, _text: &str) -> Result<usize, AdapterError> {
            Err(AdapterError::Failed("model not loaded".to_string()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_tiktoken_estimator() {
        let estimator = TiktokenEstimator::new().unwrap();
        let text = "Hello, world! This is a test.";
        let tokens = estimator.estimate(text);
        assert!(tokens > 0);
        assert!(tokens < 20);
    }

    #[test]
    fn test_word_based_estimator() {
        let estimator = WordBasedEstimator::default();
        let text = "Hello world test";
        let tokens = estimator.estimate(text);
        assert_eq!(tokens, 4); // 3 words * 1.3 = 3.9 -> 4
    }

    #[test]
    fn test_word_based_empty_text() {
        assert_eq!(WordBasedEstimator::default().count("   "), 0);
    }

    #[test]
    fn test_fallback_on_failure() {
        let estimator = FallbackEstimator::new(Arc::new(BrokenEstimator));
        // 10 words * 1.3 = 13
        let text = "one two three four five six seven eight nine ten";
        assert_eq!(estimator.estimate(text), 13);
        assert!(estimator.try_estimate(text).is_ok());
    }

    #[test]
    fn test_word_based_only() {
        let estimator = FallbackEstimator::word_based();
        assert_eq!(estimator.primary_name(), "word_based");
        assert_eq!(estimator.estimate("fix the login bug"), 6); // 4 * 1.3 = 5.2 -> 6
    }

    #[test]
    fn test_batch_estimation() {
        let estimator = WordBasedEstimator::default();
        let texts = vec!["Hello", "world", "test"];
        let tokens = estimator.estimate_batch(&texts);
        assert_eq!(tokens, vec![2, 2, 2]);
    }
}
