//! Conversation context management under a token budget
//!
//! Turns are scored once when recorded, ranked against each new query, and
//! packed into a [`ContextWindow`] that fits the caller's budget. Old history
//! is compressed into extractive summaries in the background.

pub mod manager;
pub mod models;
pub mod prompt;
pub mod scorer;
pub mod selector;
pub mod similarity;
pub mod stats;
pub mod summarizer;
pub mod text;
pub mod token_estimator;
pub mod turn_store;

pub use manager::{ContextManager, ConversationReport, SummarizationOutcome};
pub use models::{
    AttachmentContext, ChatMessage, ContextWindow, ConversationSummary, ConversationTurn,
    MessageRole,
};
pub use prompt::PromptAssembler;
pub use scorer::{RelevanceScore, Scorer};
pub use selector::{SelectionPolicy, WindowSelector};
pub use similarity::{Embedder, EmbeddingSimilarity, NoSimilarity, SimilarityScorer};
pub use stats::ConversationStats;
pub use summarizer::{ExtractiveSummarizer, Summarizer};
pub use token_estimator::{FallbackEstimator, TiktokenEstimator, TokenEstimator, WordBasedEstimator};
pub use turn_store::TurnStore;
