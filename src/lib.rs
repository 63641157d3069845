//! Token-budgeted conversation history
//!
//! Keeps a bounded, relevance-ranked window of past exchanges for a
//! text-generation backend, compressing old turns into summaries.

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use config::Config;
pub use context::{
    AttachmentContext, ContextManager, ContextWindow, ConversationStats, ConversationSummary,
    ConversationTurn, SelectionPolicy,
};
pub use error::{AdapterError, ContextError, Result};
