//! Error types for context management

use thiserror::Error;

/// Result type for context operations
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced by the context engine
///
/// Only construction, configuration and the explicit summarizer seam can
/// fail. Window building and turn recording degrade instead of erroring.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by external tokenizer/embedding adapters
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("Adapter unavailable: {0}")]
    Unavailable(String),

    #[error("Adapter failed: {0}")]
    Failed(String),
}
