//! Engine configuration
//!
//! Every section can be supplied from a TOML file and overridden through
//! `CONTEXT__<SECTION>__<FIELD>` environment variables, e.g.
//! `CONTEXT__WINDOW__SYSTEM_RESERVE=600`.

use crate::context::SelectionPolicy;
use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CONTEXT";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub summarization: SummarizationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

impl Config {
    /// Load configuration from an optional TOML file layered under environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let config: Config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config: Config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.history.validate()?;
        self.scoring.validate()?;
        self.window.validate()?;
        self.summarization.validate()?;
        Ok(())
    }
}

/// Turn store sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum resident turns before FIFO overflow drops the oldest
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize { 1000 }

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl HistoryConfig {
    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ContextError::Configuration(
                "history.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Importance and relevance weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Multiplier when the assistant reply contains code
    #[serde(default = "default_code_weight")]
    pub code_weight: f64,

    /// Multiplier when the turn references attachments
    #[serde(default = "default_attachment_weight")]
    pub attachment_weight: f64,

    /// Per-position recency discount, in (0, 1)
    #[serde(default = "default_decay")]
    pub decay: f64,

    /// Weight of the external similarity score
    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f64,

    /// Weight of the keyword Jaccard score
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    /// Upper clamp for importance
    #[serde(default = "default_max_importance")]
    pub max_importance: f64,
}

fn default_code_weight() -> f64 { 1.5 }
fn default_attachment_weight() -> f64 { 1.3 }
fn default_decay() -> f64 { 0.95 }
fn default_similarity_weight() -> f64 { 0.5 }
fn default_keyword_weight() -> f64 { 0.3 }
fn default_max_importance() -> f64 { 3.0 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            code_weight: default_code_weight(),
            attachment_weight: default_attachment_weight(),
            decay: default_decay(),
            similarity_weight: default_similarity_weight(),
            keyword_weight: default_keyword_weight(),
            max_importance: default_max_importance(),
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(ContextError::Configuration(format!(
                "scoring.decay must be in (0, 1), got {}",
                self.decay
            )));
        }
        if self.code_weight <= 0.0 || self.attachment_weight <= 0.0 {
            return Err(ContextError::Configuration(
                "scoring weights must be positive".to_string(),
            ));
        }
        if self.similarity_weight < 0.0 || self.keyword_weight < 0.0 {
            return Err(ContextError::Configuration(
                "relevance weights must not be negative".to_string(),
            ));
        }
        if self.max_importance < 1.0 {
            return Err(ContextError::Configuration(format!(
                "scoring.max_importance must be at least 1.0, got {}",
                self.max_importance
            )));
        }
        Ok(())
    }
}

/// Window selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Budget used when the caller does not pass one
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Tokens held back for the system message
    #[serde(default = "default_system_reserve")]
    pub system_reserve: usize,

    /// Minimum score for attaching a prior-period summary
    #[serde(default = "default_summary_threshold")]
    pub summary_relevance_threshold: f64,

    /// Cap on extracted key points
    #[serde(default = "default_max_key_points")]
    pub max_key_points: usize,

    /// How candidates are packed into the budget
    #[serde(default)]
    pub policy: SelectionPolicy,
}

fn default_max_context_tokens() -> usize { 8000 }
fn default_system_reserve() -> usize { 500 }
fn default_summary_threshold() -> f64 { 0.5 }
fn default_max_key_points() -> usize { 10 }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            system_reserve: default_system_reserve(),
            summary_relevance_threshold: default_summary_threshold(),
            max_key_points: default_max_key_points(),
            policy: SelectionPolicy::default(),
        }
    }
}

impl WindowConfig {
    fn validate(&self) -> Result<()> {
        if self.summary_relevance_threshold < 0.0 {
            return Err(ContextError::Configuration(
                "window.summary_relevance_threshold must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Background summarization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    /// Enable threshold-triggered summarization
    #[serde(default = "default_summarization_enabled")]
    pub enabled: bool,

    /// Store size that triggers a pass; half of it is compressed per pass
    #[serde(default = "default_summarization_threshold")]
    pub threshold: usize,

    /// Summaries whose period ended longer ago than this are pruned
    #[serde(default)]
    pub max_summary_age_secs: Option<u64>,
}

fn default_summarization_enabled() -> bool { true }
fn default_summarization_threshold() -> usize { 20 }

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: default_summarization_enabled(),
            threshold: default_summarization_threshold(),
            max_summary_age_secs: None,
        }
    }
}

impl SummarizationConfig {
    fn validate(&self) -> Result<()> {
        if self.threshold < 2 {
            return Err(ContextError::Configuration(format!(
                "summarization.threshold must be at least 2, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Number of oldest turns compressed per pass
    pub fn block_size(&self) -> usize {
        self.threshold / 2
    }

    /// Get the summary retention age as Duration
    pub fn max_summary_age(&self) -> Option<Duration> {
        self.max_summary_age_secs.map(Duration::from_secs)
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// System message preamble used by prompt assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

fn default_preamble() -> String {
    "You are a helpful AI coding assistant.".to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            preamble: default_preamble(),
        }
    }
}
