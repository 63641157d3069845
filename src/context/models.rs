//! Data models for conversation context management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A role-tagged message handed to the generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// One completed user/assistant exchange
///
/// Token count and importance are fixed at construction. Recency decay is
/// applied at selection time and never written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    /// Store-assigned ordering key; zero until appended
    pub seq: u64,
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    pub timestamp: DateTime<Utc>,
    pub tokens_used: usize,
    pub importance_score: f64,
    pub code_blocks: Vec<String>,
    pub attachments: Vec<String>,
}

impl ConversationTurn {
    /// Derive a short turn id from the exchange and its creation time
    ///
    /// Ids are not unique keys; two identical exchanges recorded in the same
    /// instant share one.
    pub fn compute_id(user: &str, assistant: &str, timestamp: &DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user.as_bytes());
        hasher.update(assistant.as_bytes());
        hasher.update(timestamp.to_rfc3339().as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }

    /// Text used for similarity and keyword matching
    pub fn text(&self) -> String {
        format!(
            "{} {}",
            self.user_message.content, self.assistant_message.content
        )
    }

    pub fn has_code(&self) -> bool {
        !self.code_blocks.is_empty()
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// The user and assistant messages in order
    pub fn messages(&self) -> [&ChatMessage; 2] {
        [&self.user_message, &self.assistant_message]
    }
}

/// Opaque attachment context supplied by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentContext {
    pub id: String,
    pub summary: String,
    #[serde(default = "default_relevance")]
    pub relevance_score: f64,
}

fn default_relevance() -> f64 {
    1.0
}

impl AttachmentContext {
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            relevance_score: default_relevance(),
        }
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = score;
        self
    }
}

/// Budgeted, chronologically ordered context for one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextWindow {
    pub messages: Vec<ChatMessage>,
    pub total_tokens: usize,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub selected_turn_ids: Vec<String>,
    /// Tokens of the query itself, uncapped
    pub query_tokens: usize,
    /// Tokens of all attachment summaries, uncapped
    pub attachment_tokens: usize,
    /// Budget left for turns after reserves; zero when reserves exhausted it
    pub available_tokens: usize,
}

impl ContextWindow {
    /// No history was selected
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Reserves alone consumed the whole budget
    pub fn is_degraded(&self) -> bool {
        self.available_tokens == 0
    }
}

/// Compressed rollup of an evicted block of turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub summary_text: String,
    pub key_topics: Vec<String>,
    pub important_code: Vec<String>,
    pub decisions_made: Vec<String>,
    /// Original tokens minus estimated summary tokens; negative if the summary grew
    pub tokens_saved: i64,
    pub turns_covered: usize,
    pub created_at: DateTime<Utc>,
}
