//! Final prompt assembly for the generation backend

use super::models::{AttachmentContext, ChatMessage, ContextWindow};
use super::text;
use crate::config::PromptConfig;

/// Key points rendered into the system message
const MAX_PROMPT_KEY_POINTS: usize = 5;

/// Attachment summaries are previewed at this many characters
const ATTACHMENT_PREVIEW_CHARS: usize = 200;

/// Turns a [`ContextWindow`] into the role-tagged message list
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    config: PromptConfig,
}

impl PromptAssembler {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// System message, then the window's history, then the current query
    pub fn assemble(
        &self,
        window: &ContextWindow,
        attachments: &[AttachmentContext],
        query: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(window.messages.len() + 2);
        messages.push(ChatMessage::system(self.system_message(window, attachments)));
        messages.extend(window.messages.iter().cloned());
        messages.push(ChatMessage::user(query));
        messages
    }

    fn system_message(&self, window: &ContextWindow, attachments: &[AttachmentContext]) -> String {
        let mut content = self.config.preamble.clone();

        if let Some(summary) = &window.summary {
            content.push_str("\n\nPrevious Conversation Summary:\n");
            content.push_str(summary);
        }

        if !window.key_points.is_empty() {
            content.push_str("\n\nKey Points from Previous Discussion:\n");
            for point in window.key_points.iter().take(MAX_PROMPT_KEY_POINTS) {
                content.push_str(&format!("- {}\n", point));
            }
        }

        if !attachments.is_empty() {
            content.push_str("\n\nAvailable Reference Materials:\n");
            for attachment in attachments {
                content.push_str(&format!(
                    "- {}: {}\n",
                    attachment.id,
                    text::truncate_with_ellipsis(&attachment.summary, ATTACHMENT_PREVIEW_CHARS)
                ));
            }
        }

        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::MessageRole;

    #[test]
    fn test_bare_window() {
        let assembler = PromptAssembler::default();
        let messages = assembler.assemble(&ContextWindow::default(), &[], "hello");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[0].content, "You are a helpful AI coding assistant.");
        assert_eq!(messages[1], ChatMessage::user("hello"));
    }

    #[test]
    fn test_full_system_message() {
        let assembler = PromptAssembler::new(PromptConfig {
            preamble: "You are helpful.".to_string(),
        });
        let window = ContextWindow {
            messages: vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")],
            summary: Some("We fixed the cache.".to_string()),
            key_points: (1..=7).map(|i| format!("point {}", i)).collect(),
            ..ContextWindow::default()
        };
        let attachments = vec![AttachmentContext::new("design.pdf", "x".repeat(250))];

        let messages = assembler.assemble(&window, &attachments, "next?");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "q1");
        assert_eq!(messages[3].content, "next?");

        let system = &messages[0].content;
        assert!(system.starts_with("You are helpful.\n\nPrevious Conversation Summary:\nWe fixed the cache."));
        assert!(system.contains("Key Points from Previous Discussion:\n- point 1\n"));
        assert!(system.contains("- point 5\n"));
        assert!(!system.contains("point 6"));
        assert!(system.contains(&format!("- design.pdf: {}...", "x".repeat(200))));
    }
}
