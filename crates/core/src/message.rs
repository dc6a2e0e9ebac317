//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the agent loop:
//! a user prompt becomes a user message, every provider turn becomes one
//! assistant message, and every tool batch becomes one user message carrying
//! tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolOutcome};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (prompts and tool results)
    User,
    /// The model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One unit of content inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },

    /// A tool invocation requested by the model
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The outcome of a tool invocation, sent back to the model
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },

    /// Extended thinking output
    Reasoning {
        text: String,
        /// Opaque signature the provider requires when the block is replayed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// Encrypted extended thinking; replayed to the provider verbatim
    RedactedReasoning { data: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A single message in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a user message holding a single text block.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(content)],
        }
    }

    /// Create an assistant message from reconstructed content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Wrap tool outcomes, in executed order, as one user message.
    pub fn tool_results(outcomes: &[ToolOutcome]) -> Self {
        Self {
            role: Role::User,
            content: outcomes
                .iter()
                .map(|o| ContentBlock::ToolResult {
                    tool_use_id: o.id.clone(),
                    content: o.content.clone(),
                    is_error: o.is_error,
                })
                .collect(),
        }
    }

    /// Extract the tool calls requested in this message, in block order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// An ordered, append-only sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, agent!");
        assert!(msg.tool_calls().is_empty());
    }

    #[test]
    fn tool_calls_preserve_block_order() {
        let msg = Message::assistant(vec![
            ContentBlock::text("Let me look"),
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "read".into(),
                input: serde_json::json!({"path": "a.txt"}),
            },
            ContentBlock::Reasoning {
                text: "hmm".into(),
                signature: None,
            },
            ContentBlock::ToolUse {
                id: "toolu_2".into(),
                name: "grep".into(),
                input: serde_json::json!({"pattern": "x", "path": "."}),
            },
        ]);

        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[1].name, "grep");
        assert_eq!(calls[0].input["path"], "a.txt");
    }

    #[test]
    fn tool_results_wrap_outcomes_as_user_message() {
        let outcomes = vec![
            ToolOutcome::success("toolu_1", "ok"),
            ToolOutcome::error("toolu_2", "boom"),
        ];
        let msg = Message::tool_results(&outcomes);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content.len(), 2);
        match &msg.content[1] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "toolu_2");
                assert_eq!(content, "boom");
                assert!(is_error);
            }
            other => panic!("Expected tool_result block, got {other:?}"),
        }
    }

    #[test]
    fn content_block_serialization_is_tagged() {
        let json = serde_json::to_string(&ContentBlock::text("hi")).unwrap();
        assert_eq!(json, r#"{"type":"text","text":"hi"}"#);
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.len(), 1);
        assert!(conv.updated_at >= created);
        assert_eq!(conv.last().map(|m| m.role), Some(Role::User));
    }
}
