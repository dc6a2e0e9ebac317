//! Provider trait: the abstraction over streaming completion backends.
//!
//! A Provider takes the whole conversation plus tool descriptors and returns
//! a one-shot stream of partial response events. The consumer pulls events
//! from the returned receiver until it is exhausted; a stream can't be
//! restarted, a new turn opens a new one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// One outbound completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-haiku-4-5-20251001")
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// System instruction; `None` when not configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The full conversation so far
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's input (object type, named
    /// properties, optional required list)
    pub input_schema: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A partial response event, in the order the provider emits them.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Start of the assistant message
    MessageStart {
        id: String,
        model: String,
        usage: Option<Usage>,
    },

    /// A new content unit begins at `index`
    ContentBlockStart { index: usize, block: BlockStart },

    /// More data for the content unit at `index`
    ContentBlockDelta { index: usize, delta: BlockDelta },

    /// The content unit at `index` is complete
    ContentBlockStop { index: usize },

    /// Message-level update (stop reason, cumulative usage)
    MessageDelta {
        stop_reason: Option<String>,
        usage: Option<Usage>,
    },

    /// End of the assistant message
    MessageStop,
}

/// The initial shape of a content unit.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockStart {
    Text { text: String },
    ToolUse { id: String, name: String },
    Reasoning { text: String },
    RedactedReasoning { data: String },
}

/// An incremental piece of a content unit.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockDelta {
    Text(String),
    /// A fragment of the tool input JSON document
    InputJson(String),
    Reasoning(String),
    Signature(String),
}

/// The receiving end of a provider stream.
pub type EventReceiver = mpsc::Receiver<Result<StreamEvent, ProviderError>>;

/// The core Provider trait.
///
/// The agent loop calls `stream()` once per turn without knowing which
/// backend answers. Cancellation is the consumer's job: it stops pulling and
/// drops the receiver, which ends the producing side.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Open a streaming completion for `request`.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<EventReceiver, ProviderError>;
}
