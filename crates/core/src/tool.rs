//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! read files, list directories, search, etc. The loop only ever sees them
//! through this trait and looks them up by name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool, extracted from an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Input as a JSON value
    pub input: serde_json::Value,
}

/// The result of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The call ID this outcome is for
    pub id: String,

    /// Tool output, or the error text when `is_error`
    pub content: String,

    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// The core Tool trait.
///
/// A returned error is never fatal to the process: it becomes an error
/// outcome that the model sees on its next turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read", "grep").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input.
    ///
    /// `cancel` is the prompt-wide cancellation scope; long-running tools
    /// should observe it.
    async fn execute(
        &self,
        input: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        let schema = self.input_schema();
        let mut input_schema = serde_json::json!({
            "type": "object",
            "properties": schema.get("properties").cloned().unwrap_or_else(|| serde_json::json!({})),
        });
        if let Some(required) = schema.get("required").filter(|r| r.is_array()) {
            input_schema["required"] = required.clone();
        }
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema,
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up tools when the model requests them
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Box<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Box<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}
