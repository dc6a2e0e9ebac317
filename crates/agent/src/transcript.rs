//! Conversation transcript written alongside the event stream.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use harness_config::LogFormat;
use harness_core::event::EventListener;
use tracing::warn;

/// Appends user prompts, assistant text, tool calls and tool results to a
/// file, then forwards every callback to `inner`.
///
/// Reasoning is forwarded but not recorded. Write failures are logged and
/// otherwise ignored.
pub struct TranscriptListener {
    inner: Arc<dyn EventListener>,
    file: Mutex<File>,
    format: LogFormat,
}

impl TranscriptListener {
    pub fn open(
        path: &Path,
        format: LogFormat,
        inner: Arc<dyn EventListener>,
    ) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner,
            file: Mutex::new(file),
            format,
        })
    }

    fn write(&self, entry: Entry<'_>) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = match self.format {
            LogFormat::Text => entry.to_text(&timestamp),
            LogFormat::Json => entry.to_json(&timestamp),
        };
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            warn!(error = %e, "Failed to write transcript entry");
        }
    }
}

enum Entry<'a> {
    User(&'a str),
    Assistant(&'a str),
    ToolCall {
        id: &'a str,
        name: &'a str,
        input: &'a serde_json::Value,
    },
    ToolResult {
        id: &'a str,
        result: &'a str,
        success: bool,
    },
}

impl Entry<'_> {
    fn to_text(&self, timestamp: &str) -> String {
        match self {
            Entry::User(content) => format!("=== {timestamp} USER ===\n{content}\n\n"),
            Entry::Assistant(content) => format!("=== {timestamp} ASSISTANT ===\n{content}\n\n"),
            Entry::ToolCall { id, name, input } => {
                let input = serde_json::to_string_pretty(input).unwrap_or_default();
                format!("=== {timestamp} TOOL_CALL [{name}] id={id} ===\n{input}\n\n")
            }
            Entry::ToolResult {
                id,
                result,
                success,
            } => {
                let status = if *success { "success" } else { "error" };
                format!("=== {timestamp} TOOL_RESULT [{id}] {status} ===\n{result}\n\n")
            }
        }
    }

    fn to_json(&self, timestamp: &str) -> String {
        let value = match self {
            Entry::User(content) => {
                serde_json::json!({"timestamp": timestamp, "type": "user", "content": content})
            }
            Entry::Assistant(content) => {
                serde_json::json!({"timestamp": timestamp, "type": "assistant", "content": content})
            }
            Entry::ToolCall { id, name, input } => serde_json::json!({
                "timestamp": timestamp,
                "type": "tool_call",
                "id": id,
                "name": name,
                "input": input,
            }),
            Entry::ToolResult {
                id,
                result,
                success,
            } => serde_json::json!({
                "timestamp": timestamp,
                "type": "tool_result",
                "id": id,
                "success": success,
                "result": result,
            }),
        };
        format!("{value}\n")
    }
}

impl EventListener for TranscriptListener {
    fn on_user(&self, content: &str) {
        self.write(Entry::User(content));
        self.inner.on_user(content);
    }

    fn on_text(&self, text: &str) {
        self.write(Entry::Assistant(text));
        self.inner.on_text(text);
    }

    fn on_tool_call(&self, id: &str, name: &str, input: &serde_json::Value) {
        self.write(Entry::ToolCall { id, name, input });
        self.inner.on_tool_call(id, name, input);
    }

    fn on_tool_result(&self, id: &str, result: &str, is_error: bool) {
        self.write(Entry::ToolResult {
            id,
            result,
            success: !is_error,
        });
        self.inner.on_tool_result(id, result, is_error);
    }

    fn on_reasoning(&self, text: &str) {
        self.inner.on_reasoning(text);
    }
}
