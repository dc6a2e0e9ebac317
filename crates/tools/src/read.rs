//! Read tool: file contents, optionally limited to a line range.

use async_trait::async_trait;
use harness_core::error::ToolError;
use harness_core::tool::Tool;
use tokio_util::sync::CancellationToken;

use crate::required_str;

pub struct ReadTool;

fn failed(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "read".into(),
        reason: reason.into(),
    }
}

/// Read an optional 1-indexed line argument.
fn line_arg(input: &serde_json::Value, key: &str) -> Result<Option<usize>, ToolError> {
    match &input[key] {
        serde_json::Value::Null => Ok(None),
        v => match v.as_i64() {
            Some(n) if n >= 1 => Ok(Some(n as usize)),
            Some(_) => Err(ToolError::InvalidArguments(format!("{key} must be at least 1"))),
            None => Err(ToolError::InvalidArguments(format!("{key} must be an integer"))),
        },
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read file contents, optionally specifying a line range"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute or relative file path"},
                "start_line": {"type": "integer", "description": "First line to read (1-indexed)"},
                "end_line": {"type": "integer", "description": "Last line to read (inclusive)"}
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let path = required_str(&input, "path")?;
        let start = line_arg(&input, "start_line")?;
        let end = line_arg(&input, "end_line")?;

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ToolError::InvalidArguments(
                    "start_line cannot be greater than end_line".into(),
                ));
            }
        }

        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => failed("file not found"),
            std::io::ErrorKind::PermissionDenied => failed("permission denied"),
            _ => failed(e.to_string()),
        })?;
        if metadata.is_dir() {
            return Err(failed("path is a directory"));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| failed(format!("error reading file: {e}")))?;

        if start.is_none() && end.is_none() {
            return Ok(content);
        }

        let first = start.unwrap_or(1);
        let total = content.lines().count();
        if start.is_some() && first > total {
            return Err(failed(format!(
                "start_line {first} exceeds file length of {total} lines"
            )));
        }

        let take = end.map_or(usize::MAX, |e| e + 1 - first);
        Ok(content
            .lines()
            .skip(first - 1)
            .take(take)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
