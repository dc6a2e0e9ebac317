//! Directory listing via `ls -la`.

use async_trait::async_trait;
use harness_core::error::ToolError;
use harness_core::tool::Tool;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{required_str, run_command};

pub struct ListDirTool;

fn failed(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "list_dir".into(),
        reason: reason.into(),
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List directory contents with detailed metadata"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path to list"}
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

        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => failed("path not found"),
            std::io::ErrorKind::PermissionDenied => failed("permission denied"),
            _ => failed(e.to_string()),
        })?;
        if !metadata.is_dir() {
            return Err(failed("not a directory"));
        }

        debug!(path = %path, "Listing directory");

        let mut command = Command::new("ls");
        command.arg("-la").arg(path);
        let output = run_command(command, cancel).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("Permission denied") {
                return Err(failed("permission denied"));
            }
            return Err(failed(if stderr.is_empty() {
                format!("ls exited with {}", output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .trim_end_matches('\n')
            .to_string())
    }
}
