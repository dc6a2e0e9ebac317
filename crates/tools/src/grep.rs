//! Pattern search via the system `grep` (basic regular expressions).

use async_trait::async_trait;
use harness_core::error::ToolError;
use harness_core::tool::Tool;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{required_str, run_command};

pub const NO_MATCHES: &str = "No matches found";

pub struct GrepTool;

fn failed(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "grep".into(),
        reason: reason.into(),
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for patterns in files or directories"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Search pattern (BRE regex)"},
                "path": {"type": "string", "description": "File or directory path"},
                "recursive": {"type": "boolean", "description": "Search recursively (default: false)"}
            },
            "required": ["pattern", "path"]
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

        let pattern = required_str(&input, "pattern")?;
        let path = required_str(&input, "path")?;
        let recursive = input["recursive"].as_bool().unwrap_or(false);

        if let Err(e) = tokio::fs::metadata(path).await {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => failed("path not found"),
                std::io::ErrorKind::PermissionDenied => failed("permission denied"),
                _ => failed(e.to_string()),
            });
        }

        debug!(pattern = %pattern, path = %path, recursive, "Running grep");

        let mut command = Command::new("grep");
        command.arg("-n");
        if recursive {
            command.arg("-r");
        }
        command.arg("--").arg(pattern).arg(path);

        let output = run_command(command, cancel).await?;

        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout)
                .trim_end_matches('\n')
                .to_string()),
            Some(1) => Ok(NO_MATCHES.to_string()),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if stderr.is_empty() {
                    Err(failed(format!("grep failed with exit code {code:?}")))
                } else {
                    Err(failed(stderr))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\nworld\nhello again\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.txt"), "say hello\n").unwrap();
        dir
    }

    async fn run(input: serde_json::Value) -> Result<String, ToolError> {
        GrepTool.execute(input, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn matches_with_line_numbers() {
        let dir = fixture();
        let file = dir.path().join("a.txt");
        let out = run(serde_json::json!({"pattern": "hello", "path": file.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(out, "1:hello\n3:hello again");
    }

    #[tokio::test]
    async fn recursive_search_reaches_nested_files() {
        let dir = fixture();
        let out = run(serde_json::json!({
            "pattern": "say",
            "path": dir.path().to_str().unwrap(),
            "recursive": true
        }))
        .await
        .unwrap();
        assert!(out.contains("b.txt:1:say hello"));
    }

    #[tokio::test]
    async fn no_match_is_not_an_error() {
        let dir = fixture();
        let file = dir.path().join("a.txt");
        let out = run(serde_json::json!({"pattern": "zebra", "path": file.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(out, NO_MATCHES);
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let result = run(serde_json::json!({"pattern": "x", "path": "/definitely/not/here"})).await;
        assert!(result.unwrap_err().to_string().contains("path not found"));
    }

    #[tokio::test]
    async fn invalid_pattern_is_an_error() {
        let dir = fixture();
        let file = dir.path().join("a.txt");
        let result = run(serde_json::json!({"pattern": "\\(", "path": file.to_str().unwrap()})).await;
        assert!(result.is_err());
    }
}
