//! Built-in tool implementations for Harness.
//!
//! Tools give the agent read-only access to the local filesystem:
//! read files, list directories, and search with grep.

pub mod grep;
pub mod list_dir;
pub mod read;

use harness_core::error::ToolError;
use harness_core::tool::ToolRegistry;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(read::ReadTool));
    registry.register(Box::new(list_dir::ListDirTool));
    registry.register(Box::new(grep::GrepTool));
    registry
}

/// Fetch a required, non-empty string argument.
fn required_str<'a>(input: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    input[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is required")))
}

/// Run `command` to completion unless `cancel` fires first, in which case
/// the child is killed.
async fn run_command(
    mut command: Command,
    cancel: &CancellationToken,
) -> Result<std::process::Output, ToolError> {
    command.kill_on_drop(true);
    tokio::select! {
        _ = cancel.cancelled() => Err(ToolError::Cancelled),
        output = command.output() => Ok(output?),
    }
}
