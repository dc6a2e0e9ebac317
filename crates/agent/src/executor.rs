//! Sequential, fail-fast execution of one turn's tool calls.

use std::time::{Duration, Instant};

use harness_core::error::ToolError;
use harness_core::event::EventListener;
use harness_core::tool::{ToolCall, ToolOutcome, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SLOW_TOOL_THRESHOLD: Duration = Duration::from_secs(5);

/// The batch stopped because the prompt was cancelled.
#[derive(Debug)]
pub struct Interrupted {
    /// Outcomes of the calls that finished before cancellation was seen.
    pub completed: Vec<ToolOutcome>,
}

/// Run `calls` in order, stopping after the first error outcome.
///
/// Every executed call is reported through `listener` as soon as it
/// finishes. Calls after a failure are neither invoked nor reported. An
/// unknown tool name counts as a failed call, not an interruption.
pub async fn execute_batch(
    tools: &ToolRegistry,
    calls: &[ToolCall],
    listener: &dyn EventListener,
    cancel: &CancellationToken,
) -> Result<Vec<ToolOutcome>, Interrupted> {
    let mut outcomes = Vec::with_capacity(calls.len());

    for call in calls {
        if cancel.is_cancelled() {
            return Err(Interrupted {
                completed: outcomes,
            });
        }

        info!(tool = %call.name, id = %call.id, "Tool execution started");
        debug!(tool = %call.name, id = %call.id, input = %call.input, "Tool input");

        let started = Instant::now();
        let result = match tools.get(&call.name) {
            Some(tool) => tool.execute(call.input.clone(), cancel).await,
            None => Err(ToolError::NotFound(call.name.clone())),
        };
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;

        if matches!(result, Err(ToolError::Cancelled)) && cancel.is_cancelled() {
            info!(tool = %call.name, id = %call.id, duration_ms, "Tool execution cancelled");
            return Err(Interrupted {
                completed: outcomes,
            });
        }

        let outcome = match result {
            Ok(output) => {
                info!(tool = %call.name, id = %call.id, duration_ms, success = true, "Tool execution completed");
                ToolOutcome::success(&call.id, output)
            }
            Err(e) => {
                error!(tool = %call.name, id = %call.id, error = %e, duration_ms, "Tool execution failed");
                ToolOutcome::error(&call.id, e.to_string())
            }
        };

        if elapsed > SLOW_TOOL_THRESHOLD {
            warn!(tool = %call.name, id = %call.id, duration_ms, "Slow tool execution");
        }

        listener.on_tool_result(&outcome.id, &outcome.content, outcome.is_error);

        let failed = outcome.is_error;
        outcomes.push(outcome);
        if failed {
            break;
        }
    }

    Ok(outcomes)
}
