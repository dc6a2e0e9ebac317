//! The agent loop: turns until the model stops asking for tools.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use harness_core::error::Error;
use harness_core::event::EventListener;
use harness_core::message::{ContentBlock, Conversation, Message};
use harness_core::provider::{Provider, ProviderRequest, Usage};
use harness_core::tool::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::accumulator;
use crate::executor::{self, Interrupted};
use crate::guard::{ConcurrencyGuard, RunPermit};

pub const DEFAULT_MAX_TURNS: u32 = 10;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Why a prompt stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The last assistant message requested no tools.
    Completed,
    /// The turn budget ran out with tool requests still pending.
    MaxTurns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptOutcome {
    /// Provider round trips made.
    pub turns: u32,
    pub stop: StopReason,
    pub usage: Usage,
}

/// Drives one conversation against a provider.
///
/// The conversation persists across prompts. Only one prompt may run at a
/// time; a second one is rejected with [`Error::PromptInProgress`].
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    listener: Arc<dyn EventListener>,

    model: String,
    max_tokens: u32,
    max_turns: u32,
    system_prompt: Option<String>,

    guard: ConcurrencyGuard,
    history: Mutex<Conversation>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            provider,
            tools,
            listener,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_turns: DEFAULT_MAX_TURNS,
            system_prompt: None,
            guard: ConcurrencyGuard::new(),
            history: Mutex::new(Conversation::new()),
        }
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the turn ceiling. Values below 1 are raised to 1.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max.max(1);
        self
    }

    /// Set the system instruction. An empty string leaves it unset.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.is_empty()).then_some(prompt);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn history(&self) -> MutexGuard<'_, Conversation> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the conversation so far.
    pub fn messages(&self) -> Vec<Message> {
        self.history().messages.clone()
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Cancel the running prompt, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let was_running = self.guard.cancel();
        if was_running {
            info!("Agent loop cancellation requested");
        }
        was_running
    }

    /// Admit a prompt and announce it to the listener.
    ///
    /// Admission is separate from [`run`](Self::run) so a caller can reject
    /// synchronously and then drive the loop on another task.
    pub fn admit(&self, content: &str, parent: &CancellationToken) -> Result<RunPermit, Error> {
        let permit = self.guard.acquire(parent)?;
        self.listener.on_user(content);
        Ok(permit)
    }

    /// Admit and run a prompt to completion.
    pub async fn prompt(
        &self,
        content: impl Into<String>,
        parent: &CancellationToken,
    ) -> Result<PromptOutcome, Error> {
        let content = content.into();
        let permit = self.admit(&content, parent)?;
        self.run(&permit, content).await
    }

    /// Run an admitted prompt.
    ///
    /// The guard stays held until the caller drops `permit`, so anything the
    /// caller reports about the finished run happens before the next prompt
    /// can be admitted.
    pub async fn run(
        &self,
        permit: &RunPermit,
        content: impl Into<String>,
    ) -> Result<PromptOutcome, Error> {
        let started = Instant::now();
        self.history().push(Message::user(content));
        info!(model = %self.model, max_turns = self.max_turns, "Agent loop started");

        let result = self.turns(permit.token()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => info!(
                turns = outcome.turns,
                stop = ?outcome.stop,
                input_tokens = outcome.usage.input_tokens,
                output_tokens = outcome.usage.output_tokens,
                duration_ms,
                "Agent loop completed"
            ),
            Err(e) if e.is_cancelled() => info!(duration_ms, "Agent loop cancelled"),
            Err(e) => error!(error = %e, duration_ms, "Agent loop failed"),
        }

        result
    }

    async fn turns(&self, cancel: &CancellationToken) -> Result<PromptOutcome, Error> {
        let definitions = self.tools.definitions();
        let mut usage = Usage::default();

        for turn in 0..self.max_turns {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let request = ProviderRequest {
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                system: self.system_prompt.clone(),
                messages: self.messages(),
                tools: definitions.clone(),
            };
            info!(
                provider = self.provider.name(),
                model = %request.model,
                messages = request.messages.len(),
                tools = request.tools.len(),
                "Request sent"
            );

            let sent = Instant::now();
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                opened = self.provider.stream(request) => opened,
            };
            let mut rx = opened.inspect_err(|e| error!(error = %e, "Request failed"))?;

            let listener = self.listener.as_ref();
            let assistant = accumulator::consume(&mut rx, cancel, |block| match block {
                ContentBlock::Text { text } => listener.on_text(text),
                ContentBlock::ToolUse { id, name, input } => listener.on_tool_call(id, name, input),
                ContentBlock::Reasoning { text, .. } => listener.on_reasoning(text),
                ContentBlock::ToolResult { .. } | ContentBlock::RedactedReasoning { .. } => {}
            })
            .await
            .inspect_err(|e| {
                if !e.is_cancelled() {
                    error!(error = %e, "Request failed");
                }
            })?;
            drop(rx);

            info!(
                input_tokens = assistant.usage.input_tokens,
                output_tokens = assistant.usage.output_tokens,
                stop_reason = assistant.stop_reason.as_deref().unwrap_or("none"),
                duration_ms = sent.elapsed().as_millis() as u64,
                "Response received"
            );
            usage.input_tokens += assistant.usage.input_tokens;
            usage.output_tokens += assistant.usage.output_tokens;

            let calls = assistant.message.tool_calls();
            self.history().push(assistant.message);
            debug!(turn = turn + 1, tool_calls = calls.len(), "Turn completed");

            if calls.is_empty() {
                return Ok(PromptOutcome {
                    turns: turn + 1,
                    stop: StopReason::Completed,
                    usage,
                });
            }

            let outcomes = executor::execute_batch(&self.tools, &calls, listener, cancel)
                .await
                .map_err(|Interrupted { completed }| {
                    debug!(discarded = completed.len(), "Tool batch interrupted");
                    Error::Cancelled
                })?;
            self.history().push(Message::tool_results(&outcomes));
        }

        Ok(PromptOutcome {
            turns: self.max_turns,
            stop: StopReason::MaxTurns,
            usage,
        })
    }
}
