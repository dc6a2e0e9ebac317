//! Reassembles one assistant message from a provider event stream.
//!
//! Content blocks are keyed by the provider's index. Indices must increase
//! from one start to the next but may skip values the provider left out.
//! A block only receives deltas between its start and stop. A block is reported to the caller the
//! moment its stop event arrives, so text and tool calls surface while the
//! rest of the message is still streaming.

use harness_core::error::{Error, ProviderError};
use harness_core::message::{ContentBlock, Message};
use harness_core::provider::{BlockDelta, BlockStart, EventReceiver, StreamEvent, Usage};
use tokio_util::sync::CancellationToken;

/// A complete assistant turn as received from the provider.
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub message: Message,
    pub usage: Usage,
    pub stop_reason: Option<String>,
}

struct Slot {
    index: usize,
    block: ContentBlock,
    partial_json: String,
    closed: bool,
}

fn malformed(reason: String) -> ProviderError {
    ProviderError::MalformedStream(reason)
}

#[derive(Default)]
pub struct MessageAccumulator {
    slots: Vec<Slot>,
    usage: Usage,
    stop_reason: Option<String>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_slot(&mut self, index: usize) -> Result<&mut Slot, ProviderError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| malformed(format!("content block {index} was never started")))?;
        if slot.closed {
            return Err(malformed(format!("content block {index} already stopped")));
        }
        Ok(slot)
    }

    /// Apply one event. Returns the finished block when `event` closes one.
    pub fn accumulate(
        &mut self,
        event: StreamEvent,
    ) -> Result<Option<&ContentBlock>, ProviderError> {
        match event {
            StreamEvent::MessageStart { usage, .. } => {
                if let Some(usage) = usage {
                    self.usage = usage;
                }
                Ok(None)
            }
            StreamEvent::ContentBlockStart { index, block } => {
                if let Some(last) = self.slots.last().map(|s| s.index).filter(|&l| index <= l) {
                    return Err(malformed(format!(
                        "content block {index} started out of order (after {last})"
                    )));
                }
                let block = match block {
                    BlockStart::Text { text } => ContentBlock::Text { text },
                    BlockStart::ToolUse { id, name } => ContentBlock::ToolUse {
                        id,
                        name,
                        input: serde_json::Value::Null,
                    },
                    BlockStart::Reasoning { text } => ContentBlock::Reasoning {
                        text,
                        signature: None,
                    },
                    BlockStart::RedactedReasoning { data } => {
                        ContentBlock::RedactedReasoning { data }
                    }
                };
                self.slots.push(Slot {
                    index,
                    block,
                    partial_json: String::new(),
                    closed: false,
                });
                Ok(None)
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let slot = self.open_slot(index)?;
                match (&mut slot.block, delta) {
                    (ContentBlock::Text { text }, BlockDelta::Text(more)) => text.push_str(&more),
                    (ContentBlock::ToolUse { .. }, BlockDelta::InputJson(more)) => {
                        slot.partial_json.push_str(&more)
                    }
                    (ContentBlock::Reasoning { text, .. }, BlockDelta::Reasoning(more)) => {
                        text.push_str(&more)
                    }
                    (ContentBlock::Reasoning { signature, .. }, BlockDelta::Signature(more)) => {
                        signature.get_or_insert_with(String::new).push_str(&more)
                    }
                    _ => {
                        return Err(malformed(format!(
                            "delta does not match the type of content block {index}"
                        )));
                    }
                }
                Ok(None)
            }
            StreamEvent::ContentBlockStop { index } => {
                let slot = self.open_slot(index)?;
                if let ContentBlock::ToolUse { input, .. } = &mut slot.block {
                    *input = if slot.partial_json.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&slot.partial_json).map_err(|e| {
                            malformed(format!("tool input for block {index} is not JSON: {e}"))
                        })?
                    };
                }
                slot.closed = true;
                Ok(Some(&slot.block))
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if let Some(usage) = usage {
                    self.usage.output_tokens = usage.output_tokens;
                    if usage.input_tokens > 0 {
                        self.usage.input_tokens = usage.input_tokens;
                    }
                }
                Ok(None)
            }
            StreamEvent::MessageStop => Ok(None),
        }
    }

    /// Finish the message. Every started block must have been stopped.
    pub fn finish(self) -> Result<AssistantTurn, ProviderError> {
        if let Some(open) = self.slots.iter().find(|s| !s.closed) {
            return Err(malformed(format!(
                "stream ended with content block {} still open",
                open.index
            )));
        }
        Ok(AssistantTurn {
            message: Message::assistant(self.slots.into_iter().map(|s| s.block).collect()),
            usage: self.usage,
            stop_reason: self.stop_reason,
        })
    }
}

/// Drain `rx` into an assistant turn, calling `on_block_complete` for each
/// block as soon as it closes.
///
/// Stops at `MessageStop` or when the stream ends. A provider error is
/// returned unchanged; cancellation wins over a pending event.
pub async fn consume<F>(
    rx: &mut EventReceiver,
    cancel: &CancellationToken,
    mut on_block_complete: F,
) -> Result<AssistantTurn, Error>
where
    F: FnMut(&ContentBlock),
{
    let mut acc = MessageAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = rx.recv() => next,
        };

        let event = match next {
            None => break,
            Some(event) => event?,
        };
        let last = matches!(event, StreamEvent::MessageStop);

        if let Some(block) = acc.accumulate(event)? {
            on_block_complete(block);
        }
        if last {
            break;
        }
    }

    Ok(acc.finish()?)
}
