//! The agent loop and its parts.
//!
//! A prompt goes through the **admit → turn* → release** cycle:
//!
//! 1. The [`ConcurrencyGuard`] admits at most one prompt at a time
//! 2. Each turn streams a completion and reassembles it ([`accumulator`])
//! 3. Requested tools run in order, stopping at the first failure ([`executor`])
//! 4. Tool results go back to the model until it answers without tools or the
//!    turn budget runs out
//!
//! Progress is reported through an [`EventListener`](harness_core::EventListener).

pub mod accumulator;
pub mod executor;
pub mod guard;
pub mod loop_runner;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use accumulator::{AssistantTurn, MessageAccumulator};
pub use guard::{ConcurrencyGuard, RunPermit};
pub use loop_runner::{AgentLoop, PromptOutcome, StopReason};
pub use transcript::TranscriptListener;
