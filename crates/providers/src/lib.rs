//! Completion provider implementations for Harness.
//!
//! All providers implement the `harness_core::Provider` trait.

pub mod anthropic;

pub use anthropic::{AnthropicProvider, SseDecoder};
