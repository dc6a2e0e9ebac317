//! # Harness Core
//!
//! Domain types, traits, and error definitions for the Harness agent loop.
//! This crate has **no HTTP dependencies**: it defines the model that
//! the provider, tool, agent and gateway crates implement against.
//!
//! ## Contents
//!
//! - [`message`]: conversation history as role-tagged content blocks
//! - [`provider`]: the streaming completion provider contract
//! - [`tool`]: the tool capability contract and the name-keyed registry
//! - [`event`]: observable domain events, the listener contract and the
//!   fan-out broadcaster

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, ToolError};
pub use event::{
    AgentStatus, DomainEvent, EventBroadcaster, EventKind, EventListener, Subscription,
};
pub use message::{ContentBlock, Conversation, Message, Role};
pub use provider::{
    BlockDelta, BlockStart, EventReceiver, Provider, ProviderRequest, StreamEvent,
    ToolDefinition, Usage,
};
pub use tool::{Tool, ToolCall, ToolOutcome, ToolRegistry};
