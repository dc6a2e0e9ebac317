//! Domain events and the subscriber fan-out.
//!
//! The agent loop reports progress through an [`EventListener`]. The
//! [`EventBroadcaster`] is the listener the gateway installs: it turns each
//! callback into a [`DomainEvent`] and pushes it to every live
//! [`Subscription`] through that subscriber's own bounded channel.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Externally visible state of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    RunningTool,
    Error,
}

/// What happened, without the timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    User {
        content: String,
    },
    Text {
        content: String,
    },
    Reasoning {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        id: String,
        result: String,
        #[serde(rename = "isError")]
        is_error: bool,
    },
    Status {
        state: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl EventKind {
    pub fn status(state: AgentStatus) -> Self {
        Self::Status {
            state,
            message: None,
        }
    }

    /// The wire tag for this event.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Status { .. } => "status",
        }
    }
}

/// A unit of observable progress, stamped on publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(flatten)]
    pub kind: EventKind,

    /// Unix seconds; never decreases across one broadcaster.
    pub timestamp: i64,
}

/// Callbacks the agent loop invokes as a prompt makes progress.
///
/// Implementations must not block: they run inline on the loop's task.
pub trait EventListener: Send + Sync {
    /// A prompt was admitted.
    fn on_user(&self, _content: &str) {}
    fn on_text(&self, text: &str);
    fn on_tool_call(&self, id: &str, name: &str, input: &serde_json::Value);
    fn on_tool_result(&self, id: &str, result: &str, is_error: bool);
    fn on_reasoning(&self, text: &str);
}

struct Registry {
    subscribers: HashMap<u64, mpsc::Sender<Arc<DomainEvent>>>,
    last_timestamp: i64,
}

struct Shared {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Shared {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unsubscribe(&self, id: u64) -> bool {
        self.registry().subscribers.remove(&id).is_some()
    }
}

/// Fans each published event out to every registered subscriber.
///
/// Cloning yields another handle onto the same subscriber set. Publishing
/// never waits: a subscriber whose buffer is full misses that event, the
/// others are unaffected.
#[derive(Clone)]
pub struct EventBroadcaster {
    shared: Arc<Shared>,
}

impl EventBroadcaster {
    /// Create a broadcaster whose subscribers each buffer up to `buffer`
    /// undelivered events.
    pub fn new(buffer: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    subscribers: HashMap::new(),
                    last_timestamp: 0,
                }),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new subscriber. It sees only events published after this
    /// call returns.
    pub fn subscribe(&self) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.shared.buffer);
        let count = {
            let mut registry = self.shared.registry();
            registry.subscribers.insert(id, tx);
            registry.subscribers.len()
        };
        debug!(subscriber_id = id, subscribers = count, "Subscriber registered");
        Subscription {
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Remove a subscriber by id. Returns whether it was registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.shared.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry().subscribers.len()
    }

    /// Stamp `kind` and deliver it to every current subscriber.
    ///
    /// Returns the number of subscribers that accepted the event.
    pub fn publish(&self, kind: EventKind) -> usize {
        let mut registry = self.shared.registry();

        let now = chrono::Utc::now().timestamp();
        let timestamp = now.max(registry.last_timestamp);
        registry.last_timestamp = timestamp;

        let event = Arc::new(DomainEvent { kind, timestamp });
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in &registry.subscribers {
            match tx.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber_id = id,
                        event_type = event.kind.type_name(),
                        "Event dropped - subscriber buffer full"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            registry.subscribers.remove(&id);
        }

        delivered
    }

    /// Drop every subscriber. Their streams end once drained.
    pub fn close(&self) {
        let removed = {
            let mut registry = self.shared.registry();
            let n = registry.subscribers.len();
            registry.subscribers.clear();
            n
        };
        debug!(subscribers = removed, "Broadcaster closed");
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("buffer", &self.shared.buffer)
            .finish()
    }
}

impl EventListener for EventBroadcaster {
    fn on_user(&self, content: &str) {
        self.publish(EventKind::User {
            content: content.to_string(),
        });
    }

    fn on_text(&self, text: &str) {
        self.publish(EventKind::Text {
            content: text.to_string(),
        });
    }

    fn on_tool_call(&self, id: &str, name: &str, input: &serde_json::Value) {
        self.publish(EventKind::Status {
            state: AgentStatus::RunningTool,
            message: Some(name.to_string()),
        });
        self.publish(EventKind::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input: input.clone(),
        });
    }

    fn on_tool_result(&self, id: &str, result: &str, is_error: bool) {
        self.publish(EventKind::ToolResult {
            id: id.to_string(),
            result: result.to_string(),
            is_error,
        });
        self.publish(EventKind::status(AgentStatus::Thinking));
    }

    fn on_reasoning(&self, text: &str) {
        self.publish(EventKind::Reasoning {
            content: text.to_string(),
        });
    }
}

/// One registered observer. Unsubscribes itself on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<DomainEvent>>,
    shared: Arc<Shared>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the broadcaster closed this
    /// subscriber and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Arc<DomainEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.shared.unsubscribe(self.id) {
            debug!(subscriber_id = self.id, "Subscriber removed");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
