//! Shared test doubles for agent tests.

use async_trait::async_trait;
use harness_core::error::{ProviderError, ToolError};
use harness_core::event::EventListener;
use harness_core::provider::{
    BlockDelta, BlockStart, EventReceiver, Provider, ProviderRequest, StreamEvent,
};
use harness_core::tool::Tool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

/// A provider that replays one scripted stream per call.
///
/// With `repeat_last`, the final script is replayed forever; otherwise
/// running past the script panics.
pub struct ScriptedProvider {
    turns: Vec<Vec<StreamEvent>>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            turns,
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(turn: Vec<StreamEvent>) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![turn])
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<EventReceiver, ProviderError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        let script = match self.turns.get(n) {
            Some(turn) => turn.clone(),
            None if self.repeat_last => self.turns.last().cloned().unwrap_or_default(),
            None => panic!("ScriptedProvider: no script for call #{n}"),
        };

        let (tx, rx) = mpsc::channel(script.len().max(1));
        for event in script {
            tx.try_send(Ok(event)).unwrap();
        }
        Ok(rx)
    }
}

/// A provider whose stream fails after `prefix`.
pub struct FailingProvider {
    pub prefix: Vec<StreamEvent>,
    pub error: ProviderError,
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<EventReceiver, ProviderError> {
        let (tx, rx) = mpsc::channel(self.prefix.len() + 1);
        for event in &self.prefix {
            tx.try_send(Ok(event.clone())).unwrap();
        }
        tx.try_send(Err(self.error.clone())).unwrap();
        Ok(rx)
    }
}

/// A provider whose stream opens and then never produces anything.
#[derive(Default)]
pub struct StalledProvider {
    senders: Mutex<Vec<mpsc::Sender<Result<StreamEvent, ProviderError>>>>,
    pub opened: Arc<Notify>,
}

#[async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<EventReceiver, ProviderError> {
        let (tx, rx) = mpsc::channel(1);
        self.senders.lock().unwrap().push(tx);
        self.opened.notify_one();
        Ok(rx)
    }
}

pub fn text_turn(text: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::MessageStart {
            id: "msg_text".into(),
            model: "mock-model".into(),
            usage: None,
        },
        StreamEvent::ContentBlockStart {
            index: 0,
            block: BlockStart::Text {
                text: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::Text(text.into()),
        },
        StreamEvent::ContentBlockStop { index: 0 },
        StreamEvent::MessageDelta {
            stop_reason: Some("end_turn".into()),
            usage: None,
        },
        StreamEvent::MessageStop,
    ]
}

/// A signed thinking block at index 0 followed by `text` at index 1.
pub fn reasoning_turn(thought: &str, text: &str) -> Vec<StreamEvent> {
    let mut events = vec![
        StreamEvent::MessageStart {
            id: "msg_thinking".into(),
            model: "mock-model".into(),
            usage: None,
        },
        StreamEvent::ContentBlockStart {
            index: 0,
            block: BlockStart::Reasoning {
                text: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::Reasoning(thought.into()),
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::Signature("sig".into()),
        },
        StreamEvent::ContentBlockStop { index: 0 },
    ];
    events.extend(text_turn(text).into_iter().skip(1).map(|event| match event {
        StreamEvent::ContentBlockStart { block, .. } => {
            StreamEvent::ContentBlockStart { index: 1, block }
        }
        StreamEvent::ContentBlockDelta { delta, .. } => {
            StreamEvent::ContentBlockDelta { index: 1, delta }
        }
        StreamEvent::ContentBlockStop { .. } => StreamEvent::ContentBlockStop { index: 1 },
        other => other,
    }));
    events
}

/// A turn that requests each `(id, name)` tool with `{}` input.
pub fn tool_turn(calls: &[(&str, &str)]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::MessageStart {
        id: "msg_tools".into(),
        model: "mock-model".into(),
        usage: None,
    }];
    for (index, (id, name)) in calls.iter().enumerate() {
        events.push(StreamEvent::ContentBlockStart {
            index,
            block: BlockStart::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
            },
        });
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJson("{}".into()),
        });
        events.push(StreamEvent::ContentBlockStop { index });
    }
    events.push(StreamEvent::MessageDelta {
        stop_reason: Some("tool_use".into()),
        usage: None,
    });
    events.push(StreamEvent::MessageStop);
    events
}

/// Listener events in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    User(String),
    Text(String),
    ToolCall { id: String, name: String },
    ToolResult { id: String, is_error: bool },
    Reasoning(String),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn tool_results(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::ToolResult { id, is_error } => Some((id, is_error)),
                _ => None,
            })
            .collect()
    }
}

impl EventListener for RecordingListener {
    fn on_user(&self, content: &str) {
        self.events.lock().unwrap().push(Recorded::User(content.into()));
    }
    fn on_text(&self, text: &str) {
        self.events.lock().unwrap().push(Recorded::Text(text.into()));
    }
    fn on_tool_call(&self, id: &str, name: &str, _input: &serde_json::Value) {
        self.events.lock().unwrap().push(Recorded::ToolCall {
            id: id.into(),
            name: name.into(),
        });
    }
    fn on_tool_result(&self, id: &str, _result: &str, is_error: bool) {
        self.events.lock().unwrap().push(Recorded::ToolResult {
            id: id.into(),
            is_error,
        });
    }
    fn on_reasoning(&self, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Reasoning(text.into()));
    }
}

/// Returns a fixed string, optionally counting invocations.
pub struct StaticTool {
    name: String,
    output: String,
    invoked: Arc<AtomicUsize>,
}

impl StaticTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self::counting(name, output, Arc::new(AtomicUsize::new(0)))
    }

    pub fn counting(name: &str, output: &str, invoked: Arc<AtomicUsize>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            invoked,
        }
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Returns a fixed result"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(
        &self,
        _input: serde_json::Value,
        _cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Always fails.
pub struct FailingTool {
    name: String,
    pub invoked: Arc<AtomicUsize>,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            invoked: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(
        &self,
        _input: serde_json::Value,
        _cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: "intentional failure".into(),
        })
    }
}

/// Blocks until the prompt is cancelled.
pub struct BlockingTool {
    pub started: Arc<Notify>,
}

#[async_trait]
impl Tool for BlockingTool {
    fn name(&self) -> &str {
        "blocking"
    }
    fn description(&self) -> &str {
        "Waits for cancellation"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(
        &self,
        _input: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        self.started.notify_one();
        cancel.cancelled().await;
        Err(ToolError::Cancelled)
    }
}
