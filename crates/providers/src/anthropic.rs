//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, decoded into [`StreamEvent`]s
//! - Extended thinking support

use async_trait::async_trait;
use futures::StreamExt;
use harness_core::error::ProviderError;
use harness_core::message::{ContentBlock, Message};
use harness_core::provider::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const STREAM_BUFFER: usize = 64;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Budget tokens for extended thinking; `None` leaves it off.
    thinking_budget: Option<u32>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
            thinking_budget: None,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable extended thinking.
    pub fn with_extended_thinking(mut self, budget_tokens: u32) -> Self {
        self.thinking_budget = Some(budget_tokens);
        self
    }

    /// Convert conversation messages to Anthropic API format.
    ///
    /// Reasoning blocks are only replayed when they carry a signature; the
    /// API rejects unsigned thinking blocks. Redacted thinking goes back
    /// untouched.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|msg| AnthropicMessage {
                role: msg.role.as_str(),
                content: msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(ApiBlock::Text { text: text.clone() }),
                        ContentBlock::ToolUse { id, name, input } => Some(ApiBlock::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        }),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => Some(ApiBlock::ToolResult {
                            tool_use_id: tool_use_id.clone(),
                            content: content.clone(),
                            is_error: *is_error,
                        }),
                        ContentBlock::Reasoning { text, signature } => {
                            signature.as_ref().map(|sig| ApiBlock::Thinking {
                                thinking: text.clone(),
                                signature: sig.clone(),
                            })
                        }
                        ContentBlock::RedactedReasoning { data } => {
                            Some(ApiBlock::RedactedThinking { data: data.clone() })
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    /// Build the JSON request body for a streaming call.
    fn build_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens,
            "stream": true,
        });

        if let Some(sys) = request.system.as_deref().filter(|s| !s.is_empty()) {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools);
        }

        if let Some(budget) = self.thinking_budget {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": budget
            });
        }

        body
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl harness_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<EventReceiver, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request);

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for item in decoder.push(&bytes) {
                    let last = matches!(item, Ok(StreamEvent::MessageStop) | Err(_));
                    if tx.send(item).await.is_err() {
                        debug!("Stream receiver dropped, closing Anthropic stream");
                        return;
                    }
                    if last {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Incremental decoder for the Messages API event stream.
///
/// Bytes go in as they arrive; complete `data:` lines come out as stream
/// events. Content blocks of a type we don't model are skipped along with
/// their deltas.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    skipped: HashSet<usize>,
}

impl SseDecoder {
    /// Feed raw bytes; returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, ProviderError>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                // `event:` lines repeat the type carried in the payload
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }

            if let Some(item) = self.decode(data) {
                out.push(item);
            }
        }

        out
    }

    fn decode(&mut self, data: &str) -> Option<Result<StreamEvent, ProviderError>> {
        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                return Some(Err(ProviderError::MalformedStream(format!(
                    "invalid event payload: {e}"
                ))));
            }
        };

        let index = event["index"].as_u64().map(|i| i as usize);

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                let message = &event["message"];
                Some(Ok(StreamEvent::MessageStart {
                    id: message["id"].as_str().unwrap_or_default().to_string(),
                    model: message["model"].as_str().unwrap_or_default().to_string(),
                    usage: parse_usage(&message["usage"]),
                }))
            }
            "content_block_start" => {
                let index = index?;
                let block = &event["content_block"];
                let start = match block["type"].as_str() {
                    Some("text") => BlockStart::Text {
                        text: block["text"].as_str().unwrap_or_default().to_string(),
                    },
                    Some("tool_use") => BlockStart::ToolUse {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                    },
                    Some("thinking") => BlockStart::Reasoning {
                        text: block["thinking"].as_str().unwrap_or_default().to_string(),
                    },
                    Some("redacted_thinking") => BlockStart::RedactedReasoning {
                        data: block["data"].as_str().unwrap_or_default().to_string(),
                    },
                    other => {
                        trace!(index, block_type = ?other, "Skipping unsupported content block");
                        self.skipped.insert(index);
                        return None;
                    }
                };
                Some(Ok(StreamEvent::ContentBlockStart {
                    index,
                    block: start,
                }))
            }
            "content_block_delta" => {
                let index = index?;
                if self.skipped.contains(&index) {
                    return None;
                }
                let delta = &event["delta"];
                let field = |name: &str| delta[name].as_str().unwrap_or_default().to_string();
                let delta = match delta["type"].as_str() {
                    Some("text_delta") => BlockDelta::Text(field("text")),
                    Some("input_json_delta") => BlockDelta::InputJson(field("partial_json")),
                    Some("thinking_delta") => BlockDelta::Reasoning(field("thinking")),
                    Some("signature_delta") => BlockDelta::Signature(field("signature")),
                    other => {
                        trace!(index, delta_type = ?other, "Ignoring unknown delta");
                        return None;
                    }
                };
                Some(Ok(StreamEvent::ContentBlockDelta { index, delta }))
            }
            "content_block_stop" => {
                let index = index?;
                if self.skipped.remove(&index) {
                    return None;
                }
                Some(Ok(StreamEvent::ContentBlockStop { index }))
            }
            "message_delta" => Some(Ok(StreamEvent::MessageDelta {
                stop_reason: event["delta"]["stop_reason"].as_str().map(str::to_string),
                usage: parse_usage(&event["usage"]),
            })),
            "message_stop" => Some(Ok(StreamEvent::MessageStop)),
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_string();
                Some(Err(ProviderError::StreamInterrupted(message)))
            }
            _ => None,
        }
    }
}

fn parse_usage(value: &serde_json::Value) -> Option<Usage> {
    if !value.is_object() {
        return None;
    }
    Some(Usage {
        input_tokens: value["input_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: value["output_tokens"].as_u64().unwrap_or(0) as u32,
    })
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_core::{Provider, ToolOutcome};

    fn decode_all(payload: &str) -> Vec<Result<StreamEvent, ProviderError>> {
        SseDecoder::default().push(payload.as_bytes())
    }

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test").unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert!(provider.thinking_budget.is_none());
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test")
            .unwrap()
            .with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn body_omits_empty_system_and_tools() {
        let provider = AnthropicProvider::new("k").unwrap();
        let body = provider.build_body(&ProviderRequest {
            model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 1024,
            system: Some(String::new()),
            messages: vec![Message::user("Hello")],
            tools: vec![],
        });
        assert_eq!(body["stream"], true);
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("thinking").is_none());
        assert_eq!(body["messages"][0]["content"][0]["text"], "Hello");
    }

    #[test]
    fn body_carries_system_tools_and_thinking() {
        let provider = AnthropicProvider::new("k").unwrap().with_extended_thinking(2048);
        let body = provider.build_body(&ProviderRequest {
            model: "m".into(),
            max_tokens: 4096,
            system: Some("Be brief".into()),
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "read".into(),
                description: "Read a file".into(),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
            }],
        });
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["tools"][0]["name"], "read");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["thinking"]["budget_tokens"], 2048);
    }

    #[test]
    fn message_conversion_blocks() {
        let messages = vec![
            Message::assistant(vec![
                ContentBlock::Reasoning {
                    text: "unsigned".into(),
                    signature: None,
                },
                ContentBlock::Reasoning {
                    text: "signed".into(),
                    signature: Some("sig".into()),
                },
                ContentBlock::text("Let me look"),
                ContentBlock::ToolUse {
                    id: "toolu_1".into(),
                    name: "read".into(),
                    input: serde_json::json!({"path": "a"}),
                },
            ]),
            Message::tool_results(&[
                ToolOutcome::success("toolu_1", "ok"),
                ToolOutcome::error("toolu_2", "bad"),
            ]),
        ];

        let json = serde_json::to_value(AnthropicProvider::to_api_messages(&messages)).unwrap();
        let assistant = &json[0]["content"];
        assert_eq!(json[0]["role"], "assistant");
        assert_eq!(assistant.as_array().unwrap().len(), 3);
        assert_eq!(assistant[0]["type"], "thinking");
        assert_eq!(assistant[0]["signature"], "sig");
        assert_eq!(assistant[2]["type"], "tool_use");

        let results = &json[1]["content"];
        assert_eq!(json[1]["role"], "user");
        assert_eq!(results[0]["type"], "tool_result");
        assert!(results[0].get("is_error").is_none());
        assert_eq!(results[1]["is_error"], true);
    }

    #[test]
    fn decodes_text_stream() {
        let events = decode_all(concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude\",\"usage\":{\"input_tokens\":12,\"output_tokens\":1}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":5}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ));

        let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events.len(), 6);
        assert!(matches!(
            &events[0],
            StreamEvent::MessageStart { id, usage: Some(Usage { input_tokens: 12, .. }), .. } if id == "msg_1"
        ));
        assert_eq!(
            events[2],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Text("Hello".into())
            }
        );
        assert_eq!(
            events[4],
            StreamEvent::MessageDelta {
                stop_reason: Some("end_turn".into()),
                usage: Some(Usage {
                    input_tokens: 0,
                    output_tokens: 5
                }),
            }
        );
        assert_eq!(events[5], StreamEvent::MessageStop);
    }

    #[test]
    fn decodes_tool_use_across_chunk_boundaries() {
        let payload = concat!(
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"read\",\"input\":{}}}\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"path\\\":\"}}\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"a.txt\\\"}\"}}\n",
            "data: {\"type\":\"content_block_stop\",\"index\":1}\n",
        );
        let (head, tail) = payload.as_bytes().split_at(57);

        let mut decoder = SseDecoder::default();
        let mut events = decoder.push(head);
        assert!(events.is_empty());
        events.extend(decoder.push(tail));

        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::ContentBlockStart {
                index: 1,
                block: BlockStart::ToolUse {
                    id: "toolu_1".into(),
                    name: "read".into()
                }
            }
        );
        assert_eq!(
            events[2].as_ref().unwrap(),
            &StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJson("\"a.txt\"}".into())
            }
        );
    }

    #[test]
    fn thinking_and_signature_deltas() {
        let events = decode_all(concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"signature_delta\",\"signature\":\"abc\"}}\n",
        ));
        assert_eq!(
            events[1].as_ref().unwrap(),
            &StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Reasoning("hmm".into())
            }
        );
        assert_eq!(
            events[2].as_ref().unwrap(),
            &StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Signature("abc".into())
            }
        );
    }

    #[test]
    fn unsupported_blocks_are_skipped_entirely() {
        let events = decode_all(concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"server_tool_use\",\"id\":\"srv_1\"}}\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{}\"}}\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n",
        ));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Ok(StreamEvent::ContentBlockStart { index: 1, .. })
        ));
    }

    #[test]
    fn redacted_thinking_is_decoded_and_replayed() {
        let events = decode_all(concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"redacted_thinking\",\"data\":\"EmwKAhgB\"}}\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
        ));
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::ContentBlockStart {
                index: 0,
                block: BlockStart::RedactedReasoning {
                    data: "EmwKAhgB".into()
                }
            }
        );
        assert_eq!(
            events[1].as_ref().unwrap(),
            &StreamEvent::ContentBlockStop { index: 0 }
        );

        let history = vec![Message::assistant(vec![
            ContentBlock::RedactedReasoning {
                data: "EmwKAhgB".into(),
            },
            ContentBlock::text("done"),
        ])];
        let json = serde_json::to_value(AnthropicProvider::to_api_messages(&history)).unwrap();
        assert_eq!(json[0]["content"][0]["type"], "redacted_thinking");
        assert_eq!(json[0]["content"][0]["data"], "EmwKAhgB");
        assert_eq!(json[0]["content"][1]["type"], "text");
    }

    #[test]
    fn error_event_and_garbage_become_errors() {
        let events = decode_all(
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n",
        );
        assert!(matches!(
            &events[0],
            Err(ProviderError::StreamInterrupted(m)) if m == "Overloaded"
        ));

        let events = decode_all("data: {not json\n");
        assert!(matches!(events[0], Err(ProviderError::MalformedStream(_))));
    }
}
