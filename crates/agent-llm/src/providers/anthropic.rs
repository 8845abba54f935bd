//! Anthropic Claude provider implementation
//!
//! This module implements the LLMProvider trait for Anthropic's Claude models,
//! both as a single request/response and as a server-sent event stream.
//! See: https://docs.anthropic.com/en/api/messages

use crate::{
    CompletionRequest, CompletionResponse, ContentBlock, DeltaStream, LLMError, LLMProvider,
    Message, MessageContent, Result, Role, StopReason, StreamDelta, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider
///
/// Request timeouts are enforced by the runner per call, so the HTTP client
/// only carries a generous connect timeout.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    api_base: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            api_base: ANTHROPIC_API_BASE.to_string(),
        })
    }

    /// Create a provider from environment variable
    ///
    /// Reads the API key from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    /// Point the provider at a different API base (proxies, test servers)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await?;
        Err(match status.as_u16() {
            401 => LLMError::AuthenticationFailed,
            429 => LLMError::RateLimitExceeded(error_text),
            400 => LLMError::InvalidRequest(error_text),
            404 => LLMError::ModelNotFound(body.model.clone()),
            _ => LLMError::RequestFailed(format!("HTTP {status}: {error_text}")),
        })
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to Anthropic API");
        let body = AnthropicRequest::from_request(request, false);
        let response = self.send(&body).await?;

        let anthropic_response: AnthropicResponse = response.json().await.map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse response: {e}"))
        })?;

        debug!(
            stop_reason = %anthropic_response.stop_reason,
            input_tokens = anthropic_response.usage.input_tokens,
            output_tokens = anthropic_response.usage.output_tokens,
            "Received response"
        );

        Ok(CompletionResponse {
            message: Message::assistant_blocks(anthropic_response.content),
            stop_reason: map_stop_reason(&anthropic_response.stop_reason),
            usage: TokenUsage {
                input_tokens: anthropic_response.usage.input_tokens,
                output_tokens: anthropic_response.usage.output_tokens,
            },
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream> {
        debug!("Opening Anthropic event stream");
        let body = AnthropicRequest::from_request(request, true);
        let response = self.send(&body).await?;

        let bytes = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold(
            (bytes, SseParser::default(), SseFramer::default(), false),
            |(mut bytes, mut parser, mut framer, mut finished)| async move {
                loop {
                    if finished {
                        return None;
                    }
                    if let Some(frame) = framer.next_frame() {
                        let parsed = frame.and_then(|frame| parser.parse_frame(&frame));
                        match parsed {
                            Ok(deltas) if deltas.is_empty() => continue,
                            Ok(deltas) => {
                                finished = deltas
                                    .iter()
                                    .any(|d| matches!(d, StreamDelta::Completed(_)));
                                let items: Vec<Result<StreamDelta>> =
                                    deltas.into_iter().map(Ok).collect();
                                return Some((items, (bytes, parser, framer, finished)));
                            }
                            Err(e) => return Some((vec![Err(e)], (bytes, parser, framer, true))),
                        }
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => framer.push(&chunk),
                        Some(Err(e)) => {
                            let err = LLMError::StreamInterrupted(e.to_string());
                            return Some((vec![Err(err)], (bytes, parser, framer, true)));
                        }
                        None => {
                            let err = LLMError::StreamInterrupted(
                                "event stream closed before message_stop".to_string(),
                            );
                            return Some((vec![Err(err)], (bytes, parser, framer, true)));
                        }
                    }
                }
            },
        )
        .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" => StopReason::EndTurn,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        "tool_use" => StopReason::ToolUse,
        other => {
            debug!(stop_reason = other, "Unknown stop reason");
            StopReason::EndTurn
        }
    }
}

// Anthropic-specific request/response types
// These match the Anthropic API format exactly

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl AnthropicRequest {
    /// System-role history entries are folded into the system prompt, since
    /// the Messages API only accepts user and assistant turns.
    fn from_request(request: CompletionRequest, stream: bool) -> Self {
        let mut system_parts: Vec<String> = request.system.into_iter().collect();
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in request.messages {
            if message.role == Role::System {
                system_parts.extend(message.text());
            } else {
                messages.push(message);
            }
        }

        Self {
            model: request.model,
            messages,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: String,
    usage: UsageResponse,
}

#[derive(Debug, Default, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

/// Block being assembled from `content_block_*` events
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        arguments_json: String,
    },
}

/// Splits raw SSE bytes into `\n\n`-terminated frames
///
/// Bytes are buffered undecoded so a multi-byte character split across
/// network chunks is only decoded once its frame is complete.
#[derive(Default)]
struct SseFramer {
    buffer: Vec<u8>,
}

impl SseFramer {
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Next complete frame, if one is buffered
    fn next_frame(&mut self) -> Option<Result<String>> {
        let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
        Some(String::from_utf8(frame).map_err(|e| {
            LLMError::UnexpectedResponse(format!("Event stream frame is not UTF-8: {e}"))
        }))
    }
}

/// Assembles Anthropic SSE frames into deltas and the final response
#[derive(Default)]
struct SseParser {
    blocks: BTreeMap<u64, PartialBlock>,
    usage: TokenUsage,
    stop_reason: Option<String>,
}

impl SseParser {
    /// Parse one `event:`/`data:` frame
    fn parse_frame(&mut self, frame: &str) -> Result<Vec<StreamDelta>> {
        let mut event_type = "";
        let mut data = String::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event_type = rest.trim();
            } else if let Some(rest) = line.strip_prefix("data:") {
                data.push_str(rest.trim_start());
            }
        }
        if data.is_empty() {
            return Ok(vec![]);
        }

        let payload: Value = serde_json::from_str(&data)?;
        let event_type = if event_type.is_empty() {
            payload.get("type").and_then(Value::as_str).unwrap_or("")
        } else {
            event_type
        };
        self.apply(event_type, &payload)
    }

    fn apply(&mut self, event_type: &str, payload: &Value) -> Result<Vec<StreamDelta>> {
        let mut deltas = Vec::new();
        match event_type {
            "message_start" => {
                if let Some(usage) = payload.pointer("/message/usage") {
                    self.usage.input_tokens = read_count(usage, "input_tokens");
                }
            }
            "content_block_start" => {
                let index = self.block_index(payload);
                let block = payload.get("content_block").cloned().unwrap_or(Value::Null);
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => {
                        let id = str_field(&block, "id");
                        let name = str_field(&block, "name");
                        deltas.push(StreamDelta::ToolCallStart {
                            id: id.clone(),
                            name: name.clone(),
                        });
                        self.blocks.insert(
                            index,
                            PartialBlock::ToolUse {
                                id,
                                name,
                                arguments_json: String::new(),
                            },
                        );
                    }
                    _ => {
                        self.blocks.insert(index, PartialBlock::Text(String::new()));
                    }
                }
            }
            "content_block_delta" => {
                let index = self.block_index(payload);
                let delta = payload.get("delta").cloned().unwrap_or(Value::Null);
                match (delta.get("type").and_then(Value::as_str), self.blocks.get_mut(&index)) {
                    (Some("text_delta"), Some(PartialBlock::Text(text))) => {
                        let fragment = str_field(&delta, "text");
                        text.push_str(&fragment);
                        deltas.push(StreamDelta::Text(fragment));
                    }
                    (
                        Some("input_json_delta"),
                        Some(PartialBlock::ToolUse {
                            id, arguments_json, ..
                        }),
                    ) => {
                        let fragment = str_field(&delta, "partial_json");
                        arguments_json.push_str(&fragment);
                        deltas.push(StreamDelta::ToolCallInput {
                            id: id.clone(),
                            partial_json: fragment,
                        });
                    }
                    (kind, _) => debug!(?kind, index, "Ignoring content delta"),
                }
            }
            "message_delta" => {
                if let Some(reason) = payload.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(usage) = payload.get("usage") {
                    self.usage.output_tokens = read_count(usage, "output_tokens");
                }
            }
            "message_stop" => deltas.push(StreamDelta::Completed(self.finish()?)),
            "error" => {
                let message = payload
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                return Err(LLMError::StreamInterrupted(message.to_string()));
            }
            "ping" | "content_block_stop" => {}
            other => warn!(event = other, "Unknown Anthropic stream event"),
        }
        Ok(deltas)
    }

    /// Block index of a `content_block_*` event; events without one
    /// address the most recently started block
    fn block_index(&self, payload: &Value) -> u64 {
        payload
            .get("index")
            .and_then(Value::as_u64)
            .or_else(|| self.blocks.keys().next_back().copied())
            .unwrap_or(0)
    }

    fn finish(&mut self) -> Result<CompletionResponse> {
        let mut content = Vec::with_capacity(self.blocks.len());
        for block in std::mem::take(&mut self.blocks).into_values() {
            match block {
                PartialBlock::Text(text) if text.is_empty() => {}
                PartialBlock::Text(text) => content.push(ContentBlock::Text { text }),
                PartialBlock::ToolUse {
                    id,
                    name,
                    arguments_json,
                } => {
                    let input = if arguments_json.trim().is_empty() {
                        Value::Object(serde_json::Map::new())
                    } else {
                        serde_json::from_str(&arguments_json)?
                    };
                    content.push(ContentBlock::ToolUse { id, name, input });
                }
            }
        }

        Ok(CompletionResponse {
            message: Message {
                role: Role::Assistant,
                content: Some(MessageContent::Blocks(content)),
            },
            stop_reason: map_stop_reason(self.stop_reason.as_deref().unwrap_or("end_turn")),
            usage: self.usage,
        })
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn read_count(usage: &Value, key: &str) -> usize {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0) as usize
}
