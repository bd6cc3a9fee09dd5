//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with `content_block_delta` events
//! - Structured output through an appended JSON instruction

use async_trait::async_trait;
use futures::StreamExt;
use agentry_core::OutputSchema;
use agentry_core::error::ProviderError;
use agentry_core::message::{Message, Part, ToolCallPart};
use agentry_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::http::{self, SseBuffer, SseLine};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            // Anthropic can be slow on long answers
            client: http::client(300),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, body: &AnthropicRequestBody) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }
}

/// The instruction appended to the system prompt when a structured answer
/// is requested; Anthropic has no native schema-constrained output.
pub fn structured_output_instruction(schema: &OutputSchema) -> String {
    let mut out = format!(
        "When you give your final answer, respond only with a JSON object named '{}' that matches this JSON Schema:\n{}",
        schema.name, schema.schema
    );
    if let Some(description) = &schema.description {
        out.push_str(&format!("\nThe object is: {description}"));
    }
    out.push_str("\nDo not wrap the JSON in markdown or add any other text.");
    out
}

/// Build the wire body for a request.
pub fn build_body(request: &ModelRequest, stream: bool) -> AnthropicRequestBody {
    let mut system = request.system_prompt();
    if let Some(schema) = &request.output_schema {
        let instruction = structured_output_instruction(schema);
        system = Some(match system {
            Some(s) => format!("{s}\n\n{instruction}"),
            None => instruction,
        });
    }

    AnthropicRequestBody {
        model: request.model.clone(),
        system,
        messages: to_wire(&request.messages),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: request.temperature,
        tools: request
            .tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect(),
        stream,
    }
}

/// Convert messages to Anthropic content-block messages.
///
/// System parts are lifted out (see [`ModelRequest::system_prompt`]). User
/// prompts and tool returns become `user` blocks, responses become
/// `assistant` blocks, and consecutive same-role messages are merged so the
/// roles alternate. Thinking is not sent back.
pub fn to_wire(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        let (role, blocks) = match msg {
            Message::Request { parts } => {
                let blocks: Vec<ContentBlock> = parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::UserPrompt { content } => Some(ContentBlock::Text {
                            text: content.clone(),
                        }),
                        Part::ToolReturn(ret) => Some(ContentBlock::ToolResult {
                            tool_use_id: ret.call_id.clone(),
                            content: ret.content_text(),
                        }),
                        _ => None,
                    })
                    .collect();
                ("user", blocks)
            }
            Message::Response { parts, .. } => {
                let blocks: Vec<ContentBlock> = parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text { content } if !content.is_empty() => Some(ContentBlock::Text {
                            text: content.clone(),
                        }),
                        Part::ToolCall(call) => Some(ContentBlock::ToolUse {
                            id: call.call_id.clone(),
                            name: call.tool_name.clone(),
                            input: call
                                .parsed_arguments()
                                .unwrap_or_else(|_| serde_json::json!({})),
                        }),
                        _ => None,
                    })
                    .collect();
                ("assistant", blocks)
            }
        };

        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(AnthropicMessage {
                role: role.into(),
                content: blocks,
            }),
        }
    }

    out
}

/// Convert an Anthropic API response into a `Message::Response`.
pub fn normalize(resp: AnthropicResponse) -> ModelResponse {
    let parts = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseContentBlock::Text { text } => Some(Part::text(text)),
            ResponseContentBlock::Thinking { thinking } => Some(Part::thinking(thinking)),
            ResponseContentBlock::ToolUse { id, name, input } => {
                Some(Part::ToolCall(ToolCallPart::new(name, input, id)))
            }
            ResponseContentBlock::Other => None,
        })
        .collect();

    let mut message = Message::response(parts).with_model_name(resp.model.clone());
    if let Some(reason) = resp.stop_reason {
        message = message.with_finish_reason(reason);
    }

    ModelResponse {
        message,
        usage: Usage::new(resp.usage.input_tokens, resp.usage.output_tokens),
        model: resp.model,
    }
}

#[async_trait]
impl Model for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let body = build_body(&request, false);
        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let resp: AnthropicResponse = http::send_json(&self.name, self.request(&body)).await?;
        Ok(normalize(resp))
    }

    async fn stream(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let body = build_body(&request, true);
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .request(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(http::transport_error)?;
        let response = http::check_status(&self.name, response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(forward_sse(response.bytes_stream(), tx));

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let request = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body: serde_json::Value = http::send_json(&self.name, request).await?;

        Ok(body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }
}

type ChunkSender = tokio::sync::mpsc::Sender<std::result::Result<StreamChunk, ProviderError>>;

/// Parse the Messages SSE byte stream into chunks on `tx`. Ending before
/// `message_stop` is an interrupted stream.
async fn forward_sse<S, B, E>(byte_stream: S, tx: ChunkSender)
where
    S: futures::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut sse = SseBuffer::default();
    let mut state = StreamState::default();

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
        sse.push(bytes.as_ref());

        while let Some(line) = sse.next_line() {
            // Anthropic repeats the event type inside each data payload
            let SseLine::Data(data) = line else { continue };
            if data.is_empty() {
                continue;
            }

            let event: serde_json::Value = match serde_json::from_str(&data) {
                Ok(v) => v,
                Err(e) => {
                    trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                    continue;
                }
            };

            match state.apply(&event) {
                StreamStep::Emit(chunk) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
                StreamStep::Stop => {
                    let _ = tx.send(Ok(state.finish())).await;
                    return;
                }
                StreamStep::Error(message) => {
                    let _ = tx.send(Err(ProviderError::StreamInterrupted(message))).await;
                    return;
                }
                StreamStep::Nothing => {}
            }
        }
    }

    warn!(provider = "anthropic", "SSE stream closed before message_stop");
    let _ = tx
        .send(Err(ProviderError::StreamInterrupted(
            "connection closed before message_stop".into(),
        )))
        .await;
}

/// Accumulates typed SSE events into stream chunks.
#[derive(Default)]
struct StreamState {
    current_tool: Option<ToolCallPart>,
    tool_args_buffer: String,
    tool_calls: Vec<ToolCallPart>,
    stop_reason: Option<String>,
    usage: Usage,
}

enum StreamStep {
    Emit(StreamChunk),
    Stop,
    Error(String),
    Nothing,
}

impl StreamState {
    fn apply(&mut self, event: &serde_json::Value) -> StreamStep {
        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(input) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.usage.input_tokens = input;
                }
                StreamStep::Nothing
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    self.close_tool();
                    self.current_tool = Some(ToolCallPart::new(
                        block["name"].as_str().unwrap_or(""),
                        serde_json::Value::Null,
                        block["id"].as_str().unwrap_or(""),
                    ));
                }
                StreamStep::Nothing
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => match delta["text"].as_str() {
                        Some(text) => StreamStep::Emit(StreamChunk {
                            content: Some(text.to_string()),
                            ..Default::default()
                        }),
                        None => StreamStep::Nothing,
                    },
                    "thinking_delta" => match delta["thinking"].as_str() {
                        Some(thinking) => StreamStep::Emit(StreamChunk {
                            thinking: Some(thinking.to_string()),
                            ..Default::default()
                        }),
                        None => StreamStep::Nothing,
                    },
                    "input_json_delta" => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            self.tool_args_buffer.push_str(partial);
                        }
                        StreamStep::Nothing
                    }
                    _ => StreamStep::Nothing,
                }
            }
            "content_block_stop" => {
                self.close_tool();
                StreamStep::Nothing
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                    self.usage.output_tokens = output;
                }
                StreamStep::Nothing
            }
            "message_stop" => StreamStep::Stop,
            "error" => StreamStep::Error(
                event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_string(),
            ),
            _ => StreamStep::Nothing,
        }
    }

    fn close_tool(&mut self) {
        if let Some(mut tool) = self.current_tool.take() {
            let raw = std::mem::take(&mut self.tool_args_buffer);
            tool.arguments = if raw.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::Value::String(raw)
            };
            self.tool_calls.push(tool);
        }
    }

    fn finish(&mut self) -> StreamChunk {
        self.close_tool();
        StreamChunk {
            tool_calls: std::mem::take(&mut self.tool_calls),
            finish_reason: self.stop_reason.take(),
            done: true,
            usage: Some(self.usage),
            ..Default::default()
        }
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
pub struct AnthropicRequestBody {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AnthropicTool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

/// A request-side content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
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
    },
}

#[derive(Debug, Serialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub model: String,
    pub content: Vec<ResponseContentBlock>,
    pub usage: AnthropicUsage,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// A response-side content block.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
