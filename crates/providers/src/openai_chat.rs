//! OpenAI Chat Completions dialect.
//!
//! Works with: OpenAI, Groq, OpenRouter, Ollama, vLLM, and any endpoint
//! exposing an OpenAI-compatible `/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling
//! - Structured output via `response_format: json_schema`

use async_trait::async_trait;
use futures::StreamExt;
use agentry_core::error::ProviderError;
use agentry_core::message::{Message, Part, ToolCallPart};
use agentry_core::provider::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use crate::http::{self, SseBuffer, SseLine};

/// A Chat Completions provider.
pub struct OpenAiChatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http::client(120),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create a Groq provider (convenience constructor).
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new("groq", "https://api.groq.com/openai/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, body: &ChatRequestBody) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
    }
}

/// Build the wire body for a request.
pub fn build_body(request: &ModelRequest, stream: bool) -> ChatRequestBody {
    let mut messages = to_wire(&request.messages);
    let has_system = messages
        .iter()
        .any(|m| matches!(m, ChatMessage::System { .. }));
    if !has_system {
        if let Some(system) = request.system_prompt() {
            messages.insert(0, ChatMessage::System { content: system });
        }
    }

    ChatRequestBody {
        model: request.model.clone(),
        messages,
        tools: request
            .tools
            .iter()
            .map(|t| ChatTool {
                kind: "function".into(),
                function: ChatToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect(),
        response_format: request.output_schema.as_ref().map(|s| {
            let mut json_schema = serde_json::json!({
                "name": s.name,
                "schema": s.schema,
                "strict": false,
            });
            if let Some(description) = &s.description {
                json_schema["description"] = serde_json::json!(description);
            }
            serde_json::json!({ "type": "json_schema", "json_schema": json_schema })
        }),
        max_completion_tokens: request.max_tokens,
        temperature: request.temperature,
        stream,
        stream_options: stream.then(|| serde_json::json!({ "include_usage": true })),
    }
}

/// Convert the message model into Chat Completions messages.
///
/// Request parts each become their own `system` / `user` / `tool` message;
/// a response becomes one `assistant` message. Thinking is not sent back.
pub fn to_wire(messages: &[Message]) -> Vec<ChatMessage> {
    let mut out = Vec::new();

    for msg in messages {
        match msg {
            Message::Request { parts } => {
                for part in parts {
                    match part {
                        Part::SystemPrompt { content } => out.push(ChatMessage::System {
                            content: content.clone(),
                        }),
                        Part::UserPrompt { content } => out.push(ChatMessage::User {
                            content: content.clone(),
                        }),
                        Part::ToolReturn(ret) => out.push(ChatMessage::Tool {
                            tool_call_id: ret.call_id.clone(),
                            content: ret.content_text(),
                        }),
                        _ => {}
                    }
                }
            }
            Message::Response { .. } => {
                let text = msg.text();
                let tool_calls = msg
                    .tool_calls()
                    .into_iter()
                    .map(|call| ChatToolCall {
                        id: call.call_id.clone(),
                        kind: "function".into(),
                        function: ChatFunction {
                            name: call.tool_name.clone(),
                            arguments: call.arguments_json(),
                        },
                    })
                    .collect();
                out.push(ChatMessage::Assistant {
                    content: (!text.is_empty()).then_some(text),
                    tool_calls,
                });
            }
        }
    }

    out
}

/// Normalize a completion into a `Message::Response`.
pub fn normalize(completion: ChatCompletion) -> Result<ModelResponse, ProviderError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

    let mut parts = Vec::new();
    if let Some(reasoning) = choice.message.reasoning_content.filter(|r| !r.is_empty()) {
        parts.push(Part::thinking(reasoning));
    }
    if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
        parts.push(Part::text(content));
    }
    for tc in choice.message.tool_calls.unwrap_or_default() {
        parts.push(Part::ToolCall(ToolCallPart::new(
            tc.function.name,
            serde_json::Value::String(tc.function.arguments),
            tc.id,
        )));
    }

    let mut message = Message::response(parts).with_model_name(completion.model.clone());
    if let Some(reason) = choice.finish_reason {
        message = message.with_finish_reason(reason);
    }

    Ok(ModelResponse {
        message,
        usage: completion
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default(),
        model: completion.model,
    })
}

#[async_trait]
impl Model for OpenAiChatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let body = build_body(&request, false);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let completion: ChatCompletion = http::send_json(&self.name, self.request(&body)).await?;
        normalize(completion)
    }

    async fn stream(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let body = build_body(&request, true);
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .request(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(http::transport_error)?;
        let response = http::check_status(&self.name, response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(forward_sse(provider_name, response.bytes_stream(), tx));

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let request = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key);
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

/// Parse an SSE byte stream into chunks on `tx`.
///
/// A stream that ends before `[DONE]` is reported as interrupted, never as
/// a finished (truncated) response.
async fn forward_sse<S, B, E>(provider_name: String, byte_stream: S, tx: ChunkSender)
where
    S: futures::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut sse = SseBuffer::default();
    let mut acc = StreamState::default();

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
            let SseLine::Data(data) = line else { continue };

            // "[DONE]" signals end of stream
            if data == "[DONE]" {
                let _ = tx.send(Ok(acc.finish())).await;
                return;
            }

            match serde_json::from_str::<StreamResponse>(&data) {
                Ok(event) => {
                    if let Some(chunk) = acc.apply(event) {
                        if tx.send(Ok(chunk)).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                Err(e) => {
                    trace!(
                        provider = %provider_name,
                        data = %data,
                        error = %e,
                        "Ignoring unparseable SSE chunk"
                    );
                }
            }
        }
    }

    warn!(provider = %provider_name, "SSE stream closed before [DONE]");
    let _ = tx
        .send(Err(ProviderError::StreamInterrupted(
            "connection closed before [DONE]".into(),
        )))
        .await;
}

/// Streaming accumulator: text deltas pass straight through, tool call
/// deltas are assembled by index and released with the final chunk.
#[derive(Default)]
struct StreamState {
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl StreamState {
    fn apply(&mut self, event: StreamResponse) -> Option<StreamChunk> {
        if let Some(usage) = event.usage {
            self.usage = Some(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        let choice = event.choices.into_iter().next()?;
        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                acc.id = id;
            }
            if let Some(func) = delta.function {
                if let Some(name) = func.name {
                    acc.name = name;
                }
                if let Some(args) = func.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }
        if choice.finish_reason.is_some() {
            self.finish_reason = choice.finish_reason;
        }

        let content = choice.delta.content.filter(|c| !c.is_empty());
        let thinking = choice.delta.reasoning_content.filter(|c| !c.is_empty());
        if content.is_none() && thinking.is_none() {
            return None;
        }
        Some(StreamChunk {
            content,
            thinking,
            ..Default::default()
        })
    }

    fn finish(&mut self) -> StreamChunk {
        let tool_calls = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|acc| {
                ToolCallPart::new(acc.name, serde_json::Value::String(acc.arguments), acc.id)
            })
            .collect();
        StreamChunk {
            tool_calls,
            finish_reason: self.finish_reason.take(),
            done: true,
            usage: self.usage.take(),
            ..Default::default()
        }
    }
}

// --- Chat Completions wire types ---

#[derive(Debug, Serialize)]
pub struct ChatRequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<serde_json::Value>,
}

/// One chat message, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ChatToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: ChatFunction,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFunction {
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

#[derive(Debug, Serialize)]
pub struct ChatToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    /// Reasoning text some compatible servers return
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
