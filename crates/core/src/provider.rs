//! Model trait: the abstraction over LLM backends.
//!
//! A Model knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of chunks. Each wire
//! dialect (OpenAI Chat, OpenAI Responses, Anthropic, Gemini) implements it
//! and normalizes its response into a [`Message::Response`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::OutputSchema;
use crate::error::ProviderError;
use crate::message::{Message, Part, ToolCallPart};

/// Everything a dialect needs to build one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "gpt-4o-mini", "claude-sonnet-4-5")
    pub model: String,

    /// Agent instructions. Used when the history carries no system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// The full conversation so far
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Requested structured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<OutputSchema>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            instructions: None,
            messages,
            tools: Vec::new(),
            output_schema: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// The system prompt: every system-prompt part in the history joined by
    /// blank lines, or the instructions when the history has none.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .flat_map(|m| m.parts())
            .filter_map(|p| match p {
                Part::SystemPrompt { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            self.instructions.clone().filter(|s| !s.is_empty())
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The normalized assistant turn (always `Message::Response`)
    pub message: Message,

    /// Token usage for this call
    #[serde(default)]
    pub usage: Usage,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(mut self, rhs: Self) -> Usage {
        self += rhs;
        self
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial text delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial reasoning delta
    #[serde(default)]
    pub thinking: Option<String>,

    /// Completed tool calls (dialects accumulate argument deltas themselves)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallPart>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Reassembles a chunk sequence into the same shape `complete` returns.
///
/// Parts are ordered thinking, text, then tool calls.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    thinking: String,
    tool_calls: Vec<ToolCallPart>,
    finish_reason: Option<String>,
    usage: Usage,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: StreamChunk) {
        if let Some(text) = chunk.content {
            self.text.push_str(&text);
        }
        if let Some(thinking) = chunk.thinking {
            self.thinking.push_str(&thinking);
        }
        self.tool_calls.extend(chunk.tool_calls);
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if let Some(usage) = chunk.usage {
            self.usage += usage;
        }
        self.done |= chunk.done;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_response(self, model: impl Into<String>) -> ModelResponse {
        let model = model.into();
        let mut parts = Vec::new();
        if !self.thinking.is_empty() {
            parts.push(Part::thinking(self.thinking));
        }
        if !self.text.is_empty() {
            parts.push(Part::text(self.text));
        }
        parts.extend(self.tool_calls.into_iter().map(Part::ToolCall));

        let mut message = Message::response(parts).with_model_name(model.clone());
        if let Some(reason) = self.finish_reason {
            message = message.with_finish_reason(reason);
        }

        ModelResponse {
            message,
            usage: self.usage,
            model,
        }
    }
}

/// The core Model trait.
///
/// The agent loop calls `complete()` or `stream()` without knowing which
/// wire dialect sits behind it.
#[async_trait]
pub trait Model: Send + Sync {
    /// A human-readable provider name (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        let mut chunk = StreamChunk {
            done: true,
            usage: Some(response.usage),
            finish_reason: response.message.finish_reason().map(str::to_string),
            ..Default::default()
        };
        for part in response.message.parts() {
            match part {
                Part::Text { content } => {
                    chunk.content.get_or_insert_with(String::new).push_str(content)
                }
                Part::Thinking { content } => {
                    chunk.thinking.get_or_insert_with(String::new).push_str(content)
                }
                Part::ToolCall(call) => chunk.tool_calls.push(call.clone()),
                _ => {}
            }
        }

        let _ = tx.send(Ok(chunk)).await;
        Ok(rx)
    }

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}
