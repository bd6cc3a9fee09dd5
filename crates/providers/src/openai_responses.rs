//! OpenAI Responses API dialect.
//!
//! The Responses API flattens a conversation into a list of typed input
//! items: plain role messages, `function_call` items the model issued, and
//! `function_call_output` items carrying tool results. Output comes back as
//! the same kind of items plus `reasoning`.

use async_trait::async_trait;
use agentry_core::error::ProviderError;
use agentry_core::message::{Message, Part, ToolCallPart};
use agentry_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

/// A Responses API provider.
pub struct OpenAiResponsesProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiResponsesProvider {
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
        Self::new("openai-responses", "https://api.openai.com/v1", api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Build the wire body for a request.
pub fn build_body(request: &ModelRequest) -> ResponsesRequestBody {
    let input = to_wire(&request.messages);
    let has_system = input
        .iter()
        .any(|item| matches!(item, InputItem::Message { role, .. } if role == "system"));

    ResponsesRequestBody {
        model: request.model.clone(),
        input,
        instructions: if has_system {
            None
        } else {
            request.system_prompt()
        },
        tools: request
            .tools
            .iter()
            .map(|t| ResponsesTool {
                kind: "function".into(),
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect(),
        text: request.output_schema.as_ref().map(|s| {
            let mut format = serde_json::json!({
                "type": "json_schema",
                "name": s.name,
                "schema": s.schema,
                "strict": false,
            });
            if let Some(description) = &s.description {
                format["description"] = serde_json::json!(description);
            }
            serde_json::json!({ "format": format })
        }),
        max_output_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

/// Convert the message model into flattened input items.
pub fn to_wire(messages: &[Message]) -> Vec<InputItem> {
    let mut out = Vec::new();

    for msg in messages {
        for part in msg.parts() {
            let item = match (msg, part) {
                (Message::Request { .. }, Part::SystemPrompt { content }) => InputItem::Message {
                    role: "system".into(),
                    content: content.clone(),
                },
                (Message::Request { .. }, Part::UserPrompt { content }) => InputItem::Message {
                    role: "user".into(),
                    content: content.clone(),
                },
                (Message::Request { .. }, Part::ToolReturn(ret)) => InputItem::FunctionCallOutput {
                    call_id: ret.call_id.clone(),
                    output: ret.content_text(),
                },
                (Message::Response { .. }, Part::Text { content }) => InputItem::Message {
                    role: "assistant".into(),
                    content: content.clone(),
                },
                (Message::Response { .. }, Part::ToolCall(call)) => InputItem::FunctionCall {
                    call_id: call.call_id.clone(),
                    name: call.tool_name.clone(),
                    arguments: call.arguments_json(),
                },
                // Reasoning items cannot be replayed without their server-side ids
                _ => continue,
            };
            out.push(item);
        }
    }

    out
}

/// Normalize a Responses API result into a `Message::Response`.
pub fn normalize(response: ResponsesResponse) -> ModelResponse {
    let mut parts = Vec::new();

    for item in response.output {
        match item {
            OutputItem::Reasoning { summary } => {
                let text: Vec<String> = summary.into_iter().map(|s| s.text).collect();
                if !text.is_empty() {
                    parts.push(Part::thinking(text.join("\n")));
                }
            }
            OutputItem::Message { content } => {
                for c in content {
                    match c {
                        OutputContent::OutputText { text } => parts.push(Part::text(text)),
                        OutputContent::Refusal { refusal } => parts.push(Part::text(refusal)),
                        OutputContent::Other => {}
                    }
                }
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => parts.push(Part::ToolCall(ToolCallPart::new(
                name,
                serde_json::Value::String(arguments),
                call_id,
            ))),
            OutputItem::Other => {}
        }
    }

    let mut message = Message::response(parts).with_model_name(response.model.clone());
    if let Some(status) = response.status {
        message = message.with_finish_reason(status);
    }

    ModelResponse {
        message,
        usage: response
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default(),
        model: response.model,
    }
}

#[async_trait]
impl Model for OpenAiResponsesProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let body = build_body(&request);
        debug!(provider = %self.name, model = %request.model, items = body.input.len(), "Sending responses request");

        let http_request = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let response: ResponsesResponse = http::send_json(&self.name, http_request).await?;
        Ok(normalize(response))
    }
}

// --- Responses API wire types ---

#[derive(Debug, Serialize)]
pub struct ResponsesRequestBody {
    pub model: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ResponsesTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// One flattened input item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: String,
        content: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ResponsesTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ResponsesResponse {
    pub model: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
}

/// One output item.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<ReasoningSummary>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ReasoningSummary {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ResponsesUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
