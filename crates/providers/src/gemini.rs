//! Google Gemini `generateContent` dialect.
//!
//! Gemini speaks in `contents[]` with roles `user` and `model`. Each content
//! carries parts that are text, thoughts, function calls or function
//! responses. Function-call ids are optional on this wire, so the
//! normalizer mints one when the model leaves it out; the id is echoed back
//! on the matching function response.

use async_trait::async_trait;
use agentry_core::error::ProviderError;
use agentry_core::message::{Message, Part, ToolCallPart};
use agentry_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini native API provider.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: http::client(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// A classified wire part. Gemini sends every part as the same loose
/// object; this is what it actually is.
#[derive(Debug, Clone, PartialEq)]
pub enum GeminiPart {
    Text(String),
    Thought(String),
    FunctionCall {
        id: Option<String>,
        name: String,
        args: serde_json::Value,
    },
    FunctionResponse {
        id: Option<String>,
        name: String,
        response: serde_json::Value,
    },
}

impl GeminiPart {
    /// Classify a loose wire part. Parts with nothing recognizable yield `None`.
    pub fn classify(part: WirePart) -> Option<Self> {
        if let Some(call) = part.function_call {
            return Some(Self::FunctionCall {
                id: call.id,
                name: call.name,
                args: call.args.unwrap_or_else(|| serde_json::json!({})),
            });
        }
        if let Some(resp) = part.function_response {
            return Some(Self::FunctionResponse {
                id: resp.id,
                name: resp.name,
                response: resp.response,
            });
        }
        match (part.text, part.thought) {
            (Some(text), Some(true)) => Some(Self::Thought(text)),
            (Some(text), _) => Some(Self::Text(text)),
            (None, _) => None,
        }
    }

    fn into_wire(self) -> WirePart {
        match self {
            Self::Text(text) => WirePart {
                text: Some(text),
                ..Default::default()
            },
            Self::Thought(text) => WirePart {
                text: Some(text),
                thought: Some(true),
                ..Default::default()
            },
            Self::FunctionCall { id, name, args } => WirePart {
                function_call: Some(FunctionCall {
                    id,
                    name,
                    args: Some(args),
                }),
                ..Default::default()
            },
            Self::FunctionResponse { id, name, response } => WirePart {
                function_response: Some(FunctionResponse { id, name, response }),
                ..Default::default()
            },
        }
    }
}

/// Tool results must be JSON objects on this wire.
fn wrap_result(content: &serde_json::Value) -> serde_json::Value {
    match content {
        serde_json::Value::Object(_) => content.clone(),
        other => serde_json::json!({ "result": other }),
    }
}

fn mint_call_id() -> String {
    format!("gemini-{}", uuid::Uuid::new_v4())
}

/// Convert the message model to `contents[]`. System parts are lifted into
/// `systemInstruction` by [`build_body`]; consecutive same-role contents are
/// merged. Thinking is not sent back.
pub fn to_wire(messages: &[Message]) -> Vec<Content> {
    let mut out: Vec<Content> = Vec::new();

    for msg in messages {
        let (role, parts): (&str, Vec<GeminiPart>) = match msg {
            Message::Request { parts } => (
                "user",
                parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::UserPrompt { content } => Some(GeminiPart::Text(content.clone())),
                        Part::ToolReturn(ret) => Some(GeminiPart::FunctionResponse {
                            id: Some(ret.call_id.clone()),
                            name: ret.tool_name.clone(),
                            response: wrap_result(&ret.content),
                        }),
                        _ => None,
                    })
                    .collect(),
            ),
            Message::Response { parts, .. } => (
                "model",
                parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text { content } if !content.is_empty() => {
                            Some(GeminiPart::Text(content.clone()))
                        }
                        Part::ToolCall(call) => Some(GeminiPart::FunctionCall {
                            id: Some(call.call_id.clone()),
                            name: call.tool_name.clone(),
                            args: call
                                .parsed_arguments()
                                .unwrap_or_else(|_| serde_json::json!({})),
                        }),
                        _ => None,
                    })
                    .collect(),
            ),
        };

        if parts.is_empty() {
            continue;
        }
        let wire: Vec<WirePart> = parts.into_iter().map(GeminiPart::into_wire).collect();
        match out.last_mut() {
            Some(last) if last.role == role => last.parts.extend(wire),
            _ => out.push(Content {
                role: role.into(),
                parts: wire,
            }),
        }
    }

    out
}

/// Build the wire body for a request.
pub fn build_body(request: &ModelRequest) -> GenerateContentBody {
    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![GeminiTools {
            function_declarations: request
                .tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    };

    let (response_mime_type, response_schema) = match &request.output_schema {
        Some(schema) => (Some("application/json".to_string()), Some(schema.schema.clone())),
        None => (None, None),
    };

    GenerateContentBody {
        contents: to_wire(&request.messages),
        system_instruction: request.system_prompt().map(|text| SystemInstruction {
            parts: vec![WirePart {
                text: Some(text),
                ..Default::default()
            }],
        }),
        tools,
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
            response_mime_type,
            response_schema,
        },
    }
}

/// Normalize a `generateContent` response. Only the first candidate is used.
pub fn normalize(
    response: GenerateContentResponse,
    requested_model: &str,
) -> Result<ModelResponse, ProviderError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "Gemini returned no candidates".into(),
        })?;

    let wire_parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let parts = wire_parts
        .into_iter()
        .filter_map(GeminiPart::classify)
        .map(|part| match part {
            GeminiPart::Text(text) => Part::text(text),
            GeminiPart::Thought(text) => Part::thinking(text),
            GeminiPart::FunctionCall { id, name, args } => Part::ToolCall(ToolCallPart::new(
                name,
                args,
                id.filter(|s| !s.is_empty()).unwrap_or_else(mint_call_id),
            )),
            // Not expected from the model; keep the content visible
            GeminiPart::FunctionResponse { response, .. } => Part::text(response.to_string()),
        })
        .collect();

    let model = response
        .model_version
        .unwrap_or_else(|| requested_model.to_string());
    let mut message = Message::response(parts).with_model_name(model.clone());
    if let Some(reason) = candidate.finish_reason {
        message = message.with_finish_reason(reason);
    }

    Ok(ModelResponse {
        message,
        usage: response
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default(),
        model,
    })
}

#[async_trait]
impl Model for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let body = build_body(&request);
        debug!(provider = "gemini", model = %request.model, contents = body.contents.len(), "Sending generateContent request");

        let http_request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, request.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let response: GenerateContentResponse = http::send_json(&self.name, http_request).await?;
        normalize(response, &request.model)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let request = self
            .client
            .get(format!("{}/v1beta/models", self.base_url))
            .header("x-goog-api-key", &self.api_key);
        let body: serde_json::Value = http::send_json(&self.name, request).await?;

        Ok(body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(|n| n.trim_start_matches("models/").to_string())
                    .collect()
            })
            .unwrap_or_default())
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentBody {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GeminiTools>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

/// The loose on-the-wire part object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiTools {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}
