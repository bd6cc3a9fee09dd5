//! Message and Part domain types.
//!
//! These are the value objects that flow through the whole toolkit:
//! the agent loop appends them, providers translate them to and from
//! their wire formats, and the replay converter rebuilds them from traces.
//!
//! A conversation is a plain `Vec<Message>` that only ever grows by append.

use serde::{Deserialize, Serialize};

/// The role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user (also carries tool returns)
    User,
    /// The model
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A model-issued request to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    /// Name of the tool to invoke
    pub tool_name: String,

    /// Arguments, either a structured value or a JSON-encoded string
    pub arguments: serde_json::Value,

    /// Provider-assigned (or minted) call id
    pub call_id: String,
}

impl ToolCallPart {
    pub fn new(
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        call_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            call_id: call_id.into(),
        }
    }

    /// The arguments as a structured value.
    ///
    /// String-encoded arguments are parsed; an empty string or `null`
    /// becomes `{}`. Malformed JSON is returned as an error.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.arguments {
            serde_json::Value::String(raw) if raw.trim().is_empty() => {
                Ok(serde_json::Value::Object(Default::default()))
            }
            serde_json::Value::String(raw) => serde_json::from_str(raw),
            serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
            other => Ok(other.clone()),
        }
    }

    /// The arguments as a JSON string (what OpenAI-style wires expect).
    pub fn arguments_json(&self) -> String {
        match &self.arguments {
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        }
    }
}

/// The result of executing a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReturnPart {
    pub tool_name: String,
    pub call_id: String,
    /// A string or a structured value
    pub content: serde_json::Value,
}

impl ToolReturnPart {
    pub fn new(
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        content: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    /// The content rendered as text: strings verbatim, everything else as JSON.
    pub fn content_text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// One typed fragment of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum Part {
    SystemPrompt { content: String },
    UserPrompt { content: String },
    Text { content: String },
    /// Model-internal reasoning. Order-preserving, never actionable.
    Thinking { content: String },
    ToolCall(ToolCallPart),
    ToolReturn(ToolReturnPart),
}

impl Part {
    pub fn system(content: impl Into<String>) -> Self {
        Self::SystemPrompt {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::UserPrompt {
            content: content.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self::Thinking {
            content: content.into(),
        }
    }
}

/// One turn in a conversation.
///
/// Consecutive system, user and tool-return content is held in a single
/// `Request`; everything the model produced in one call is a `Response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    Request {
        parts: Vec<Part>,
    },
    Response {
        parts: Vec<Part>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_name: Option<String>,
    },
}

impl Message {
    /// Create a request turn.
    pub fn request(parts: Vec<Part>) -> Self {
        Self::Request { parts }
    }

    /// Create a response turn.
    pub fn response(parts: Vec<Part>) -> Self {
        Self::Response {
            parts,
            finish_reason: None,
            model_name: None,
        }
    }

    /// Create a request carrying a single user prompt.
    pub fn user(content: impl Into<String>) -> Self {
        Self::request(vec![Part::user(content)])
    }

    /// Create a response carrying a single text part.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::response(vec![Part::text(content)])
    }

    /// Set the finish reason on a response. No-op on requests.
    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        if let Self::Response { finish_reason, .. } = &mut self {
            *finish_reason = Some(reason.into());
        }
        self
    }

    /// Set the responding model name on a response. No-op on requests.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        if let Self::Response { model_name, .. } = &mut self {
            *model_name = Some(name.into());
        }
        self
    }

    pub fn parts(&self) -> &[Part] {
        match self {
            Self::Request { parts } | Self::Response { parts, .. } => parts,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response { .. })
    }

    pub fn finish_reason(&self) -> Option<&str> {
        match self {
            Self::Response { finish_reason, .. } => finish_reason.as_deref(),
            Self::Request { .. } => None,
        }
    }

    /// The logical role of this turn.
    pub fn role(&self) -> Role {
        match self {
            Self::Response { .. } => Role::Assistant,
            Self::Request { parts }
                if !parts.is_empty()
                    && parts.iter().all(|p| matches!(p, Part::SystemPrompt { .. })) =>
            {
                Role::System
            }
            Self::Request { .. } => Role::User,
        }
    }

    /// All tool calls in this turn, in order.
    pub fn tool_calls(&self) -> Vec<&ToolCallPart> {
        self.parts()
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// All tool returns in this turn, in order.
    pub fn tool_returns(&self) -> Vec<&ToolReturnPart> {
        self.parts()
            .iter()
            .filter_map(|p| match p {
                Part::ToolReturn(ret) => Some(ret),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts().iter().any(|p| matches!(p, Part::ToolCall(_)))
    }

    /// Concatenation of all text parts, in order.
    pub fn text(&self) -> String {
        self.parts()
            .iter()
            .filter_map(|p| match p {
                Part::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }
}
