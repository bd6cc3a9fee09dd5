//! The recorded message format: one record per role turn, each a list of
//! typed parts (`{"role": "user", "parts": [{"type": "text", ...}]}`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtelRole {
    System,
    User,
    Assistant,
    /// Any role the converter does not know; its record is skipped.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OtelPart {
    Text {
        #[serde(default)]
        content: String,
    },
    Thinking {
        #[serde(default)]
        content: String,
    },
    ToolCall {
        #[serde(default)]
        id: String,
        name: String,
        /// An object, or the same object encoded as a JSON string
        #[serde(default)]
        arguments: serde_json::Value,
    },
    ToolCallResponse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        result: serde_json::Value,
    },
    /// Part types the converter does not know (images, audio, ...)
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtelMessage {
    pub role: OtelRole,
    #[serde(default)]
    pub parts: Vec<OtelPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl OtelMessage {
    pub fn new(role: OtelRole, parts: Vec<OtelPart>) -> Self {
        Self {
            role,
            parts,
            finish_reason: None,
        }
    }
}

/// What a trace store returns for one agent run span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceData {
    pub all_messages: Vec<OtelMessage>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}
