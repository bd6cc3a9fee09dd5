//! Agent configuration types.

use serde::{Deserialize, Serialize};

/// Configuration for one agent. Immutable for the lifetime of the agent;
/// the tool registry travels alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Used in logs and when the agent is exposed as a tool
    #[serde(default = "default_name")]
    pub name: String,

    /// Model name passed to the provider
    pub model: String,

    /// System prompt placed at the start of a fresh conversation
    #[serde(default)]
    pub instructions: String,

    /// When set, the final answer must be JSON matching this schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<OutputSchema>,

    /// Maximum model calls per run (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Execute the tool calls of one turn concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,
}

fn default_name() -> String {
    "agent".into()
}

fn default_max_iterations() -> u32 {
    25
}

impl AgentConfig {
    pub fn new(model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            model: model.into(),
            instructions: instructions.into(),
            output_schema: None,
            max_iterations: default_max_iterations(),
            max_tokens: None,
            temperature: None,
            parallel_tool_calls: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }
}

/// A named JSON Schema the final answer must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            schema,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
