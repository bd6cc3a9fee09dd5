//! Expose an agent as a tool so a coordinator can delegate to it.

use agentry_core::error::ToolError;
use agentry_core::tool::Tool;
use async_trait::async_trait;

use crate::loop_runner::Agent;

/// `<name> {task}`: runs the wrapped agent on `task` and returns its output.
pub struct AgentTool {
    name: String,
    description: String,
    agent: Agent,
}

impl AgentTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, agent: Agent) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            agent,
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "What the agent should do" }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let task = arguments["task"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: self.name.clone(),
                reason: "missing 'task'".into(),
            })?;

        let run = self
            .agent
            .run(task, Vec::new())
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(match run.output {
            agentry_core::RunOutput::Text(text) => text.into(),
            agentry_core::RunOutput::Structured(value) => value,
        })
    }
}
