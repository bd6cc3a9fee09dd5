//! LLM-as-judge: grade a run against plain-language criteria.

use std::sync::Arc;

use agentry_core::agent::{AgentConfig, OutputSchema};
use agentry_core::message::ToolCallPart;
use agentry_core::provider::Model;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AgentError;
use crate::loop_runner::{Agent, AgentRun};

pub const JUDGE_INSTRUCTIONS: &str = "You are an expert judge evaluating the performance of an\nAI agent.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeCriterion {
    pub criterion_description: String,
    pub passed: bool,
    pub judgement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeFeedback {
    pub criteria: Vec<JudgeCriterion>,
    pub feedback: String,
}

impl JudgeFeedback {
    pub fn schema() -> OutputSchema {
        OutputSchema::new(
            "judge_feedback",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "criteria": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "criterion_description": { "type": "string" },
                                "passed": { "type": "boolean" },
                                "judgement": { "type": "string" }
                            },
                            "required": ["criterion_description", "passed", "judgement"]
                        }
                    },
                    "feedback": { "type": "string" }
                },
                "required": ["criteria", "feedback"]
            }),
        )
    }

    pub fn failed(&self) -> Vec<&JudgeCriterion> {
        self.criteria.iter().filter(|c| !c.passed).collect()
    }

    pub fn all_passed(&self) -> bool {
        self.criteria.iter().all(|c| c.passed)
    }
}

pub struct Judge {
    agent: Agent,
}

impl Judge {
    pub fn new(model_name: impl Into<String>, model: Arc<dyn Model>) -> Self {
        let config = AgentConfig::new(model_name, JUDGE_INSTRUCTIONS)
            .with_name("judge")
            .with_output_schema(JudgeFeedback::schema());
        Self {
            agent: Agent::new(config, model),
        }
    }

    pub async fn evaluate(
        &self,
        criteria: &[&str],
        output: &str,
        tool_calls: &[&ToolCallPart],
    ) -> Result<JudgeFeedback, AgentError> {
        let (feedback, _) = self
            .agent
            .run_typed::<JudgeFeedback>(&judge_prompt(criteria, output, tool_calls))
            .await?;
        info!(
            criteria = feedback.criteria.len(),
            failed = feedback.failed().len(),
            "Judge finished"
        );
        Ok(feedback)
    }

    /// Grade a finished run on its output and the tool calls it made.
    pub async fn evaluate_run(
        &self,
        criteria: &[&str],
        run: &AgentRun,
    ) -> Result<JudgeFeedback, AgentError> {
        self.evaluate(criteria, &run.text(), &run.tool_calls()).await
    }
}

pub fn judge_prompt(criteria: &[&str], output: &str, tool_calls: &[&ToolCallPart]) -> String {
    let calls = tool_calls
        .iter()
        .map(|c| format!("{}({}) id={}", c.tool_name, c.arguments_json(), c.call_id))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Evaluate the agent's performance based on the following criteria:\n\
         <CRITERIA>\n{}\n</CRITERIA>\n\n\
         The agent's final output was:\n\
         <AGENT_OUTPUT>\n{output}\n</AGENT_OUTPUT>\n\n\
         Tool calls:\n\
         <TOOL_CALLS>\n{calls}\n</TOOL_CALLS>",
        criteria.join("\n")
    )
}
