//! Handoffs: each agent answers and may pass control to a peer.

use std::collections::BTreeMap;

use agentry_core::agent::OutputSchema;
use agentry_core::provider::Usage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AgentError;
use crate::loop_runner::Agent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffDecision {
    pub response: String,
    #[serde(default)]
    pub handoff_to: Option<String>,
    #[serde(default)]
    pub context_summary: Option<String>,
}

impl HandoffDecision {
    /// `handoff_to` is restricted to `peers` or null.
    pub fn schema(peers: &[&str]) -> OutputSchema {
        let mut targets: Vec<serde_json::Value> = peers.iter().map(|p| (*p).into()).collect();
        targets.push(serde_json::Value::Null);

        OutputSchema::new(
            "handoff_decision",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "response": { "type": "string" },
                    "handoff_to": { "type": ["string", "null"], "enum": targets },
                    "context_summary": { "type": ["string", "null"] }
                },
                "required": ["response"]
            }),
        )
    }
}

#[derive(Debug)]
pub struct HandoffResult {
    /// The response of the agent that kept control
    pub response: String,
    /// Agent names in the order they handled the question
    pub path: Vec<String>,
    pub usage: Usage,
}

pub struct Handoffs {
    agents: BTreeMap<String, Agent>,
    entry: String,
    max_handoffs: u32,
}

impl Handoffs {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            agents: BTreeMap::new(),
            entry: entry.into(),
            max_handoffs: 3,
        }
    }

    pub fn with_agent(mut self, name: impl Into<String>, agent: Agent) -> Self {
        self.agents.insert(name.into(), agent);
        self
    }

    pub fn with_max_handoffs(mut self, max_handoffs: u32) -> Self {
        self.max_handoffs = max_handoffs;
        self
    }

    /// Run from the entry agent. Once `max_handoffs` transfers happened the
    /// current response stands.
    pub async fn run(&self, question: &str) -> Result<HandoffResult, AgentError> {
        let mut current = self.entry.clone();
        let mut prompt = question.to_string();
        let mut path = Vec::new();
        let mut usage = Usage::default();

        loop {
            let agent = self
                .agents
                .get(&current)
                .ok_or_else(|| AgentError::UnknownRoute(current.clone()))?;
            let (decision, run) = agent.run_typed::<HandoffDecision>(&prompt).await?;
            usage += run.usage;
            path.push(current.clone());

            let transfers = path.len() as u32 - 1;
            match decision.handoff_to.filter(|t| !t.is_empty()) {
                Some(target) if transfers < self.max_handoffs => {
                    info!(from = %current, to = %target, "Handing off");
                    let summary = decision.context_summary.unwrap_or(decision.response);
                    prompt = format!("Previous context: {summary}\n\nOriginal question: {question}");
                    current = target;
                }
                _ => {
                    return Ok(HandoffResult {
                        response: decision.response,
                        path,
                        usage,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use agentry_core::agent::AgentConfig;
    use agentry_core::message::Part;
    use std::sync::Arc;

    fn agent(model: Arc<SequentialMockModel>) -> Agent {
        Agent::new(AgentConfig::new("mock-model", ""), model)
    }

    #[tokio::test]
    async fn passes_context_to_the_target() {
        let triage = Arc::new(SequentialMockModel::single_text(
            r#"{"response": "needs setup help", "handoff_to": "setup", "context_summary": "user on windows"}"#,
        ));
        let setup = Arc::new(SequentialMockModel::single_text(
            r#"{"response": "run install.ps1", "handoff_to": null}"#,
        ));

        let result = Handoffs::new("triage")
            .with_agent("triage", agent(triage))
            .with_agent("setup", agent(setup.clone()))
            .run("How do I install?")
            .await
            .unwrap();

        assert_eq!(result.response, "run install.ps1");
        assert_eq!(result.path, vec!["triage", "setup"]);
        assert_eq!(
            setup.requests()[0].messages[0].parts()[0],
            Part::user("Previous context: user on windows\n\nOriginal question: How do I install?")
        );
    }

    #[tokio::test]
    async fn max_handoffs_keeps_current_response() {
        let ping = Arc::new(SequentialMockModel::single_text(
            r#"{"response": "ping", "handoff_to": "pong"}"#,
        ));
        let pong = Arc::new(SequentialMockModel::single_text(
            r#"{"response": "pong", "handoff_to": "ping"}"#,
        ));

        let result = Handoffs::new("ping")
            .with_agent("ping", agent(ping))
            .with_agent("pong", agent(pong))
            .with_max_handoffs(1)
            .run("q")
            .await
            .unwrap();
        assert_eq!(result.response, "pong");
        assert_eq!(result.path.len(), 2);
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
        let triage = Arc::new(SequentialMockModel::single_text(
            r#"{"response": "x", "handoff_to": "billing"}"#,
        ));
        let err = Handoffs::new("triage")
            .with_agent("triage", agent(triage))
            .run("q")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownRoute(name) if name == "billing"));
    }
}
