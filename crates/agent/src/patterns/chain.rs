//! Prompt chaining: a fixed sequence of agents, each fed the previous output.

use agentry_core::provider::Usage;
use tracing::debug;

use crate::error::AgentError;
use crate::loop_runner::Agent;

/// One step: an agent and a prompt template with an `{input}` placeholder.
pub struct ChainStep {
    pub agent: Agent,
    pub template: String,
}

#[derive(Debug)]
pub struct ChainResult {
    /// Output of every step, in order
    pub outputs: Vec<String>,
    pub usage: Usage,
}

impl ChainResult {
    pub fn output(&self) -> &str {
        self.outputs.last().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Default)]
pub struct PromptChain {
    steps: Vec<ChainStep>,
}

impl PromptChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, agent: Agent, template: impl Into<String>) -> Self {
        self.steps.push(ChainStep {
            agent,
            template: template.into(),
        });
        self
    }

    pub async fn run(&self, input: &str) -> Result<ChainResult, AgentError> {
        let mut current = input.to_string();
        let mut outputs = Vec::with_capacity(self.steps.len());
        let mut usage = Usage::default();

        for (index, step) in self.steps.iter().enumerate() {
            let prompt = step.template.replace("{input}", &current);
            debug!(step = index, agent = %step.agent.name(), "Running chain step");
            let run = step.agent.run(&prompt, Vec::new()).await?;
            usage += run.usage;
            current = run.text();
            outputs.push(current.clone());
        }

        Ok(ChainResult { outputs, usage })
    }
}
