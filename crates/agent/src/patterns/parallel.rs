//! Parallel analysis: named analysts look at the same subject concurrently
//! and an aggregator merges their reports.

use agentry_core::provider::Usage;
use futures::future::join_all;
use tracing::info;

use crate::error::AgentError;
use crate::loop_runner::Agent;

#[derive(Debug, Clone)]
pub struct AnalystReport {
    pub analyst: String,
    pub output: String,
}

#[derive(Debug)]
pub struct ParallelResult {
    /// One report per analyst, in registration order
    pub reports: Vec<AnalystReport>,
    pub summary: String,
    pub usage: Usage,
}

pub struct Parallel {
    analysts: Vec<(String, Agent)>,
    aggregator: Agent,
}

impl Parallel {
    pub fn new(aggregator: Agent) -> Self {
        Self {
            analysts: Vec::new(),
            aggregator,
        }
    }

    pub fn with_analyst(mut self, name: impl Into<String>, agent: Agent) -> Self {
        self.analysts.push((name.into(), agent));
        self
    }

    pub async fn run(&self, subject: &str) -> Result<ParallelResult, AgentError> {
        info!(analysts = self.analysts.len(), "Starting parallel analysis");

        let runs = join_all(self.analysts.iter().map(|(name, agent)| async move {
            let prompt = format!("Analyze the {} aspects of {subject}.", name.to_lowercase());
            agent.run(&prompt, Vec::new()).await
        }))
        .await;

        let mut usage = Usage::default();
        let mut reports = Vec::with_capacity(runs.len());
        for ((name, _), run) in self.analysts.iter().zip(runs) {
            let run = run?;
            usage += run.usage;
            reports.push(AnalystReport {
                analyst: name.clone(),
                output: run.text(),
            });
        }

        let sections = reports
            .iter()
            .map(|r| format!("## {}\n{}", r.analyst, r.output))
            .collect::<Vec<_>>()
            .join("\n\n");
        let summary = self
            .aggregator
            .run(
                &format!("Combine these analyses of {subject}:\n\n{sections}"),
                Vec::new(),
            )
            .await?;
        usage += summary.usage;

        Ok(ParallelResult {
            reports,
            summary: summary.text(),
            usage,
        })
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
    async fn reports_keep_analyst_order() {
        let security = Arc::new(SequentialMockModel::single_text("no secrets in repo"));
        let performance = Arc::new(SequentialMockModel::single_text("fast enough"));
        let aggregator = Arc::new(SequentialMockModel::single_text("All good"));

        let result = Parallel::new(agent(aggregator.clone()))
            .with_analyst("Security", agent(security.clone()))
            .with_analyst("Performance", agent(performance))
            .run("the ingest service")
            .await
            .unwrap();

        let names: Vec<&str> = result.reports.iter().map(|r| r.analyst.as_str()).collect();
        assert_eq!(names, vec!["Security", "Performance"]);
        assert_eq!(result.summary, "All good");
        assert_eq!(result.usage, Usage::new(30, 15));

        assert_eq!(
            security.requests()[0].messages[0].parts()[0],
            Part::user("Analyze the security aspects of the ingest service.")
        );
        let Part::UserPrompt { content } = aggregator.requests()[0].messages[0].parts()[0].clone() else {
            panic!("expected user prompt");
        };
        assert!(content.ends_with("## Security\nno secrets in repo\n\n## Performance\nfast enough"));
    }

    #[tokio::test]
    async fn analyst_failure_fails_the_run() {
        let broken = Arc::new(SequentialMockModel::new(vec![]));
        let aggregator = Arc::new(SequentialMockModel::single_text("unused"));
        let err = Parallel::new(agent(aggregator.clone()))
            .with_analyst("Cost", agent(broken))
            .run("x")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(aggregator.call_count(), 0);
    }
}
