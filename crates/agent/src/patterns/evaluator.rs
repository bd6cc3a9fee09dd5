//! Evaluator-optimizer: a writer drafts, an evaluator scores the draft, and
//! the writer rewrites with the feedback until the draft is acceptable.

use agentry_core::agent::OutputSchema;
use agentry_core::provider::Usage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AgentError;
use crate::loop_runner::Agent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 1 to 10
    pub score: u8,
    pub is_acceptable: bool,
    pub feedback: String,
    #[serde(default)]
    pub factual_errors: Vec<String>,
}

impl Evaluation {
    pub fn schema() -> OutputSchema {
        OutputSchema::new(
            "evaluation",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "score": { "type": "integer", "minimum": 1, "maximum": 10 },
                    "is_acceptable": { "type": "boolean" },
                    "feedback": { "type": "string" },
                    "factual_errors": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["score", "is_acceptable", "feedback"]
            }),
        )
    }
}

#[derive(Debug)]
pub struct OptimizedDraft {
    pub draft: String,
    /// Every evaluation, in order
    pub evaluations: Vec<Evaluation>,
    pub accepted: bool,
    pub usage: Usage,
}

pub struct EvaluatorOptimizer {
    writer: Agent,
    evaluator: Agent,
    max_iterations: u32,
}

impl EvaluatorOptimizer {
    pub fn new(writer: Agent, evaluator: Agent) -> Self {
        Self {
            writer,
            evaluator,
            max_iterations: 3,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Draft, then evaluate and rewrite up to `max_iterations` times.
    /// The last draft is returned even when it was never accepted.
    pub async fn run(&self, task: &str) -> Result<OptimizedDraft, AgentError> {
        let first = self.writer.run(task, Vec::new()).await?;
        let mut usage = first.usage;
        let mut draft = first.text();
        let mut evaluations = Vec::new();

        for iteration in 1..=self.max_iterations {
            let (evaluation, run) = self
                .evaluator
                .run_typed::<Evaluation>(&format!("Task: {task}\n\nDraft:\n{draft}"))
                .await?;
            usage += run.usage;
            info!(
                iteration,
                score = evaluation.score,
                acceptable = evaluation.is_acceptable,
                "Draft evaluated"
            );

            let accepted = evaluation.is_acceptable;
            let rewrite_prompt = rewrite_prompt(task, &draft, &evaluation);
            evaluations.push(evaluation);
            if accepted {
                return Ok(OptimizedDraft {
                    draft,
                    evaluations,
                    accepted: true,
                    usage,
                });
            }
            if iteration == self.max_iterations {
                break;
            }

            let rewrite = self.writer.run(&rewrite_prompt, Vec::new()).await?;
            usage += rewrite.usage;
            draft = rewrite.text();
        }

        Ok(OptimizedDraft {
            draft,
            evaluations,
            accepted: false,
            usage,
        })
    }
}

fn rewrite_prompt(task: &str, draft: &str, evaluation: &Evaluation) -> String {
    let mut prompt = format!(
        "Task: {task}\n\nPrevious draft:\n{draft}\n\nFeedback (score {}/10): {}",
        evaluation.score, evaluation.feedback
    );
    if !evaluation.factual_errors.is_empty() {
        prompt.push_str("\n\nFactual errors to fix:\n");
        for error in &evaluation.factual_errors {
            prompt.push_str(&format!("- {error}\n"));
        }
    }
    prompt.push_str("\n\nRewrite the draft addressing the feedback.");
    prompt
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
    async fn rewrites_until_acceptable() {
        let writer = Arc::new(SequentialMockModel::new(vec![
            make_text_response("draft one"),
            make_text_response("draft two"),
        ]));
        let evaluator = Arc::new(SequentialMockModel::new(vec![
            make_text_response(
                r#"{"score": 4, "is_acceptable": false, "feedback": "too vague", "factual_errors": ["wrong port"]}"#,
            ),
            make_text_response(r#"{"score": 8, "is_acceptable": true, "feedback": "good"}"#),
        ]));

        let result = EvaluatorOptimizer::new(agent(writer.clone()), agent(evaluator))
            .run("Explain setup")
            .await
            .unwrap();

        assert!(result.accepted);
        assert_eq!(result.draft, "draft two");
        assert_eq!(result.evaluations.len(), 2);

        let Part::UserPrompt { content } = writer.requests()[1].messages[0].parts()[0].clone() else {
            panic!("expected user prompt");
        };
        assert!(content.contains("Previous draft:\ndraft one"));
        assert!(content.contains("- wrong port"));
    }

    #[tokio::test]
    async fn stops_at_max_iterations() {
        let rejection = r#"{"score": 2, "is_acceptable": false, "feedback": "no"}"#;
        let writer = Arc::new(SequentialMockModel::new(vec![
            make_text_response("d1"),
            make_text_response("d2"),
        ]));
        let evaluator = Arc::new(SequentialMockModel::new(vec![
            make_text_response(rejection),
            make_text_response(rejection),
        ]));

        let result = EvaluatorOptimizer::new(agent(writer.clone()), agent(evaluator))
            .with_max_iterations(2)
            .run("task")
            .await
            .unwrap();

        assert!(!result.accepted);
        assert_eq!(result.draft, "d2");
        assert_eq!(writer.call_count(), 2);
        assert_eq!(result.usage, Usage::new(40, 20));
    }
}
