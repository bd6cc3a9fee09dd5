//! Routing: classify the question, dispatch to a specialist.
//!
//! The classifier has no tools and answers with a [`RouteDecision`]. The
//! router looks the category up and runs the matching specialist on the
//! original question.

use std::collections::BTreeMap;
use std::sync::Arc;

use agentry_core::agent::{AgentConfig, OutputSchema};
use agentry_core::provider::Model;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AgentError;
use crate::loop_runner::{Agent, AgentRun};

/// The classifier's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub category: String,
    pub reasoning: String,
}

impl RouteDecision {
    /// Output schema restricting `category` to the given names.
    pub fn schema(categories: &[&str]) -> OutputSchema {
        OutputSchema::new(
            "route_decision",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "category": { "type": "string", "enum": categories },
                    "reasoning": { "type": "string" }
                },
                "required": ["category", "reasoning"]
            }),
        )
        .with_description("The category of the question and a brief reasoning")
    }
}

/// A routed run: the classification and the specialist's run.
#[derive(Debug)]
pub struct RoutedRun {
    pub decision: RouteDecision,
    pub run: AgentRun,
}

/// Classifier plus specialists keyed by category.
pub struct Router {
    classifier: Agent,
    routes: BTreeMap<String, Agent>,
}

impl Router {
    pub fn new(classifier: Agent) -> Self {
        Self {
            classifier,
            routes: BTreeMap::new(),
        }
    }

    /// Build the classifier from a config, constraining its output to the
    /// given categories.
    pub fn with_classifier(config: AgentConfig, model: Arc<dyn Model>, categories: &[&str]) -> Self {
        let config = config.with_output_schema(RouteDecision::schema(categories));
        Self::new(Agent::new(config, model))
    }

    pub fn with_route(mut self, category: impl Into<String>, specialist: Agent) -> Self {
        self.routes.insert(category.into(), specialist);
        self
    }

    pub fn categories(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    pub async fn classify(&self, question: &str) -> Result<RouteDecision, AgentError> {
        let (decision, _) = self.classifier.run_typed::<RouteDecision>(question).await?;
        Ok(decision)
    }

    /// Classify, then run the matching specialist on the question.
    pub async fn run(&self, question: &str) -> Result<RoutedRun, AgentError> {
        let decision = self.classify(question).await?;
        info!(category = %decision.category, reasoning = %decision.reasoning, "Routed question");

        let specialist = self
            .routes
            .get(&decision.category)
            .ok_or_else(|| AgentError::UnknownRoute(decision.category.clone()))?;
        let run = specialist.run(question, Vec::new()).await?;

        Ok(RoutedRun { decision, run })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn specialist(name: &str, answer: &str) -> Agent {
        Agent::new(
            AgentConfig::new("mock-model", "").with_name(name),
            Arc::new(SequentialMockModel::single_text(answer)),
        )
    }

    #[tokio::test]
    async fn dispatches_to_specialist() {
        let classifier = Arc::new(SequentialMockModel::single_text(
            r#"{"category": "architecture", "reasoning": "asks about modules"}"#,
        ));
        let router = Router::with_classifier(
            AgentConfig::new("mock-model", "Classify").with_name("router"),
            classifier.clone(),
            &["architecture", "getting-started"],
        )
        .with_route("architecture", specialist("architecture-specialist", "Modules are..."))
        .with_route("getting-started", specialist("getting-started-specialist", "Install..."));

        let routed = router.run("How is the codebase organized?").await.unwrap();
        assert_eq!(routed.decision.category, "architecture");
        assert_eq!(routed.run.text(), "Modules are...");

        let schema = classifier.requests()[0].output_schema.clone().unwrap();
        assert_eq!(
            schema.schema["properties"]["category"]["enum"],
            serde_json::json!(["architecture", "getting-started"])
        );
    }

    #[tokio::test]
    async fn unknown_category_is_an_error() {
        let classifier = Arc::new(SequentialMockModel::single_text(
            r#"{"category": "billing", "reasoning": "?"}"#,
        ));
        let router = Router::with_classifier(AgentConfig::new("mock-model", ""), classifier, &["api-usage"])
            .with_route("api-usage", specialist("api", "..."));

        let err = router.run("How much does it cost?").await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownRoute(c) if c == "billing"));
    }
}
