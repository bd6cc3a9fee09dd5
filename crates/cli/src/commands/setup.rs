//! Shared wiring: config, provider resolution, docs, and the agent itself.

use std::path::{Path, PathBuf};

use agentry_agent::Agent;
use agentry_config::AppConfig;
use agentry_core::agent::AgentConfig;
use agentry_core::tool::ToolRegistry;
use agentry_providers::ProviderRouter;
use agentry_telemetry::{ModelPricing, PricingTable, UsageTracker};
use agentry_tools::{DocumentStore, cached_index, documentation_registry};
use anyhow::Context;
use tracing::info;

pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

/// The `provider:model` spec to use: the flag, else the configured default.
pub fn model_spec(config: &AppConfig, flag: Option<String>) -> String {
    flag.unwrap_or_else(|| format!("{}:{}", config.default_provider, config.default_model))
}

/// Load the documentation named by `--docs` or `[search].docs_dir`, going
/// through the index cache. `None` when no docs directory is configured.
pub fn load_docs(config: &AppConfig, docs: Option<PathBuf>) -> anyhow::Result<Option<DocumentStore>> {
    let Some(dir) = docs.or_else(|| config.search.docs_dir.clone()) else {
        return Ok(None);
    };
    let store = build_store(config, &dir)?;
    info!(dir = %dir.display(), documents = store.len(), "Documentation loaded");
    Ok(Some(store))
}

pub fn build_store(config: &AppConfig, dir: &Path) -> anyhow::Result<DocumentStore> {
    let extensions = &config.search.extensions;
    let documents = cached_index(&config.index_cache_path(), || {
        DocumentStore::load_dir(dir, extensions).map(DocumentStore::into_documents)
    })
    .with_context(|| format!("Failed to index {}", dir.display()))?;
    Ok(DocumentStore::new(documents))
}

/// The documentation agent for `spec`, with search tools when docs exist.
pub fn build_agent(
    config: &AppConfig,
    spec: &str,
    docs: Option<&DocumentStore>,
) -> anyhow::Result<Agent> {
    let router = ProviderRouter::from_config(config);
    let (model, model_name) = router
        .resolve(spec)
        .with_context(|| format!("Cannot use model '{spec}'"))?;

    let mut agent_config = AgentConfig::new(&model_name, &config.agent.instructions)
        .with_name("docs-agent")
        .with_max_iterations(config.agent.max_iterations)
        .with_parallel_tool_calls(config.agent.parallel_tool_calls);
    agent_config.max_tokens = config.default_max_tokens;
    agent_config.temperature = config.default_temperature;

    let tools = docs.map(documentation_registry).unwrap_or_else(ToolRegistry::new);
    Ok(Agent::new(agent_config, model).with_tools(tools))
}

/// A usage tracker priced with the defaults plus `[telemetry.custom_pricing]`.
pub fn usage_tracker(config: &AppConfig) -> UsageTracker {
    let pricing = PricingTable::with_defaults();
    for (model, price) in &config.telemetry.custom_pricing {
        pricing.set(model, ModelPricing::new(price.input_per_m, price.output_per_m));
    }
    UsageTracker::with_pricing(pricing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_spec_falls_back_to_config() {
        let config = AppConfig::default();
        let spec = model_spec(&config, None);
        assert_eq!(spec, format!("{}:{}", config.default_provider, config.default_model));
        assert_eq!(model_spec(&config, Some("ollama:llama3".into())), "ollama:llama3");
    }

    #[test]
    fn custom_pricing_overrides_defaults() {
        let mut config = AppConfig::default();
        config.telemetry.custom_pricing.insert(
            "my-model".into(),
            agentry_config::PricingOverrideConfig {
                input_per_m: 1.0,
                output_per_m: 2.0,
            },
        );
        let tracker = usage_tracker(&config);
        assert!(tracker.pricing().get("my-model").is_some());
    }

    #[test]
    fn agent_without_docs_has_no_tools() {
        let config = AppConfig::default();
        let agent = build_agent(&config, "ollama:llama3", None).unwrap();
        assert!(agent.tools().is_empty());
        assert_eq!(agent.config().model, "llama3");
    }

    #[test]
    fn docs_are_cached_and_wired() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("intro.md"), "---\ntitle: Intro\n---\nHello").unwrap();

        let mut config = AppConfig::default();
        config.search.cache_path = Some(dir.path().join("cache.json"));
        let store = load_docs(&config, Some(dir.path().to_path_buf())).unwrap().unwrap();
        assert_eq!(store.len(), 1);
        assert!(dir.path().join("cache.json").exists());

        let agent = build_agent(&config, "ollama:llama3", Some(&store)).unwrap();
        assert_eq!(agent.tools().names(), vec!["get_file", "search"]);
    }
}
