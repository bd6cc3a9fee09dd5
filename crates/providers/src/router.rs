//! Provider router: builds the configured backends and resolves
//! `"provider:model"` strings to a model handle.

use std::collections::HashMap;
use std::sync::Arc;

use agentry_config::AppConfig;
use agentry_core::error::ProviderError;
use agentry_core::provider::Model;
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::openai_chat::OpenAiChatProvider;
use crate::openai_responses::OpenAiResponsesProvider;

/// Provider names the router knows how to build without an explicit URL.
pub const KNOWN_PROVIDERS: &[&str] = &[
    "openai",
    "openai-responses",
    "anthropic",
    "gemini",
    "groq",
    "ollama",
];

/// Routes model strings to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Model>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create an empty router with a default provider name.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Build every provider that has credentials in the config.
    ///
    /// `openai-responses` shares the `openai` key. Ollama needs no key and
    /// is always available. Any other `[providers.<name>]` entry with an
    /// `api_url` is treated as an OpenAI-compatible chat endpoint.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut router = Self::new(&config.default_provider);

        if let Some(key) = config.api_key("openai") {
            let base = config.api_url("openai");
            router.register("openai", Arc::new(match base {
                Some(url) => OpenAiChatProvider::new("openai", url, key),
                None => OpenAiChatProvider::openai(key),
            }));

            let responses_key = config.api_key("openai-responses").unwrap_or(key);
            router.register("openai-responses", Arc::new(match config.api_url("openai-responses").or(base) {
                Some(url) => OpenAiResponsesProvider::new("openai-responses", url, responses_key),
                None => OpenAiResponsesProvider::openai(responses_key),
            }));
        }

        if let Some(key) = config.api_key("anthropic") {
            let mut provider = AnthropicProvider::new(key);
            if let Some(url) = config.api_url("anthropic") {
                provider = provider.with_base_url(url);
            }
            router.register("anthropic", Arc::new(provider));
        }

        if let Some(key) = config.api_key("gemini") {
            let mut provider = GeminiProvider::new(key);
            if let Some(url) = config.api_url("gemini") {
                provider = provider.with_base_url(url);
            }
            router.register("gemini", Arc::new(provider));
        }

        if let Some(key) = config.api_key("groq") {
            router.register("groq", Arc::new(match config.api_url("groq") {
                Some(url) => OpenAiChatProvider::new("groq", url, key),
                None => OpenAiChatProvider::groq(key),
            }));
        }

        router.register(
            "ollama",
            Arc::new(OpenAiChatProvider::ollama(config.api_url("ollama"))),
        );

        for (name, provider_config) in &config.providers {
            if KNOWN_PROVIDERS.contains(&name.as_str()) {
                continue;
            }
            if let Some(url) = &provider_config.api_url {
                let key = provider_config.api_key.clone().unwrap_or_default();
                router.register(name.clone(), Arc::new(OpenAiChatProvider::new(name, url, key)));
            }
        }

        debug!(providers = ?router.list(), default = %router.default_provider, "Provider router built");
        router
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Model>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.providers.get(name).cloned()
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Resolve `"provider:model"` to a provider and a bare model name.
    ///
    /// A string without a recognized provider prefix is a model on the
    /// default provider (so `"llama3:8b"` on ollama still works).
    pub fn resolve(&self, spec: &str) -> Result<(Arc<dyn Model>, String), ProviderError> {
        let (provider_name, model) = match spec.split_once(':') {
            Some((prefix, model))
                if self.providers.contains_key(prefix) || KNOWN_PROVIDERS.contains(&prefix) =>
            {
                (prefix, model)
            }
            _ => (self.default_provider.as_str(), spec),
        };

        if model.is_empty() {
            return Err(ProviderError::ModelNotFound(spec.to_string()));
        }

        let provider = self.get(provider_name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "provider '{provider_name}' has no credentials configured"
            ))
        })?;
        Ok((provider, model.to_string()))
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_config::ProviderConfig;

    fn config_with(keys: &[(&str, &str)]) -> AppConfig {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|name| {
            keys.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        });
        config
    }

    #[test]
    fn builds_only_keyed_providers() {
        let router = ProviderRouter::from_config(&config_with(&[("OPENAI_API_KEY", "sk-test")]));
        assert_eq!(router.list(), vec!["ollama", "openai", "openai-responses"]);
        assert!(router.get("anthropic").is_none());
    }

    #[test]
    fn resolve_prefixed_model() {
        let router = ProviderRouter::from_config(&config_with(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]));

        let (provider, model) = router.resolve("anthropic:claude-sonnet-4-5").unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(model, "claude-sonnet-4-5");

        let (provider, model) = router.resolve("openai-responses:gpt-5-mini").unwrap();
        assert_eq!(provider.name(), "openai-responses");
        assert_eq!(model, "gpt-5-mini");
    }

    #[test]
    fn bare_model_uses_default_provider() {
        let router = ProviderRouter::from_config(&config_with(&[("OPENAI_API_KEY", "sk-test")]));
        let (provider, model) = router.resolve("gpt-4o-mini").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(model, "gpt-4o-mini");
    }

    #[test]
    fn colon_in_model_name_is_kept_on_default() {
        let mut config = config_with(&[]);
        config.default_provider = "ollama".into();
        let router = ProviderRouter::from_config(&config);
        let (provider, model) = router.resolve("llama3:8b").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(model, "llama3:8b");
    }

    #[test]
    fn unkeyed_provider_is_not_configured() {
        let router = ProviderRouter::from_config(&config_with(&[]));
        assert!(matches!(
            router.resolve("gemini:gemini-2.5-flash"),
            Err(ProviderError::NotConfigured(_))
        ));
        assert!(matches!(
            router.resolve("anthropic:"),
            Err(ProviderError::ModelNotFound(_))
        ));
    }

    #[test]
    fn custom_endpoint_is_chat_compatible() {
        let mut config = config_with(&[]);
        config.providers.insert(
            "openrouter".into(),
            ProviderConfig {
                api_key: Some("or-key".into()),
                api_url: Some("https://openrouter.ai/api/v1".into()),
                default_model: None,
            },
        );
        let router = ProviderRouter::from_config(&config);
        let (provider, model) = router.resolve("openrouter:anthropic/claude-sonnet-4").unwrap();
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(model, "anthropic/claude-sonnet-4");
    }
}
