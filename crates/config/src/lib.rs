//! Configuration loading, validation, and management for Agentry.
//!
//! Loads configuration from `~/.agentry/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentry/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default provider ("openai", "openai-responses", "anthropic", "gemini", "groq")
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSection,

    /// Provider-specific configurations, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Documentation search tool settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Trace replay settings
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Cost tracking configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .field("search", &self.search)
            .field("replay", &self.replay)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// System prompt for `ask` and `chat`
    #[serde(default = "default_instructions")]
    pub instructions: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default)]
    pub parallel_tool_calls: bool,
}

fn default_instructions() -> String {
    "You are a helpful assistant. Use the available tools when they help answer the question."
        .into()
}
fn default_max_iterations() -> u32 {
    25
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
            max_iterations: default_max_iterations(),
            parallel_tool_calls: false,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override (e.g. an OpenAI-compatible proxy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Directory holding the documentation to index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_dir: Option<PathBuf>,

    /// File extensions to index
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Where the built index is cached; defaults to `~/.agentry/index.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

fn default_extensions() -> Vec<String> {
    vec!["md".into(), "mdx".into()]
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            docs_dir: None,
            extensions: default_extensions(),
            cache_path: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Base URL of the Logfire API
    #[serde(default = "default_logfire_url")]
    pub logfire_url: String,

    /// Logfire read token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_token: Option<String>,
}

fn default_logfire_url() -> String {
    "https://logfire-api.pydantic.dev".into()
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            logfire_url: default_logfire_url(),
            read_token: None,
        }
    }
}

impl std::fmt::Debug for ReplayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayConfig")
            .field("logfire_url", &self.logfire_url)
            .field("read_token", &redact(&self.read_token))
            .finish()
    }
}

/// Cost tracking configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Custom model pricing overrides (model name -> pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentry/config.toml),
    /// then apply environment overrides:
    /// - `AGENTRY_PROVIDER`, `AGENTRY_MODEL`
    /// - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY` / `GOOGLE_API_KEY`, `GROQ_API_KEY`
    /// - `LOGFIRE_READ_TOKEN`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = env("AGENTRY_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = env("AGENTRY_MODEL") {
            self.default_model = model;
        }

        let keys = [
            ("openai", env("OPENAI_API_KEY")),
            ("anthropic", env("ANTHROPIC_API_KEY")),
            (
                "gemini",
                env("GEMINI_API_KEY").or_else(|| env("GOOGLE_API_KEY")),
            ),
            ("groq", env("GROQ_API_KEY")),
        ];
        for (provider, key) in keys {
            if let Some(key) = key {
                self.providers.entry(provider.into()).or_default().api_key = Some(key);
            }
        }

        if let Some(token) = env("LOGFIRE_READ_TOKEN") {
            self.replay.read_token = Some(token);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentry")
    }

    /// Where the search index cache lives.
    pub fn index_cache_path(&self) -> PathBuf {
        self.search
            .cache_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("index.json"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.default_temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "default_temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if self.search.extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "search.extensions must list at least one extension".into(),
            ));
        }

        for (model, price) in &self.telemetry.custom_pricing {
            if price.input_per_m < 0.0 || price.output_per_m < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "custom pricing for '{model}' must not be negative"
                )));
            }
        }

        Ok(())
    }

    /// The API key for a provider, if configured.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.as_deref())
    }

    /// The base URL override for a provider, if configured.
    pub fn api_url(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_url.as_deref())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: None,
            default_max_tokens: None,
            agent: AgentSection::default(),
            providers: HashMap::new(),
            search: SearchConfig::default(),
            replay: ReplayConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
