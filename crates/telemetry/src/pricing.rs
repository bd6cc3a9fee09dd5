//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. Custom pricing can be added at runtime via TOML config.

use agentry_core::Usage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::TelemetryError;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given usage.
    pub fn cost(&self, usage: Usage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_m
            + usage.output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Thread-safe pricing table with built-in defaults, dated aliases and
/// custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
    aliases: HashMap<String, String>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // OpenAI
        prices.insert("gpt-4o-mini".into(), ModelPricing::new(0.15, 0.60));
        prices.insert("gpt-4o".into(), ModelPricing::new(2.50, 10.00));
        prices.insert("gpt-5-nano".into(), ModelPricing::new(0.075, 0.30));
        prices.insert("gpt-5-mini".into(), ModelPricing::new(0.25, 2.00));
        prices.insert("gpt-5.2".into(), ModelPricing::new(1.75, 14.00));
        prices.insert("gpt-5.2-pro".into(), ModelPricing::new(21.00, 168.00));

        // Anthropic
        prices.insert("claude-sonnet-4".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("claude-opus-4".into(), ModelPricing::new(15.0, 75.0));
        prices.insert("claude-3-5-haiku".into(), ModelPricing::new(0.8, 4.0));

        // Google
        prices.insert("gemini-2.0-flash".into(), ModelPricing::new(0.1, 0.4));
        prices.insert("gemini-1.5-pro".into(), ModelPricing::new(1.25, 5.0));
        prices.insert("gemini-1.5-flash".into(), ModelPricing::new(0.075, 0.3));

        // Groq-hosted
        prices.insert("llama-3.1-8b".into(), ModelPricing::new(0.05, 0.08));
        prices.insert("llama-3.3-70b".into(), ModelPricing::new(0.59, 0.79));

        // Dated snapshots the API reports back in `model`
        let aliases = HashMap::from([
            ("gpt-4o-mini-2024-07-18".to_string(), "gpt-4o-mini".to_string()),
            ("gpt-5-mini-2025-08-07".to_string(), "gpt-5-nano".to_string()),
        ]);

        Self {
            prices: RwLock::new(prices),
            aliases,
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            aliases: HashMap::new(),
        }
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(model.into().to_lowercase(), pricing);
    }

    /// Resolve pricing for a model name.
    ///
    /// Tries, in order: the exact (lowercased) name, a known alias, the name
    /// with any `provider:` or `provider/` prefix stripped, then the longest
    /// table key that prefixes the bare name (`gpt-4o-mini-2025-01-01`
    /// matches `gpt-4o-mini`).
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let lower = model.to_lowercase();

        if let Some(p) = prices.get(&lower) {
            return Some(*p);
        }

        let bare = lower
            .rsplit_once(':')
            .map(|(_, m)| m)
            .unwrap_or(&lower);
        let bare = bare.rsplit_once('/').map(|(_, m)| m).unwrap_or(bare);

        let resolved = self.aliases.get(bare).map(String::as_str).unwrap_or(bare);
        if let Some(p) = prices.get(resolved) {
            return Some(*p);
        }

        prices
            .iter()
            .filter(|(key, _)| resolved.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
    }

    /// Cost for a model call, or an error when the model is not priced.
    pub fn try_cost(&self, model: &str, usage: Usage) -> Result<f64, TelemetryError> {
        self.get(model)
            .map(|p| p.cost(usage))
            .ok_or_else(|| TelemetryError::UnknownModel(model.to_string()))
    }

    /// Cost for a model call, returning 0.0 if the model is not in the table.
    pub fn compute_cost(&self, model: &str, usage: Usage) -> f64 {
        match self.try_cost(model, usage) {
            Ok(cost) => cost,
            Err(e) => {
                tracing::warn!(error = %e, "No pricing found, counting as free");
                0.0
            }
        }
    }

    /// List all known model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // gpt-4o-mini: $0.15/M input, $0.60/M output
        let cost = table.compute_cost("gpt-4o-mini", Usage::new(1_000_000, 1_000_000));
        assert!(close(cost, 0.75));
    }

    #[test]
    fn provider_prefixes_are_stripped() {
        let table = PricingTable::with_defaults();
        let usage = Usage::new(1_000_000, 0);
        assert!(close(table.compute_cost("openai:gpt-4o", usage), 2.5));
        assert!(close(table.compute_cost("openai/gpt-4o", usage), 2.5));
    }

    #[test]
    fn aliases_resolve() {
        let table = PricingTable::with_defaults();
        let usage = Usage::new(0, 1_000_000);
        assert!(close(table.compute_cost("gpt-4o-mini-2024-07-18", usage), 0.60));
        // The dated gpt-5-mini snapshot is billed at the nano rate
        assert!(close(table.compute_cost("gpt-5-mini-2025-08-07", usage), 0.30));
    }

    #[test]
    fn longest_prefix_wins() {
        let table = PricingTable::with_defaults();
        let usage = Usage::new(1_000_000, 0);
        assert!(close(table.compute_cost("gpt-5.2-pro-2025-12-11", usage), 21.0));
        assert!(close(table.compute_cost("gpt-5.2-2025-12-11", usage), 1.75));
        assert!(close(table.compute_cost("claude-sonnet-4-5", usage), 3.0));
    }

    #[test]
    fn unknown_model() {
        let table = PricingTable::with_defaults();
        assert!(close(table.compute_cost("mystery-model", Usage::new(1000, 500)), 0.0));
        assert!(matches!(
            table.try_cost("mystery-model", Usage::new(1, 1)),
            Err(TelemetryError::UnknownModel(_))
        ));
    }

    #[test]
    fn custom_pricing() {
        let table = PricingTable::empty();
        assert!(table.is_empty());

        table.set("Custom-Model", ModelPricing::new(1.0, 2.0));
        assert_eq!(table.len(), 1);

        let cost = table.compute_cost("custom-model", Usage::new(1_000_000, 1_000_000));
        assert!(close(cost, 3.0));
    }

    #[test]
    fn set_overrides_existing() {
        let table = PricingTable::with_defaults();
        table.set("gpt-4o", ModelPricing::new(5.0, 20.0));
        let cost = table.compute_cost("gpt-4o", Usage::new(1_000_000, 0));
        assert!(close(cost, 5.0));
    }

    #[test]
    fn list_models_sorted() {
        let models = PricingTable::with_defaults().models();
        assert!(models.contains(&"gpt-5.2-pro".to_string()));
        assert!(models.windows(2).all(|w| w[0] <= w[1]));
    }
}
