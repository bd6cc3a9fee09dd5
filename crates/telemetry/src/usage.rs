//! Per-model usage accumulation and cost reporting.

use agentry_core::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::pricing::PricingTable;

/// Accumulates token usage per model across runs.
///
/// Thread-safe via `RwLock`; share it behind an `Arc` when several agents
/// report into the same tracker.
pub struct UsageTracker {
    pricing: PricingTable,
    tallies: RwLock<HashMap<String, Tally>>,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    usage: Usage,
    calls: u64,
}

impl UsageTracker {
    /// Create a tracker with the default pricing table.
    pub fn new() -> Self {
        Self::with_pricing(PricingTable::with_defaults())
    }

    pub fn with_pricing(pricing: PricingTable) -> Self {
        Self {
            pricing,
            tallies: RwLock::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Record usage for one model call (or one run).
    pub fn record(&self, model: &str, usage: Usage) {
        let mut tallies = self.tallies.write().unwrap_or_else(PoisonError::into_inner);
        let tally = tallies.entry(model.to_string()).or_default();
        tally.usage += usage;
        tally.calls += 1;
        tracing::debug!(
            model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Recorded usage"
        );
    }

    /// Accumulated usage for a model.
    pub fn usage_for(&self, model: &str) -> Option<Usage> {
        let tallies = self.tallies.read().unwrap_or_else(PoisonError::into_inner);
        tallies.get(model).map(|t| t.usage)
    }

    /// Accumulated usage across all models.
    pub fn total_usage(&self) -> Usage {
        let tallies = self.tallies.read().unwrap_or_else(PoisonError::into_inner);
        tallies
            .values()
            .fold(Usage::default(), |acc, t| acc + t.usage)
    }

    /// Cost report: per model, most expensive first, plus totals.
    pub fn summary(&self) -> CostSummary {
        let tallies = self.tallies.read().unwrap_or_else(PoisonError::into_inner);

        let mut by_model: Vec<ModelCost> = tallies
            .iter()
            .map(|(model, tally)| {
                let pricing = self.pricing.get(model);
                ModelCost {
                    model: model.clone(),
                    cost_usd: pricing.map(|p| p.cost(tally.usage)).unwrap_or(0.0),
                    input_tokens: tally.usage.input_tokens,
                    output_tokens: tally.usage.output_tokens,
                    calls: tally.calls,
                    priced: pricing.is_some(),
                }
            })
            .collect();
        by_model.sort_by(|a, b| {
            b.cost_usd
                .partial_cmp(&a.cost_usd)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.model.cmp(&b.model))
        });

        CostSummary {
            total_cost_usd: by_model.iter().map(|m| m.cost_usd).sum(),
            total_input_tokens: by_model.iter().map(|m| m.input_tokens).sum(),
            total_output_tokens: by_model.iter().map(|m| m.output_tokens).sum(),
            calls: by_model.iter().map(|m| m.calls).sum(),
            by_model,
            from: self.started_at,
            to: Utc::now(),
        }
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        self.tallies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated cost summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Number of recorded calls.
    pub calls: u64,
    /// Cost breakdown by model.
    pub by_model: Vec<ModelCost>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Cost breakdown for a single model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCost {
    pub model: String,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
    /// False when the model had no pricing and was counted as free.
    pub priced: bool,
}

impl std::fmt::Display for CostSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for m in &self.by_model {
            write!(f, "{}: ${:.6}", m.model, m.cost_usd)?;
            if !m.priced {
                write!(f, " (no pricing)")?;
            }
            writeln!(f)?;
        }
        write!(f, "Total cost: ${:.6}", self.total_cost_usd)
    }
}
