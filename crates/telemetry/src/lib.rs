//! Cost tracking for Agentry agents.
//!
//! A built-in per-model pricing table plus a thread-safe tracker that
//! accumulates token usage per model and reports per-model and total cost.

pub mod pricing;
pub mod usage;

pub use pricing::{ModelPricing, PricingTable};
pub use usage::{CostSummary, ModelCost, UsageTracker};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("no pricing for model '{0}'")]
    UnknownModel(String),
}
