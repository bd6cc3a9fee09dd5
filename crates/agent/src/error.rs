//! Errors that end an agent run.

use agentry_core::error::ProviderError;
use thiserror::Error;

/// Why a run stopped without a terminal answer.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model backend failed. Runs never retry.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The loop made `max_iterations` model calls and the model still
    /// asked for tools.
    #[error("agent '{agent}' exceeded {max_iterations} model calls")]
    MaxIterations { agent: String, max_iterations: u32 },

    /// A structured answer could not be parsed.
    #[error("agent '{agent}' produced invalid output: {reason}")]
    InvalidOutput { agent: String, reason: String },

    /// A router classified a prompt into a category with no specialist.
    #[error("no route registered for category '{0}'")]
    UnknownRoute(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = AgentError::MaxIterations {
            agent: "docs".into(),
            max_iterations: 3,
        };
        assert_eq!(err.to_string(), "agent 'docs' exceeded 3 model calls");

        let err: AgentError = ProviderError::Network("connection reset".into()).into();
        assert!(err.to_string().contains("connection reset"));
    }
}
