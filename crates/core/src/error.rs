//! Error types for the Agentry domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the agent loop decides
//! which ones are fatal and which are folded back into the conversation.

use thiserror::Error;

/// A failure talking to a model endpoint. Always fatal for the current run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Map an HTTP status and body to the matching error variant.
    ///
    /// Shared by every wire dialect so that 429 / 401 / 403 mean the same
    /// thing regardless of which endpoint produced them.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => Self::AuthenticationFailed(body),
            404 => Self::ModelNotFound(body),
            _ => Self::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}

/// A failure resolving or running a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("invalid arguments for '{tool_name}': {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 500,
            message: "upstream exploded".into(),
        };
        assert_eq!(err.to_string(), "API request failed: upstream exploded (status: 500)");
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(401, "bad key".into()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ProviderError::from_status(403, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ProviderError::from_status(502, "bad gateway".into()),
            ProviderError::ApiError { status_code: 502, .. }
        ));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::InvalidArguments {
            tool_name: "search".into(),
            reason: "expected value at line 1".into(),
        };
        assert!(err.to_string().contains("search"));
        assert!(err.to_string().contains("line 1"));
        assert_eq!(ToolError::NotFound("nope".into()).to_string(), "Tool 'nope' not found");
    }
}
