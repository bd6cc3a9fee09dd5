use thiserror::Error;

/// Errors raised while fetching or converting recorded traces.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("No agent run span found for trace_id={0}")]
    TraceNotFound(String),

    /// A record could not be decoded (bad JSON, missing fields, or
    /// unparseable tool arguments).
    #[error("Malformed trace record: {0}")]
    MalformedRecord(String),

    #[error("Trace query failed: {0}")]
    Query(String),

    #[error("Invalid trace id '{0}': expected hex")]
    InvalidTraceId(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<serde_json::Error> for ReplayError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedRecord(e.to_string())
    }
}
