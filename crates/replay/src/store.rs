//! Where traces come from: Logfire's query API, or a file of exported rows.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ReplayError;
use crate::otel::{OtelMessage, TraceData};

/// Source of recorded agent runs.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// The most recent `agent run` span of a trace.
    async fn fetch_trace(&self, trace_id: &str) -> Result<TraceData, ReplayError>;

    /// Several traces at once. Ids without a span, or whose most recent
    /// span is malformed, are left out of the map.
    async fn fetch_traces(&self, trace_ids: &[String]) -> Result<HashMap<String, TraceData>, ReplayError>;
}

/// One row of the `agent run` query.
///
/// `all_messages` may be the JSON array itself or the array encoded as a
/// string; token counts may be numbers, numeric strings, or null.
#[derive(Debug, Deserialize)]
pub struct TraceRow {
    #[serde(default)]
    pub trace_id: Option<String>,
    pub all_messages: serde_json::Value,
    #[serde(default)]
    pub input_tokens: serde_json::Value,
    #[serde(default)]
    pub output_tokens: serde_json::Value,
}

impl TraceRow {
    pub fn into_trace(self) -> Result<TraceData, ReplayError> {
        let all_messages: Vec<OtelMessage> = match self.all_messages {
            serde_json::Value::String(raw) => serde_json::from_str(&raw)?,
            serde_json::Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        };
        Ok(TraceData {
            all_messages,
            input_tokens: token_count(&self.input_tokens),
            output_tokens: token_count(&self.output_tokens),
        })
    }
}

fn token_count(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Keep the first row per trace id. Rows must already be ordered most
/// recent first.
///
/// A malformed row drops only its own trace; an older row for the same id
/// is not used in its place.
fn first_row_per_trace(rows: Vec<TraceRow>) -> HashMap<String, TraceData> {
    let mut seen = HashSet::new();
    let mut traces = HashMap::new();
    for row in rows {
        let Some(trace_id) = row.trace_id.clone() else {
            warn!("Skipping row without trace_id");
            continue;
        };
        if !seen.insert(trace_id.clone()) {
            continue;
        }
        match row.into_trace() {
            Ok(trace) => {
                traces.insert(trace_id, trace);
            }
            Err(e) => warn!(trace_id = %trace_id, error = %e, "Skipping malformed trace"),
        }
    }
    traces
}

fn validate_trace_id(trace_id: &str) -> Result<(), ReplayError> {
    if trace_id.is_empty() || !trace_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ReplayError::InvalidTraceId(trace_id.to_string()));
    }
    Ok(())
}

const SELECT_RUN: &str = "SELECT
    trace_id,
    attributes->'pydantic_ai.all_messages' as all_messages,
    attributes->>'gen_ai.usage.input_tokens' as input_tokens,
    attributes->>'gen_ai.usage.output_tokens' as output_tokens
FROM records";

/// SQL for the most recent `agent run` span of one trace.
pub fn trace_query(trace_id: &str) -> Result<String, ReplayError> {
    validate_trace_id(trace_id)?;
    Ok(format!(
        "{SELECT_RUN}\nWHERE trace_id = '{trace_id}'\n  AND span_name = 'agent run'\nORDER BY start_timestamp DESC\nLIMIT 1"
    ))
}

/// SQL for the `agent run` spans of several traces, most recent first.
pub fn traces_query(trace_ids: &[String]) -> Result<String, ReplayError> {
    for id in trace_ids {
        validate_trace_id(id)?;
    }
    let ids = trace_ids
        .iter()
        .map(|id| format!("'{id}'"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "{SELECT_RUN}\nWHERE trace_id IN ({ids})\n  AND span_name = 'agent run'\nORDER BY start_timestamp DESC"
    ))
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<TraceRow>,
}

/// Logfire's read API (`GET /v1/query`).
pub struct LogfireStore {
    client: reqwest::Client,
    base_url: String,
    read_token: String,
}

impl LogfireStore {
    pub fn new(base_url: impl Into<String>, read_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            read_token: read_token.into(),
        }
    }

    async fn query(&self, sql: &str) -> Result<Vec<TraceRow>, ReplayError> {
        debug!(sql, "Querying Logfire");
        let response = self
            .client
            .get(format!("{}/v1/query", self.base_url))
            .bearer_auth(&self.read_token)
            .query(&[("sql", sql), ("json_rows", "true")])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ReplayError::Query(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplayError::Query(format!("HTTP {}: {body}", status.as_u16())));
        }
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| ReplayError::Query(format!("unreadable response: {e}")))?;
        Ok(body.rows)
    }
}

#[async_trait]
impl TraceStore for LogfireStore {
    async fn fetch_trace(&self, trace_id: &str) -> Result<TraceData, ReplayError> {
        let rows = self.query(&trace_query(trace_id)?).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ReplayError::TraceNotFound(trace_id.to_string()))?;
        row.into_trace()
    }

    async fn fetch_traces(&self, trace_ids: &[String]) -> Result<HashMap<String, TraceData>, ReplayError> {
        if trace_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self.query(&traces_query(trace_ids)?).await?;
        let traces = first_row_per_trace(rows);
        info!(requested = trace_ids.len(), found = traces.len(), "Fetched traces");
        Ok(traces)
    }
}

/// Newline-delimited JSON rows (`{"trace_id", "all_messages", ...}`),
/// most recent first, as exported from the query API or written by
/// `agentry ask --record`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn rows(&self) -> Result<Vec<TraceRow>, ReplayError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ReplayError::Io {
                path: self.path.clone(),
                source,
            })?;
        let mut rows = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(line = number + 1, error = %e, "Skipping unreadable trace row"),
            }
        }
        Ok(rows)
    }

    /// Prepend one run so it becomes the most recent row for its trace.
    pub async fn record(&self, trace_id: &str, trace: &TraceData) -> Result<(), ReplayError> {
        validate_trace_id(trace_id)?;
        let row = serde_json::json!({
            "trace_id": trace_id,
            "all_messages": trace.all_messages,
            "input_tokens": trace.input_tokens,
            "output_tokens": trace.output_tokens,
        });

        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ReplayError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        tokio::fs::write(&self.path, format!("{row}\n{existing}"))
            .await
            .map_err(|source| ReplayError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl TraceStore for FileStore {
    async fn fetch_trace(&self, trace_id: &str) -> Result<TraceData, ReplayError> {
        validate_trace_id(trace_id)?;
        self.rows()
            .await?
            .into_iter()
            .find(|row| row.trace_id.as_deref() == Some(trace_id))
            .ok_or_else(|| ReplayError::TraceNotFound(trace_id.to_string()))?
            .into_trace()
    }

    async fn fetch_traces(&self, trace_ids: &[String]) -> Result<HashMap<String, TraceData>, ReplayError> {
        if trace_ids.is_empty() {
            return Ok(HashMap::new());
        }
        for id in trace_ids {
            validate_trace_id(id)?;
        }
        let rows = self
            .rows()
            .await?
            .into_iter()
            .filter(|row| row.trace_id.as_ref().is_some_and(|id| trace_ids.contains(id)))
            .collect();
        Ok(first_row_per_trace(rows))
    }
}
