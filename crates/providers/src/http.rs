//! HTTP plumbing shared by every wire dialect: client construction, status
//! mapping, and server-sent-event line splitting.

use agentry_core::error::ProviderError;
use tracing::warn;

/// Build a reqwest client with the given request timeout.
pub(crate) fn client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Turn a non-2xx response into the matching `ProviderError`.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(provider, status = status.as_u16(), body = %body, "Provider returned error");
    Err(ProviderError::from_status(status.as_u16(), body))
}

/// Send a prepared request and decode the JSON body.
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;
    let response = check_status(provider, response).await?;
    response.json().await.map_err(|e| ProviderError::ApiError {
        status_code: 200,
        message: format!("Failed to parse {provider} response: {e}"),
    })
}

pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// One meaningful line of an SSE stream.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    /// `event: <name>`
    Event(String),
    /// `data: <payload>`
    Data(String),
}

/// Accumulates raw bytes and yields complete SSE lines.
///
/// Lines are decoded only once their `\n` has arrived, so a multi-byte
/// character split across network chunks stays intact.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete `event:` or `data:` line. Blank lines, comments and
    /// unknown fields are skipped.
    pub(crate) fn next_line(&mut self) -> Option<SseLine> {
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(event) = line.strip_prefix("event:") {
                return Some(SseLine::Event(event.trim().to_string()));
            }
            if let Some(data) = line.strip_prefix("data:") {
                return Some(SseLine::Data(data.trim().to_string()));
            }
        }
        None
    }
}
