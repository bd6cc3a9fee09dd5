//! Capability probe for models behind an OpenAI-compatible endpoint.
//!
//! Sends tiny requests through the chat and responses dialects and records
//! which features a model actually supports. Every probe keeps its failure
//! reason instead of collapsing it to a boolean.

use std::fmt;
use std::sync::Arc;

use agentry_core::error::ProviderError;
use agentry_core::message::Message;
use agentry_core::provider::{Model, ModelRequest};
use agentry_core::OutputSchema;
use tracing::{debug, info};

/// One probed feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ChatCompletions,
    Responses,
    Streaming,
    StructuredOutput,
    StructuredOutputResponses,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Self::ChatCompletions,
        Self::Responses,
        Self::Streaming,
        Self::StructuredOutput,
        Self::StructuredOutputResponses,
    ];

    /// Short column label for tabular output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ChatCompletions => "Chat",
            Self::Responses => "Resp",
            Self::Streaming => "Stream",
            Self::StructuredOutput => "Struct",
            Self::StructuredOutputResponses => "SO-Resp",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ChatCompletions => "chat completions",
            Self::Responses => "responses",
            Self::Streaming => "streaming",
            Self::StructuredOutput => "structured output",
            Self::StructuredOutputResponses => "structured output (responses)",
        };
        f.write_str(name)
    }
}

/// Why a probe failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{capability}: provider error: {source}")]
    Provider {
        capability: Capability,
        #[source]
        source: ProviderError,
    },

    #[error("{capability}: empty response")]
    EmptyResponse { capability: Capability },

    #[error("{capability}: unsupported: {reason}")]
    Unsupported {
        capability: Capability,
        reason: String,
    },
}

impl ProbeError {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Provider { capability, .. }
            | Self::EmptyResponse { capability }
            | Self::Unsupported { capability, .. } => *capability,
        }
    }
}

/// Probe results for one model, in [`Capability::ALL`] order.
#[derive(Debug)]
pub struct ProbeReport {
    pub model: String,
    pub outcomes: Vec<Result<Capability, ProbeError>>,
}

impl ProbeReport {
    pub fn supports(&self, capability: Capability) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, Ok(c) if *c == capability))
    }

    /// True when every capability probed successfully.
    pub fn is_feature_complete(&self) -> bool {
        Capability::ALL.iter().all(|c| self.supports(*c))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<45}", self.model)?;
        for capability in Capability::ALL {
            let mark = if self.supports(capability) { "OK" } else { "NO" };
            write!(f, " {:<width$}", mark, width = capability.label().len().max(6))?;
        }
        Ok(())
    }
}

/// The schema the structured-output probes ask for.
fn probe_schema() -> OutputSchema {
    OutputSchema::new(
        "probe_response",
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "word_count": { "type": "integer" }
            },
            "required": ["summary", "word_count"]
        }),
    )
}

fn hello_request(model: &str) -> ModelRequest {
    let mut request = ModelRequest::new(model, vec![Message::user("hi")]);
    request.max_tokens = Some(10);
    request
}

fn structured_request(model: &str) -> ModelRequest {
    let mut request = ModelRequest::new(model, vec![Message::user("say hello in 3 words")]);
    request.output_schema = Some(probe_schema());
    request
}

/// Runs the capability probes against a chat and a responses backend.
pub struct Prober {
    chat: Arc<dyn Model>,
    responses: Arc<dyn Model>,
}

impl Prober {
    pub fn new(chat: Arc<dyn Model>, responses: Arc<dyn Model>) -> Self {
        Self { chat, responses }
    }

    /// Probe every capability for one model, sequentially.
    pub async fn probe(&self, model: &str) -> ProbeReport {
        let mut outcomes = Vec::with_capacity(Capability::ALL.len());
        for capability in Capability::ALL {
            let outcome = self.probe_one(model, capability).await;
            match &outcome {
                Ok(_) => debug!(model, %capability, "Probe passed"),
                Err(e) => debug!(model, %capability, error = %e, "Probe failed"),
            }
            outcomes.push(outcome);
        }

        let report = ProbeReport {
            model: model.to_string(),
            outcomes,
        };
        info!(model, complete = report.is_feature_complete(), "Probed model");
        report
    }

    pub async fn probe_one(
        &self,
        model: &str,
        capability: Capability,
    ) -> Result<Capability, ProbeError> {
        let provider_err = |source| ProbeError::Provider { capability, source };

        match capability {
            Capability::ChatCompletions | Capability::Responses => {
                let backend = if capability == Capability::ChatCompletions {
                    &self.chat
                } else {
                    &self.responses
                };
                let response = backend
                    .complete(hello_request(model))
                    .await
                    .map_err(provider_err)?;
                if response.message.text().is_empty() {
                    return Err(ProbeError::EmptyResponse { capability });
                }
            }
            Capability::Streaming => {
                let mut rx = self
                    .chat
                    .stream(hello_request(model))
                    .await
                    .map_err(provider_err)?;
                let mut saw_text = false;
                while let Some(chunk) = rx.recv().await {
                    let chunk = chunk.map_err(provider_err)?;
                    if chunk.content.is_some_and(|c| !c.is_empty()) {
                        saw_text = true;
                        break;
                    }
                }
                if !saw_text {
                    return Err(ProbeError::EmptyResponse { capability });
                }
            }
            Capability::StructuredOutput | Capability::StructuredOutputResponses => {
                let backend = if capability == Capability::StructuredOutput {
                    &self.chat
                } else {
                    &self.responses
                };
                let response = backend
                    .complete(structured_request(model))
                    .await
                    .map_err(provider_err)?;
                let text = response.message.text();
                if text.trim().is_empty() {
                    return Err(ProbeError::EmptyResponse { capability });
                }
                check_structured(&text).map_err(|reason| ProbeError::Unsupported {
                    capability,
                    reason,
                })?;
            }
        }
        Ok(capability)
    }
}

/// Validate a structured answer against the probe schema.
fn check_structured(text: &str) -> Result<(), String> {
    let value: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|e| format!("not JSON: {e}"))?;
    if !value["summary"].is_string() {
        return Err("missing string field 'summary'".into());
    }
    if !value["word_count"].is_i64() && !value["word_count"].is_u64() {
        return Err("missing integer field 'word_count'".into());
    }
    Ok(())
}
