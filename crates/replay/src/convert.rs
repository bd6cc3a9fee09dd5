//! Conversion between recorded OTel messages and the message model.
//!
//! Recording splits a request turn into separate `system` and `user`
//! records. Reading merges every run of non-assistant records back into a
//! single [`Message::Request`], so a round trip reproduces the original
//! turn structure.

use agentry_core::message::{Message, Part, ToolCallPart, ToolReturnPart};
use agentry_core::output::RunOutput;
use agentry_core::provider::Usage;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ReplayError;
use crate::otel::{OtelMessage, OtelPart, OtelRole, TraceData};

/// A run rebuilt from a trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedRun {
    pub messages: Vec<Message>,
    pub output: RunOutput,
    pub usage: Usage,
}

impl ReplayedRun {
    /// Every tool call in the history, in order.
    pub fn tool_calls(&self) -> Vec<&ToolCallPart> {
        self.messages.iter().flat_map(|m| m.tool_calls()).collect()
    }
}

/// Rebuild the message history from recorded records.
pub fn otel_to_messages(records: &[OtelMessage]) -> Result<Vec<Message>, ReplayError> {
    let mut messages = Vec::new();
    let mut pending: Vec<Part> = Vec::new();

    for record in records {
        match record.role {
            OtelRole::Assistant => {
                if !pending.is_empty() {
                    messages.push(Message::request(std::mem::take(&mut pending)));
                }
                let mut parts = Vec::with_capacity(record.parts.len());
                for part in &record.parts {
                    match part {
                        OtelPart::Text { content } => parts.push(Part::text(content)),
                        OtelPart::Thinking { content } => parts.push(Part::thinking(content)),
                        OtelPart::ToolCall { id, name, arguments } => {
                            let arguments = parse_arguments(name, arguments)?;
                            parts.push(Part::ToolCall(ToolCallPart::new(name, arguments, id)));
                        }
                        OtelPart::ToolCallResponse { .. } | OtelPart::Unknown => {}
                    }
                }
                messages.push(Message::Response {
                    parts,
                    finish_reason: record.finish_reason.clone(),
                    model_name: None,
                });
            }
            OtelRole::System => {
                pending.extend(record.parts.iter().filter_map(|part| match part {
                    OtelPart::Text { content } => Some(Part::system(content)),
                    _ => None,
                }));
            }
            OtelRole::User => {
                pending.extend(record.parts.iter().filter_map(|part| match part {
                    OtelPart::Text { content } => Some(Part::user(content)),
                    OtelPart::ToolCallResponse { id, name, result } => Some(Part::ToolReturn(
                        ToolReturnPart::new(name, id, result.clone()),
                    )),
                    _ => None,
                }));
            }
            OtelRole::Other => debug!("Skipping record with unknown role"),
        }
    }

    if !pending.is_empty() {
        messages.push(Message::request(pending));
    }
    Ok(messages)
}

fn parse_arguments(
    tool_name: &str,
    arguments: &serde_json::Value,
) -> Result<serde_json::Value, ReplayError> {
    match arguments {
        serde_json::Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            ReplayError::MalformedRecord(format!("arguments of tool call '{tool_name}': {e}"))
        }),
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        other => Ok(other.clone()),
    }
}

/// The output of the last response turn. See [`RunOutput::from_history`].
pub fn extract_output(messages: &[Message]) -> Result<RunOutput, ReplayError> {
    RunOutput::from_history(messages).map_err(|e| ReplayError::MalformedRecord(e.to_string()))
}

/// Like [`extract_output`], validated into `T`.
pub fn extract_output_as<T: DeserializeOwned>(messages: &[Message]) -> Result<T, ReplayError> {
    extract_output(messages)?
        .parse::<T>()
        .map_err(|e| ReplayError::MalformedRecord(format!("output does not match type: {e}")))
}

pub fn trace_to_run_result(trace: TraceData) -> Result<ReplayedRun, ReplayError> {
    let messages = otel_to_messages(&trace.all_messages)?;
    let output = extract_output(&messages)?;
    Ok(ReplayedRun {
        messages,
        output,
        usage: Usage::new(trace.input_tokens, trace.output_tokens),
    })
}

/// Record a history in the OTel message format.
///
/// A request becomes one record per contiguous run of system parts or of
/// user/tool-return parts; a response becomes one `assistant` record.
/// String-encoded tool arguments are stored parsed when they are valid JSON.
pub fn messages_to_otel(messages: &[Message]) -> Vec<OtelMessage> {
    let mut records = Vec::new();

    for message in messages {
        match message {
            Message::Request { parts } => {
                for part in parts {
                    let (role, otel_part) = match part {
                        Part::SystemPrompt { content } => {
                            (OtelRole::System, OtelPart::Text { content: content.clone() })
                        }
                        Part::UserPrompt { content } => {
                            (OtelRole::User, OtelPart::Text { content: content.clone() })
                        }
                        Part::ToolReturn(ret) => (
                            OtelRole::User,
                            OtelPart::ToolCallResponse {
                                id: ret.call_id.clone(),
                                name: ret.tool_name.clone(),
                                result: ret.content.clone(),
                            },
                        ),
                        _ => continue,
                    };
                    match records.last_mut() {
                        Some(OtelMessage { role: last, parts, .. }) if *last == role => {
                            parts.push(otel_part)
                        }
                        _ => records.push(OtelMessage::new(role, vec![otel_part])),
                    }
                }
            }
            Message::Response {
                parts,
                finish_reason,
                ..
            } => {
                let parts = parts
                    .iter()
                    .filter_map(|part| match part {
                        Part::Text { content } => Some(OtelPart::Text { content: content.clone() }),
                        Part::Thinking { content } => {
                            Some(OtelPart::Thinking { content: content.clone() })
                        }
                        Part::ToolCall(call) => Some(OtelPart::ToolCall {
                            id: call.call_id.clone(),
                            name: call.tool_name.clone(),
                            arguments: call
                                .parsed_arguments()
                                .unwrap_or_else(|_| call.arguments.clone()),
                        }),
                        _ => None,
                    })
                    .collect();
                records.push(OtelMessage {
                    role: OtelRole::Assistant,
                    parts,
                    finish_reason: finish_reason.clone(),
                });
            }
        }
    }
    records
}
