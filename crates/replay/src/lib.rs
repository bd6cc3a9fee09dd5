//! # Agentry Replay
//!
//! Rebuild agent runs from recorded OpenTelemetry spans.
//!
//! A [`TraceStore`] fetches the `agent run` span of a trace as
//! [`TraceData`]; [`trace_to_run_result`] turns it back into the message
//! history, the run's output and its token usage. Replays never call a
//! model.

pub mod convert;
pub mod error;
pub mod otel;
pub mod store;

pub use convert::{
    ReplayedRun, extract_output, extract_output_as, messages_to_otel, otel_to_messages,
    trace_to_run_result,
};
pub use error::ReplayError;
pub use otel::{OtelMessage, OtelPart, OtelRole, TraceData};
pub use store::{FileStore, LogfireStore, TraceStore};
