//! # Agentry Core
//!
//! Domain types, traits, and error definitions for the Agentry tool-calling
//! agent toolkit. This crate has **no HTTP or runtime dependencies**; it
//! defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here: [`Model`] for LLM backends and [`Tool`] for
//! agent capabilities. Implementations live in their respective crates, so
//! tests can swap in scripted models and stub tools.

pub mod agent;
pub mod error;
pub mod message;
pub mod output;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, OutputSchema};
pub use error::{ProviderError, ToolError};
pub use message::{Message, Part, Role, ToolCallPart, ToolReturnPart};
pub use output::RunOutput;
pub use provider::{
    Model, ModelRequest, ModelResponse, StreamAccumulator, StreamChunk, ToolDefinition, Usage,
};
pub use tool::{Tool, ToolRegistry};
