//! The tool-calling agent loop.
//!
//! An [`Agent`] sends the conversation to its model, executes the tool
//! calls the model asks for, appends the returns, and repeats until the
//! model answers without tool calls:
//!
//! 1. **Request**: system prompt + history + user prompt
//! 2. **Respond**: the model returns text and/or tool calls
//! 3. **Execute**: every call gets exactly one tool return, in call order
//! 4. **Finish**: a response with no tool calls ends the run
//!
//! The loop stops with [`AgentError::MaxIterations`] if the model keeps
//! calling tools past the configured limit.

pub mod error;
pub mod loop_runner;
pub mod patterns;

pub use agentry_core::RunOutput;
pub use error::AgentError;
pub use loop_runner::{Agent, AgentRun, LoopState};

#[cfg(test)]
pub(crate) mod test_helpers;
