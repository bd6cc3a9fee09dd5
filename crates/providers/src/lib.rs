//! LLM provider implementations for Agentry.
//!
//! Every wire dialect implements the `agentry_core::Model` trait and
//! normalizes its responses into the shared message model. The router
//! selects a dialect from a `"provider:model"` string.

pub mod anthropic;
pub mod gemini;
mod http;
pub mod openai_chat;
pub mod openai_responses;
pub mod probe;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai_chat::OpenAiChatProvider;
pub use openai_responses::OpenAiResponsesProvider;
pub use probe::{Capability, ProbeError, ProbeReport, Prober};
pub use router::ProviderRouter;
