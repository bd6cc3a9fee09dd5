//! Shared test helpers: a scripted model and response builders.

use std::sync::Mutex;

use agentry_core::error::ProviderError;
use agentry_core::message::{Message, Part, ToolCallPart};
use agentry_core::provider::{Model, ModelRequest, ModelResponse, Usage};

/// A mock model that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Calls past the end of the script fail.
pub struct SequentialMockModel {
    responses: Mutex<Vec<ModelResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl SequentialMockModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Model for SequentialMockModel {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        responses
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: format!(
                    "SequentialMockModel: no more responses (call #{index}, have {})",
                    responses.len()
                ),
            })
    }
}

/// A text-only response.
pub fn make_text_response(text: &str) -> ModelResponse {
    ModelResponse {
        message: Message::assistant(text).with_finish_reason("stop"),
        usage: Usage::new(10, 5),
        model: "mock-model".into(),
    }
}

/// A response carrying only tool calls.
pub fn make_tool_call_response(tool_calls: Vec<ToolCallPart>) -> ModelResponse {
    ModelResponse {
        message: Message::response(tool_calls.into_iter().map(Part::ToolCall).collect())
            .with_finish_reason("tool_calls"),
        usage: Usage::new(10, 5),
        model: "mock-model".into(),
    }
}

/// A tool call with id `call_<name>` and string-encoded arguments.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> ToolCallPart {
    ToolCallPart::new(name, serde_json::Value::String(args.to_string()), format!("call_{name}"))
}
