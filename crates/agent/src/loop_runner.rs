//! The tool-calling agent loop.

use std::sync::Arc;

use agentry_core::agent::AgentConfig;
use agentry_core::error::{ProviderError, ToolError};
use agentry_core::message::{Message, Part, ToolCallPart, ToolReturnPart};
use agentry_core::output::{RunOutput, strip_code_fences};
use agentry_core::provider::{Model, ModelRequest, ModelResponse, StreamAccumulator, Usage};
use agentry_core::tool::{Tool, ToolRegistry};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AgentError;

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next model response
    AwaitingModel,
    /// Running the tool calls of the last response
    ExecutingTools,
    /// The last response had no tool calls
    Done,
}

/// The result of a finished run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Full history, prior turns included
    pub messages: Vec<Message>,
    /// Index of the first message this run appended
    pub new_message_index: usize,
    pub output: RunOutput,
    /// Usage summed over every model call
    pub usage: Usage,
    /// Tool-executing iterations
    pub iterations: u32,
    pub model_calls: u32,
}

impl AgentRun {
    /// Messages appended by this run.
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.new_message_index..]
    }

    /// Every tool call this run made, in order.
    pub fn tool_calls(&self) -> Vec<&ToolCallPart> {
        self.new_messages()
            .iter()
            .flat_map(|m| m.tool_calls())
            .collect()
    }

    /// The output as text (structured output is rendered as JSON).
    pub fn text(&self) -> String {
        self.output.to_string()
    }
}

/// An agent: a config, a model handle and the tools it may call.
///
/// The loop sends the history to the model, executes requested tools, and
/// appends their returns until the model answers without tool calls.
#[derive(Clone)]
pub struct Agent {
    config: AgentConfig,
    model: Arc<dyn Model>,
    tools: ToolRegistry,
}

impl Agent {
    pub fn new(config: AgentConfig, model: Arc<dyn Model>) -> Self {
        Self {
            config,
            model,
            tools: ToolRegistry::new(),
        }
    }

    /// Replace the tool registry.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Add one tool.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop for one prompt on top of `history`.
    pub async fn run(&self, prompt: &str, history: Vec<Message>) -> Result<AgentRun, AgentError> {
        let mut messages = history;
        self.run_inner(prompt, &mut messages, None).await
    }

    /// Run the loop, appending every message of the run to `history` as it
    /// happens. On error `history` keeps whatever the run appended before
    /// failing.
    pub async fn run_with_history(
        &self,
        prompt: &str,
        history: &mut Vec<Message>,
    ) -> Result<AgentRun, AgentError> {
        self.run_inner(prompt, history, None).await
    }

    /// Like [`run_with_history`](Self::run_with_history), but streams model
    /// output and forwards every text delta to `deltas`. A closed receiver
    /// does not stop the run.
    pub async fn run_stream(
        &self,
        prompt: &str,
        history: &mut Vec<Message>,
        deltas: mpsc::Sender<String>,
    ) -> Result<AgentRun, AgentError> {
        self.run_inner(prompt, history, Some(&deltas)).await
    }

    /// Run a fresh conversation and deserialize the output into `T`.
    pub async fn run_typed<T: DeserializeOwned>(
        &self,
        prompt: &str,
    ) -> Result<(T, AgentRun), AgentError> {
        let run = self.run(prompt, Vec::new()).await?;
        let value = run.output.parse::<T>().map_err(|e| AgentError::InvalidOutput {
            agent: self.config.name.clone(),
            reason: e.to_string(),
        })?;
        Ok((value, run))
    }

    async fn run_inner(
        &self,
        prompt: &str,
        messages: &mut Vec<Message>,
        deltas: Option<&mpsc::Sender<String>>,
    ) -> Result<AgentRun, AgentError> {
        info!(
            agent = %self.config.name,
            model = %self.config.model,
            history = messages.len(),
            tools = self.tools.len(),
            "Starting agent run"
        );

        let new_message_index = messages.len();
        if messages.is_empty() {
            let mut parts = Vec::with_capacity(2);
            if !self.config.instructions.is_empty() {
                parts.push(Part::system(&self.config.instructions));
            }
            parts.push(Part::user(prompt));
            messages.push(Message::request(parts));
        } else {
            messages.push(Message::user(prompt));
        }

        let definitions = self.tools.definitions();
        let mut state = LoopState::AwaitingModel;
        let mut usage = Usage::default();
        let mut model_calls = 0u32;
        let mut iterations = 0u32;

        loop {
            match state {
                LoopState::AwaitingModel => {
                    if model_calls >= self.config.max_iterations {
                        warn!(agent = %self.config.name, model_calls, "Max iterations reached with tool calls pending");
                        return Err(AgentError::MaxIterations {
                            agent: self.config.name.clone(),
                            max_iterations: self.config.max_iterations,
                        });
                    }

                    let request = self.request(messages, &definitions);
                    let response = match deltas {
                        Some(tx) => self.stream_response(request, tx).await?,
                        None => self.model.complete(request).await?,
                    };
                    model_calls += 1;
                    usage += response.usage;

                    let has_calls = response.message.has_tool_calls();
                    debug!(
                        agent = %self.config.name,
                        model_call = model_calls,
                        tool_calls = response.message.tool_calls().len(),
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "Model responded"
                    );
                    messages.push(response.message);

                    state = if has_calls {
                        LoopState::ExecutingTools
                    } else {
                        LoopState::Done
                    };
                }
                LoopState::ExecutingTools => {
                    let calls: Vec<ToolCallPart> = messages
                        .last()
                        .map(|m| m.tool_calls().into_iter().cloned().collect())
                        .unwrap_or_default();

                    let returns = self.execute_calls(&calls).await;
                    messages.push(Message::request(
                        returns.into_iter().map(Part::ToolReturn).collect(),
                    ));
                    iterations += 1;
                    state = LoopState::AwaitingModel;
                }
                LoopState::Done => break,
            }
        }

        let output = self.extract_output(messages)?;
        info!(
            agent = %self.config.name,
            model_calls,
            iterations,
            total_tokens = usage.total_tokens(),
            "Agent run finished"
        );

        Ok(AgentRun {
            messages: messages.clone(),
            new_message_index,
            output,
            usage,
            iterations,
            model_calls,
        })
    }

    fn request(&self, messages: &[Message], tools: &[agentry_core::ToolDefinition]) -> ModelRequest {
        let mut request = ModelRequest::new(&self.config.model, messages.to_vec());
        request.instructions = Some(self.config.instructions.clone());
        request.tools = tools.to_vec();
        request.output_schema = self.config.output_schema.clone();
        request.max_tokens = self.config.max_tokens;
        request.temperature = self.config.temperature;
        request
    }

    async fn stream_response(
        &self,
        request: ModelRequest,
        deltas: &mpsc::Sender<String>,
    ) -> Result<ModelResponse, AgentError> {
        let model = request.model.clone();
        let mut rx = self.model.stream(request).await?;
        let mut acc = StreamAccumulator::new();

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(text) = &chunk.content {
                let _ = deltas.send(text.clone()).await;
            }
            acc.push(chunk);
            if acc.is_done() {
                return Ok(acc.into_response(model));
            }
        }
        warn!(agent = %self.config.name, "Model stream closed before its final chunk");
        Err(ProviderError::StreamInterrupted("stream closed before completion".into()).into())
    }

    /// Execute one turn's tool calls; returns come back in call order.
    async fn execute_calls(&self, calls: &[ToolCallPart]) -> Vec<ToolReturnPart> {
        if self.config.parallel_tool_calls && calls.len() > 1 {
            join_all(calls.iter().map(|call| self.execute_call(call))).await
        } else {
            let mut returns = Vec::with_capacity(calls.len());
            for call in calls {
                returns.push(self.execute_call(call).await);
            }
            returns
        }
    }

    /// Execute one call. Every failure becomes a tool return the model can read.
    async fn execute_call(&self, call: &ToolCallPart) -> ToolReturnPart {
        let reply = |content: serde_json::Value| {
            ToolReturnPart::new(&call.tool_name, &call.call_id, content)
        };

        let Some(tool) = self.tools.get(&call.tool_name) else {
            warn!(agent = %self.config.name, tool = %call.tool_name, "Model called unknown tool");
            return reply(ToolError::NotFound(call.tool_name.clone()).to_string().into());
        };

        let arguments = match call.parsed_arguments() {
            Ok(args) => args,
            Err(e) => {
                warn!(agent = %self.config.name, tool = %call.tool_name, error = %e, "Unparseable tool arguments");
                let err = ToolError::InvalidArguments {
                    tool_name: call.tool_name.clone(),
                    reason: e.to_string(),
                };
                return reply(format!("Error: {err}").into());
            }
        };

        debug!(agent = %self.config.name, tool = %call.tool_name, call_id = %call.call_id, "Executing tool");
        let start = std::time::Instant::now();
        let result = tool.execute(arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                debug!(tool = %call.tool_name, duration_ms, "Tool finished");
                reply(value)
            }
            Err(e) => {
                warn!(tool = %call.tool_name, duration_ms, error = %e, "Tool execution failed");
                reply(format!("Error: {e}").into())
            }
        }
    }

    fn extract_output(&self, messages: &[Message]) -> Result<RunOutput, AgentError> {
        let invalid = |reason: String| AgentError::InvalidOutput {
            agent: self.config.name.clone(),
            reason,
        };

        let Some(last) = messages.last() else {
            return Ok(RunOutput::Text(String::new()));
        };
        let text = last.text();

        if self.config.output_schema.is_none() {
            return Ok(RunOutput::Text(text));
        }

        if !text.trim().is_empty() {
            return serde_json::from_str(strip_code_fences(&text))
                .map(RunOutput::Structured)
                .map_err(|e| invalid(format!("{e} in {text:?}")));
        }

        RunOutput::from_history(messages)
            .map_err(|e| invalid(e.to_string()))
            .and_then(|output| match output {
                RunOutput::Structured(_) => Ok(output),
                RunOutput::Text(_) => Err(invalid("empty response".into())),
            })
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("model", &self.config.model)
            .field("provider", &self.model.name())
            .field("tools", &self.tools)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use agentry_core::OutputSchema;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text argument"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Ok(arguments["text"].clone())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "fail".into(),
                reason: "disk full".into(),
            })
        }
    }

    /// Sleeps longer for earlier calls, so completion order is reversed.
    struct SlowTool {
        started: AtomicUsize,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            let n = self.started.fetch_add(1, Ordering::SeqCst) as u64;
            tokio::time::sleep(std::time::Duration::from_millis(30 - n * 10)).await;
            Ok(arguments["id"].clone())
        }
    }

    fn agent(model: Arc<SequentialMockModel>) -> Agent {
        agent_with(AgentConfig::new("mock-model", "You are helpful"), model)
    }

    #[tokio::test]
    async fn simple_text_response() {
        let model = Arc::new(SequentialMockModel::single_text("Hello! How can I help?"));
        let run = agent(model.clone()).run("Hello!", vec![]).await.unwrap();

        assert_eq!(run.output, RunOutput::Text("Hello! How can I help?".into()));
        // Request (system + user) and response
        assert_eq!(run.messages.len(), 2);
        assert_eq!(
            run.messages[0].parts(),
            &[Part::system("You are helpful"), Part::user("Hello!")]
        );
        assert_eq!(run.model_calls, 1);
        assert_eq!(run.iterations, 0);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn stops_at_first_answer_without_tool_calls() {
        let model = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "one"}))]),
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "two"}))]),
            make_text_response("done"),
            make_text_response("never sent"),
        ]));
        let run = agent(model.clone()).run("go", vec![]).await.unwrap();

        assert_eq!(run.output.as_text(), Some("done"));
        assert_eq!(run.iterations, 2);
        assert_eq!(run.model_calls, run.iterations + 1);
        assert_eq!(model.call_count(), 3);
        assert_eq!(run.usage, Usage::new(30, 15));
    }

    #[tokio::test]
    async fn every_call_gets_a_return_in_order() {
        let model = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![
                ToolCallPart::new("echo", serde_json::json!({"text": "a"}), "c1"),
                ToolCallPart::new("missing", serde_json::json!({}), "c2"),
                ToolCallPart::new("echo", serde_json::json!("{broken"), "c3"),
                ToolCallPart::new("fail", serde_json::json!({}), "c4"),
            ]),
            make_text_response("ok"),
        ]));
        let run = agent(model).run("go", vec![]).await.unwrap();

        let returns = run.messages[2].tool_returns();
        let ids: Vec<&str> = returns.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);

        assert_eq!(returns[0].content, "a");
        assert_eq!(returns[1].content_text(), "Tool 'missing' not found");
        assert!(returns[2].content_text().starts_with("Error: invalid arguments for 'echo':"));
        assert_eq!(
            returns[3].content_text(),
            "Error: Tool execution failed: fail: disk full"
        );
        assert_eq!(run.output.as_text(), Some("ok"));
    }

    #[tokio::test]
    async fn parallel_calls_keep_request_order() {
        let model = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![
                ToolCallPart::new("slow", serde_json::json!({"id": 1}), "c1"),
                ToolCallPart::new("slow", serde_json::json!({"id": 2}), "c2"),
                ToolCallPart::new("slow", serde_json::json!({"id": 3}), "c3"),
            ]),
            make_text_response("ok"),
        ]));
        let config = AgentConfig::new("mock-model", "").with_parallel_tool_calls(true);
        let agent = Agent::new(config, model).with_tool(Arc::new(SlowTool {
            started: AtomicUsize::new(0),
        }));

        let run = agent.run("go", vec![]).await.unwrap();
        let returns = run.messages[2].tool_returns();
        let contents: Vec<&serde_json::Value> = returns.iter().map(|r| &r.content).collect();
        assert_eq!(contents, vec![&serde_json::json!(1), &serde_json::json!(2), &serde_json::json!(3)]);
        // Empty instructions add no system part
        assert_eq!(run.messages[0].parts(), &[Part::user("go")]);
    }

    #[tokio::test]
    async fn max_iterations_is_an_error() {
        let model = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "x"}))]),
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "y"}))]),
        ]));
        let config = AgentConfig::new("mock-model", "").with_max_iterations(2);
        let err = Agent::new(config, model).run("loop", vec![]).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations { max_iterations: 2, .. }));
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let model = Arc::new(SequentialMockModel::new(vec![]));
        let err = agent(model).run("hi", vec![]).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }

    #[tokio::test]
    async fn prior_history_gets_a_bare_user_turn() {
        let model = Arc::new(SequentialMockModel::single_text("again"));
        let history = vec![
            Message::request(vec![Part::system("You are helpful"), Part::user("first")]),
            Message::assistant("answer"),
        ];
        let run = agent(model).run("second", history).await.unwrap();

        assert_eq!(run.new_message_index, 2);
        assert_eq!(run.messages[2], Message::user("second"));
        assert_eq!(run.new_messages().len(), 2);
    }

    #[tokio::test]
    async fn structured_output_from_text_or_tool_call() {
        let schema = OutputSchema::new("verdict", serde_json::json!({"type": "object"}));
        let config = AgentConfig::new("mock-model", "").with_output_schema(schema.clone());

        let model = Arc::new(SequentialMockModel::single_text("```json\n{\"ok\": true}\n```"));
        let run = Agent::new(config.clone(), model).run("judge", vec![]).await.unwrap();
        assert_eq!(run.output, RunOutput::Structured(serde_json::json!({"ok": true})));

        let model = Arc::new(SequentialMockModel::single_text("not json"));
        let err = Agent::new(config, model).run("judge", vec![]).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn run_typed_deserializes() {
        #[derive(serde::Deserialize)]
        struct Verdict {
            ok: bool,
        }

        let model = Arc::new(SequentialMockModel::single_text(r#"{"ok": false}"#));
        let agent = Agent::new(AgentConfig::new("mock-model", ""), model);
        let (verdict, run) = agent.run_typed::<Verdict>("judge").await.unwrap();
        assert!(!verdict.ok);
        assert_eq!(run.model_calls, 1);

        let model = Arc::new(SequentialMockModel::single_text("[1, 2]"));
        let agent = Agent::new(AgentConfig::new("mock-model", ""), model);
        assert!(matches!(
            agent.run_typed::<Verdict>("judge").await,
            Err(AgentError::InvalidOutput { .. })
        ));
    }

    #[tokio::test]
    async fn request_carries_config() {
        let model = Arc::new(SequentialMockModel::single_text("hi"));
        let mut config = AgentConfig::new("mock-model", "Be brief");
        config.max_tokens = Some(64);
        agent_with(config, model.clone()).run("hello", vec![]).await.unwrap();

        let request = &model.requests()[0];
        assert_eq!(request.model, "mock-model");
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.system_prompt().as_deref(), Some("Be brief"));
        let names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "fail"]);
    }

    fn agent_with(config: AgentConfig, model: Arc<SequentialMockModel>) -> Agent {
        Agent::new(config, model)
            .with_tool(Arc::new(EchoTool))
            .with_tool(Arc::new(FailingTool))
    }

    #[tokio::test]
    async fn run_stream_forwards_deltas() {
        let model = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "x"}))]),
            make_text_response("streamed answer"),
        ]));
        let (tx, mut rx) = mpsc::channel(16);
        let mut history = Vec::new();
        let run = agent(model).run_stream("go", &mut history, tx).await.unwrap();

        let mut received = String::new();
        while let Ok(delta) = rx.try_recv() {
            received.push_str(&delta);
        }
        assert_eq!(received, "streamed answer");
        assert_eq!(run.output.as_text(), Some("streamed answer"));
        assert_eq!(run.iterations, 1);
        assert_eq!(history, run.messages);
    }

    /// Streams one text delta, then drops the channel without a final chunk.
    struct TruncatedStreamModel;

    #[async_trait]
    impl Model for TruncatedStreamModel {
        fn name(&self) -> &str {
            "truncated"
        }

        async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ProviderError> {
            Err(ProviderError::Network("unused".into()))
        }

        async fn stream(
            &self,
            _request: ModelRequest,
        ) -> Result<mpsc::Receiver<Result<agentry_core::StreamChunk, ProviderError>>, ProviderError> {
            let (tx, rx) = mpsc::channel(4);
            tx.send(Ok(agentry_core::StreamChunk {
                content: Some("The answer is".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn truncated_stream_fails_the_run() {
        let agent = Agent::new(AgentConfig::new("mock-model", ""), Arc::new(TruncatedStreamModel));
        let (tx, _rx) = mpsc::channel(16);
        let mut history = Vec::new();
        let err = agent.run_stream("go", &mut history, tx).await.unwrap_err();

        assert!(matches!(err, AgentError::Provider(ProviderError::StreamInterrupted(_))));
        // Only the prompt made it into the history
        assert_eq!(history, vec![Message::user("go")]);
    }

    #[tokio::test]
    async fn history_survives_provider_error() {
        let model = Arc::new(SequentialMockModel::new(vec![make_tool_call_response(vec![
            ToolCallPart::new("echo", serde_json::json!({"text": "a"}), "c1"),
        ])]));
        let mut history = vec![
            Message::request(vec![Part::system("You are helpful"), Part::user("first")]),
            Message::assistant("answer"),
        ];
        let err = agent(model).run_with_history("second", &mut history).await.unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(history.len(), 5);
        assert_eq!(history[1], Message::assistant("answer"));
        assert_eq!(history[2], Message::user("second"));
        assert!(history[3].has_tool_calls());
        assert_eq!(history[4].tool_returns()[0].call_id, "c1");
    }
}
