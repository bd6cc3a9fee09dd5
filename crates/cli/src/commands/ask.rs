//! `agentry ask`: Answer one question, optionally recording the run.

use std::path::PathBuf;
use std::time::Duration;

use agentry_agent::AgentRun;
use agentry_replay::{FileStore, TraceData, messages_to_otel};
use anyhow::Context;
use tracing::info;

use super::setup;

pub async fn run(
    question: &str,
    model: Option<String>,
    docs: Option<PathBuf>,
    record: Option<PathBuf>,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let config = setup::load_config()?;
    let spec = setup::model_spec(&config, model);
    let store = setup::load_docs(&config, docs)?;
    let agent = setup::build_agent(&config, &spec, store.as_ref())?;

    let run = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), agent.run(question, Vec::new()))
            .await
            .map_err(|_| anyhow::anyhow!("Run timed out after {secs}s"))??,
        None => agent.run(question, Vec::new()).await?,
    };

    println!("{}", run.output);
    print_tool_calls(&run);

    let tracker = setup::usage_tracker(&config);
    tracker.record(&spec, run.usage);
    eprintln!("{}", tracker.summary());

    if let Some(path) = record {
        let trace_id = record_run(&path, &run).await?;
        info!(trace_id = %trace_id, path = %path.display(), "Run recorded");
        eprintln!("Recorded as trace {trace_id}");
    }
    Ok(())
}

fn print_tool_calls(run: &AgentRun) {
    let calls = run.tool_calls();
    if calls.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("Tool calls:");
    for call in calls {
        eprintln!("  {}({})", call.tool_name, call.arguments_json());
    }
}

/// Write the run as a trace row under a fresh trace id.
pub async fn record_run(path: &std::path::Path, run: &AgentRun) -> anyhow::Result<String> {
    let trace_id = uuid::Uuid::new_v4().simple().to_string();
    let trace = TraceData {
        all_messages: messages_to_otel(&run.messages),
        input_tokens: run.usage.input_tokens,
        output_tokens: run.usage.output_tokens,
    };
    FileStore::new(path)
        .record(&trace_id, &trace)
        .await
        .with_context(|| format!("Failed to record run to {}", path.display()))?;
    Ok(trace_id)
}
