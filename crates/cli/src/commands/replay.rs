//! `agentry replay`: Rebuild recorded runs without calling a model.

use std::path::PathBuf;

use agentry_core::message::{Message, Part};
use agentry_replay::{FileStore, LogfireStore, ReplayedRun, TraceStore, trace_to_run_result};
use anyhow::Context;

use super::setup;

pub async fn run(trace_ids: Vec<String>, file: Option<PathBuf>, show_messages: bool) -> anyhow::Result<()> {
    let store: Box<dyn TraceStore> = match file {
        Some(path) => Box::new(FileStore::new(path)),
        None => {
            let config = setup::load_config()?;
            let token = config
                .replay
                .read_token
                .clone()
                .context("No Logfire read token. Set LOGFIRE_READ_TOKEN or [replay].read_token")?;
            Box::new(LogfireStore::new(&config.replay.logfire_url, token))
        }
    };

    let mut traces = store.fetch_traces(&trace_ids).await?;
    let mut failed = 0;
    for trace_id in &trace_ids {
        let Some(trace) = traces.remove(trace_id) else {
            eprintln!("{trace_id}: no usable agent run span found");
            failed += 1;
            continue;
        };
        match trace_to_run_result(trace) {
            Ok(replayed) => print!("{}", render(trace_id, &replayed, show_messages)),
            Err(e) => {
                eprintln!("{trace_id}: {e}");
                failed += 1;
            }
        }
    }
    if failed == trace_ids.len() {
        anyhow::bail!("None of the {failed} trace(s) could be replayed");
    }
    Ok(())
}

fn render(trace_id: &str, run: &ReplayedRun, show_messages: bool) -> String {
    let mut out = format!("== {trace_id}\n");
    if show_messages {
        for message in &run.messages {
            out.push_str(&render_message(message));
        }
    }
    let calls = run.tool_calls();
    if !calls.is_empty() {
        out.push_str("Tool calls:\n");
        for call in calls {
            out.push_str(&format!("  {}({})\n", call.tool_name, call.arguments_json()));
        }
    }
    out.push_str(&format!(
        "Tokens: {} in / {} out\nOutput:\n{}\n\n",
        run.usage.input_tokens, run.usage.output_tokens, run.output
    ));
    out
}

fn render_message(message: &Message) -> String {
    let mut out = String::new();
    for part in message.parts() {
        let line = match part {
            Part::SystemPrompt { content } => format!("[system] {content}"),
            Part::UserPrompt { content } => format!("[user] {content}"),
            Part::Text { content } => format!("[assistant] {content}"),
            Part::Thinking { content } => format!("[thinking] {content}"),
            Part::ToolCall(call) => format!("[call {}] {}({})", call.call_id, call.tool_name, call.arguments_json()),
            Part::ToolReturn(ret) => format!("[return {}] {}", ret.call_id, ret.content_text()),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}
