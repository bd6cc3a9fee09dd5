//! `agentry chat`: Interactive conversation with streamed answers.

use std::io::Write;
use std::path::PathBuf;

use agentry_agent::{Agent, AgentError, AgentRun};
use agentry_core::message::Message;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use super::setup;

/// Input that ends the conversation.
const STOP_WORD: &str = "stop";

pub async fn run(model: Option<String>, docs: Option<PathBuf>) -> anyhow::Result<()> {
    let config = setup::load_config()?;
    let spec = setup::model_spec(&config, model);
    let store = setup::load_docs(&config, docs)?;
    let agent = setup::build_agent(&config, &spec, store.as_ref())?;
    let tracker = setup::usage_tracker(&config);

    println!();
    println!("  Model:  {spec}");
    println!("  Tools:  {}", agent.tools().names().join(", "));
    println!("  Type '{STOP_WORD}' to end the conversation.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_stop(input) {
            break;
        }

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let printer = tokio::spawn(async move {
            print!("\n  Agent > ");
            while let Some(delta) = rx.recv().await {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
            println!("\n");
        });

        let result = turn(&agent, input, &mut history, tx).await;
        let _ = printer.await;

        match result {
            Ok(run) => tracker.record(&spec, run.usage),
            Err(e) => {
                warn!(error = %e, "Turn failed");
                eprintln!("  Error: {e}");
            }
        }
    }

    eprintln!("{}", tracker.summary());
    Ok(())
}

/// One conversational turn. A failed turn is rolled back so the earlier
/// conversation carries on untouched.
async fn turn(
    agent: &Agent,
    input: &str,
    history: &mut Vec<Message>,
    deltas: mpsc::Sender<String>,
) -> Result<AgentRun, AgentError> {
    let before = history.len();
    let result = agent.run_stream(input, history, deltas).await;
    if result.is_err() {
        history.truncate(before);
    }
    result
}

fn is_stop(input: &str) -> bool {
    input.eq_ignore_ascii_case(STOP_WORD)
}
