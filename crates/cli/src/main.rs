//! Agentry CLI, the main entry point.
//!
//! Commands:
//! - `ask`     Answer one question with the documentation agent
//! - `chat`    Interactive conversation until `stop`
//! - `replay`  Rebuild a recorded run from its trace
//! - `probe`   Check which API features a model supports
//! - `index`   Build (or rebuild) the documentation index cache

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentry",
    about = "Agentry: tool-calling agents, capability probes and trace replay",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the documentation agent a single question
    Ask {
        question: String,

        /// Model as `provider:model` (defaults to the configured one)
        #[arg(short, long)]
        model: Option<String>,

        /// Documentation directory to search
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Append the run as a trace row to this NDJSON file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Abort the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Chat with the documentation agent; type `stop` to quit
    Chat {
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        docs: Option<PathBuf>,
    },

    /// Rebuild recorded runs from their traces
    Replay {
        /// One or more trace ids (hex)
        #[arg(required = true)]
        trace_ids: Vec<String>,

        /// Read traces from an NDJSON file instead of Logfire
        #[arg(long)]
        file: Option<PathBuf>,

        /// Print the full message history
        #[arg(long)]
        messages: bool,
    },

    /// Probe models for chat, responses, streaming and structured output
    Probe {
        /// Model names to probe
        #[arg(required = true)]
        models: Vec<String>,

        /// OpenAI-compatible provider to probe through
        #[arg(short, long, default_value = "openai")]
        provider: String,
    },

    /// Build the documentation index cache
    Index {
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Discard the existing cache first
        #[arg(long)]
        rebuild: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            question,
            model,
            docs,
            record,
            timeout_secs,
        } => commands::ask::run(&question, model, docs, record, timeout_secs).await?,
        Commands::Chat { model, docs } => commands::chat::run(model, docs).await?,
        Commands::Replay {
            trace_ids,
            file,
            messages,
        } => commands::replay::run(trace_ids, file, messages).await?,
        Commands::Probe { models, provider } => commands::probe::run(&models, &provider).await?,
        Commands::Index { docs, rebuild } => commands::index::run(docs, rebuild).await?,
    }

    Ok(())
}
