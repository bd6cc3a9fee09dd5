//! `agentry probe`: Which API features does each model support?

use agentry_providers::{Capability, ProviderRouter, Prober};
use anyhow::Context;

use super::setup;

pub async fn run(models: &[String], provider: &str) -> anyhow::Result<()> {
    let config = setup::load_config()?;
    let router = ProviderRouter::from_config(&config);

    let chat = router
        .get(provider)
        .with_context(|| format!("Provider '{provider}' is not configured"))?;
    // The responses dialect only exists for OpenAI; elsewhere those probes
    // run against the chat endpoint and fail with the reason.
    let responses = match provider {
        "openai" => router.get("openai-responses").unwrap_or_else(|| chat.clone()),
        _ => chat.clone(),
    };
    let prober = Prober::new(chat, responses);

    println!("{}", header());
    let mut incomplete = Vec::new();
    for model in models {
        let report = prober.probe(model).await;
        println!("{report}");
        if !report.is_feature_complete() {
            incomplete.push(report);
        }
    }

    for report in &incomplete {
        eprintln!();
        eprintln!("{}:", report.model);
        for failure in report.failures() {
            eprintln!("  {failure}");
        }
    }
    Ok(())
}

fn header() -> String {
    let mut header = format!("{:<45}", "model");
    for capability in Capability::ALL {
        header.push_str(&format!(" {:<width$}", capability.label(), width = capability.label().len().max(6)));
    }
    header
}
