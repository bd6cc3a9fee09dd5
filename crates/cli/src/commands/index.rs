//! `agentry index`: Build the documentation index cache.

use std::path::PathBuf;

use anyhow::Context;

use super::setup;

pub async fn run(docs: Option<PathBuf>, rebuild: bool) -> anyhow::Result<()> {
    let config = setup::load_config()?;
    let dir = docs
        .or_else(|| config.search.docs_dir.clone())
        .context("No docs directory. Pass --docs or set [search].docs_dir")?;

    let cache = config.index_cache_path();
    if rebuild && cache.exists() {
        std::fs::remove_file(&cache)
            .with_context(|| format!("Failed to remove {}", cache.display()))?;
    }

    let store = setup::build_store(&config, &dir)?;
    println!("Indexed {} documents from {}", store.len(), dir.display());
    println!("Cache: {}", cache.display());
    Ok(())
}
