//! Documentation search tools for Agentry agents.
//!
//! A docs directory is loaded into a [`DocumentStore`], indexed by a
//! [`SearchIndex`] implementation, and exposed to the model as two tools:
//! `search` (top results for a query) and `get_file` (one file by name).

pub mod cache;
pub mod document;
pub mod index;
pub mod search;

use std::path::PathBuf;
use std::sync::Arc;

use agentry_core::tool::ToolRegistry;

pub use cache::cached_index;
pub use document::{Document, DocumentStore};
pub use index::{KeywordIndex, SearchIndex};
pub use search::{GetFileTool, SearchTool};

/// Errors loading or caching documentation.
#[derive(Debug, thiserror::Error)]
pub enum ToolsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode document cache: {0}")]
    Cache(#[from] serde_json::Error),
}

/// Build a registry holding `search` and `get_file` over the given documents.
pub fn documentation_registry(store: &DocumentStore) -> ToolRegistry {
    let index = KeywordIndex::for_docs().fit(store.documents().to_vec());
    ToolRegistry::new()
        .with(Arc::new(SearchTool::new(Arc::new(index))))
        .with(Arc::new(GetFileTool::new(Arc::new(store.file_index()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_wires_both_tools() {
        let store = DocumentStore::new(vec![Document::parse(
            "reports.md",
            "---\ntitle: Reports\n---\nReports summarize evaluations.",
        )]);
        let registry = documentation_registry(&store);
        assert_eq!(registry.names(), vec!["get_file", "search"]);

        let hits = registry
            .execute("search", serde_json::json!({"query": "reports"}))
            .await
            .unwrap();
        assert_eq!(hits[0]["title"], "Reports");
    }
}
