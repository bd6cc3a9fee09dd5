//! The `search` and `get_file` tools exposed to documentation agents.

use std::collections::HashMap;
use std::sync::Arc;

use agentry_core::error::ToolError;
use agentry_core::tool::Tool;
use async_trait::async_trait;
use tracing::debug;

use crate::index::SearchIndex;

/// Results returned per query.
pub const SEARCH_RESULTS: usize = 5;

fn string_arg<'a>(
    tool_name: &str,
    arguments: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments {
            tool_name: tool_name.into(),
            reason: format!("missing '{key}' argument"),
        })
}

/// Search the documentation index.
pub struct SearchTool {
    index: Arc<dyn SearchIndex>,
}

impl SearchTool {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the documentation for results matching a query. Returns up to 5 matching documents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to look up in the index"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let query = string_arg(self.name(), &arguments, "query")?;
        let results = self.index.search(query, SEARCH_RESULTS).await;
        debug!(query, results = results.len(), "Documentation search");

        serde_json::to_value(results).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

/// Fetch one documentation file by filename.
pub struct GetFileTool {
    files: Arc<HashMap<String, String>>,
}

impl GetFileTool {
    pub fn new(files: Arc<HashMap<String, String>>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl Tool for GetFileTool {
    fn name(&self) -> &str {
        "get_file"
    }

    fn description(&self) -> &str {
        "Retrieve a documentation file's contents by filename."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "The filename of the file to retrieve"
                }
            },
            "required": ["filename"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let filename = string_arg(self.name(), &arguments, "filename")?;
        // A missing file is an answer the model can act on, not a failure
        Ok(match self.files.get(filename) {
            Some(content) => serde_json::Value::String(content.clone()),
            None => serde_json::Value::String(format!("file {filename} does not exist")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::index::KeywordIndex;

    fn files() -> Arc<HashMap<String, String>> {
        let mut files = HashMap::new();
        files.insert("intro.md".to_string(), "Welcome".to_string());
        Arc::new(files)
    }

    #[tokio::test]
    async fn search_returns_at_most_five() {
        let docs = (0..8)
            .map(|i| Document::parse(format!("doc{i}.md"), "monitoring dashboards"))
            .collect();
        let tool = SearchTool::new(Arc::new(KeywordIndex::for_docs().fit(docs)));

        let result = tool
            .execute(serde_json::json!({"query": "dashboards"}))
            .await
            .unwrap();
        let results = result.as_array().unwrap();
        assert_eq!(results.len(), SEARCH_RESULTS);
        assert_eq!(results[0]["filename"], "doc0.md");
    }

    #[tokio::test]
    async fn search_requires_query() {
        let tool = SearchTool::new(Arc::new(KeywordIndex::for_docs()));
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn get_file_found_and_missing() {
        let tool = GetFileTool::new(files());
        let found = tool
            .execute(serde_json::json!({"filename": "intro.md"}))
            .await
            .unwrap();
        assert_eq!(found, "Welcome");

        let missing = tool
            .execute(serde_json::json!({"filename": "nope.md"}))
            .await
            .unwrap();
        assert_eq!(missing, "file nope.md does not exist");
    }

    #[test]
    fn schemas_name_required_args() {
        let tool = GetFileTool::new(files());
        assert_eq!(tool.to_definition().parameters["required"][0], "filename");
    }
}
