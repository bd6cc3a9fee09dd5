//! Search index abstraction and a small in-memory keyword index.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::document::Document;

/// Anything that can answer a documentation query.
///
/// The agent only sees the ranked documents; how they are ranked is the
/// implementation's business.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: &str, num_results: usize) -> Vec<Document>;
}

/// Term-overlap index over a fixed set of text fields, with exact-match
/// filtering on keyword fields.
///
/// Each document scores the number of query terms that occur in its text
/// fields, weighted by field. Ties keep document order.
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    text_fields: Vec<String>,
    keyword_fields: Vec<String>,
    documents: Vec<Document>,
    /// Per document, per text field: the set of terms
    terms: Vec<Vec<HashSet<String>>>,
}

impl KeywordIndex {
    pub fn new(text_fields: &[&str], keyword_fields: &[&str]) -> Self {
        Self {
            text_fields: text_fields.iter().map(|s| s.to_string()).collect(),
            keyword_fields: keyword_fields.iter().map(|s| s.to_string()).collect(),
            documents: Vec::new(),
            terms: Vec::new(),
        }
    }

    /// The layout used for documentation: title, description and content
    /// are searchable, filename is filterable.
    pub fn for_docs() -> Self {
        Self::new(&["title", "description", "content"], &["filename"])
    }

    /// Index the given documents, replacing any previous ones.
    pub fn fit(mut self, documents: Vec<Document>) -> Self {
        self.terms = documents
            .iter()
            .map(|doc| {
                self.text_fields
                    .iter()
                    .map(|field| tokenize(doc.field(field).unwrap_or("")).collect())
                    .collect()
            })
            .collect();
        self.documents = documents;
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Search with exact-match filters on keyword fields. Filters on
    /// fields that were not declared as keyword fields are ignored.
    pub fn search_filtered(
        &self,
        query: &str,
        filters: &HashMap<String, String>,
        num_results: usize,
    ) -> Vec<Document> {
        let query_terms: Vec<String> = tokenize(query).collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| self.matches_filters(doc, filters))
            .filter_map(|(i, _)| {
                let score: usize = self.terms[i]
                    .iter()
                    .enumerate()
                    .map(|(field_pos, field_terms)| {
                        // Earlier fields weigh more: title > description > content
                        let weight = self.text_fields.len() - field_pos;
                        query_terms.iter().filter(|t| field_terms.contains(*t)).count() * weight
                    })
                    .sum();
                (score > 0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(num_results)
            .map(|(i, _)| self.documents[i].clone())
            .collect()
    }

    fn matches_filters(&self, doc: &Document, filters: &HashMap<String, String>) -> bool {
        filters.iter().all(|(field, value)| {
            !self.keyword_fields.contains(field) || doc.field(field) == Some(value.as_str())
        })
    }
}

#[async_trait]
impl SearchIndex for KeywordIndex {
    async fn search(&self, query: &str, num_results: usize) -> Vec<Document> {
        self.search_filtered(query, &HashMap::new(), num_results)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Document> {
        vec![
            Document::parse("quickstart.md", "---\ntitle: Quickstart\n---\nInstall the library and run a report."),
            Document::parse("metrics/drift.md", "---\ntitle: Data drift\ndescription: Detect drift\n---\nDrift detection compares distributions."),
            Document::parse("metrics/quality.md", "Data quality checks, including drift summaries."),
        ]
    }

    #[tokio::test]
    async fn title_matches_rank_first() {
        let index = KeywordIndex::for_docs().fit(docs());
        let results = index.search("data drift", 5).await;
        let names: Vec<&str> = results.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["metrics/drift.md", "metrics/quality.md"]);
    }

    #[tokio::test]
    async fn respects_num_results_and_empty_queries() {
        let index = KeywordIndex::for_docs().fit(docs());
        assert_eq!(index.search("drift", 1).await.len(), 1);
        assert!(index.search("", 5).await.is_empty());
        assert!(index.search("kubernetes", 5).await.is_empty());
    }

    #[test]
    fn keyword_filters() {
        let index = KeywordIndex::for_docs().fit(docs());
        let mut filters = HashMap::new();
        filters.insert("filename".to_string(), "metrics/quality.md".to_string());
        let results = index.search_filtered("drift", &filters, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename, "metrics/quality.md");
    }
}
