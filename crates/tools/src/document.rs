//! Documentation files and the store that loads them from disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ToolsError;

/// One parsed documentation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Path relative to the docs root, with forward slashes
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Body without the front matter
    pub content: String,
}

impl Document {
    /// Parse a raw file, splitting off an optional `---` front matter block.
    ///
    /// Front matter that is not valid YAML is kept as part of the content.
    pub fn parse(filename: impl Into<String>, raw: &str) -> Self {
        let filename = filename.into();

        if let Some((header, body)) = split_front_matter(raw) {
            match serde_yaml::from_str::<FrontMatter>(header) {
                Ok(front) => {
                    return Self {
                        filename,
                        title: front.title,
                        description: front.description,
                        content: body.to_string(),
                    };
                }
                Err(e) => debug!(file = %filename, error = %e, "Ignoring unparseable front matter"),
            }
        }

        Self {
            filename,
            title: None,
            description: None,
            content: raw.to_string(),
        }
    }

    /// The value of a named field, for indexing.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "filename" => Some(&self.filename),
            "title" => self.title.as_deref(),
            "description" => self.description.as_deref(),
            "content" => Some(&self.content),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((header, body.trim_start_matches(['\n', '\r'])));
        }
        offset += line.len();
    }
    None
}

/// All documents of a docs directory, addressable by filename.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
}

impl DocumentStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Recursively load every file under `root` whose extension is in
    /// `extensions` (without the dot). Files are sorted by filename.
    pub fn load_dir(root: &Path, extensions: &[String]) -> Result<Self, ToolsError> {
        let mut paths = Vec::new();
        collect_files(root, extensions, &mut paths)?;
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|source| ToolsError::Io {
                path: path.clone(),
                source,
            })?;
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let filename = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            documents.push(Document::parse(filename, &raw));
        }

        debug!(root = %root.display(), count = documents.len(), "Loaded documents");
        Ok(Self { documents })
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Filename to content map, used by `get_file`.
    pub fn file_index(&self) -> HashMap<String, String> {
        self.documents
            .iter()
            .map(|d| (d.filename.clone(), d.content.clone()))
            .collect()
    }
}

fn collect_files(dir: &Path, extensions: &[String], out: &mut Vec<PathBuf>) -> Result<(), ToolsError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ToolsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extensions, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_front_matter() {
        let doc = Document::parse(
            "metrics/overview.mdx",
            "---\ntitle: Metrics overview\ndescription: \"All built-in metrics\"\nicon: chart\n---\n\n# Metrics\nBody text\n",
        );
        assert_eq!(doc.title.as_deref(), Some("Metrics overview"));
        assert_eq!(doc.description.as_deref(), Some("All built-in metrics"));
        assert_eq!(doc.content, "# Metrics\nBody text\n");
    }

    #[test]
    fn no_front_matter_keeps_everything() {
        let doc = Document::parse("a.md", "# Title\n---\nmore");
        assert_eq!(doc.title, None);
        assert_eq!(doc.content, "# Title\n---\nmore");

        // Unterminated block is plain content
        let doc = Document::parse("b.md", "---\ntitle: x\nno end");
        assert_eq!(doc.title, None);
        assert!(doc.content.starts_with("---"));
    }

    #[test]
    fn load_dir_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("guides")).unwrap();
        std::fs::write(dir.path().join("intro.md"), "---\ntitle: Intro\n---\nhello").unwrap();
        std::fs::write(dir.path().join("guides/setup.mdx"), "setup steps").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();

        let store = DocumentStore::load_dir(dir.path(), &["md".into(), "mdx".into()]).unwrap();
        let names: Vec<&str> = store.documents().iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["guides/setup.mdx", "intro.md"]);

        let files = store.file_index();
        assert_eq!(files["intro.md"], "hello");
    }

    #[test]
    fn load_dir_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = DocumentStore::load_dir(&dir.path().join("nope"), &["md".into()]).unwrap_err();
        assert!(matches!(err, ToolsError::Io { .. }));
    }
}
