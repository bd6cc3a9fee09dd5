//! On-disk cache of loaded documents.
//!
//! The first call builds the documents and writes them as JSON; later calls
//! read the file back. Writes go to a unique temporary file that is renamed
//! into place, so concurrent first builds never leave a torn file: the last
//! rename wins.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ToolsError;
use crate::document::Document;

const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    documents: Vec<Document>,
}

/// Load documents from `cache_path`, or build them with `build` and cache
/// the result. An unreadable or outdated cache is rebuilt.
pub fn cached_index<F>(cache_path: &Path, build: F) -> Result<Vec<Document>, ToolsError>
where
    F: FnOnce() -> Result<Vec<Document>, ToolsError>,
{
    if let Some(documents) = read_cache(cache_path) {
        info!(path = %cache_path.display(), count = documents.len(), "Loaded documents from cache");
        return Ok(documents);
    }

    info!(path = %cache_path.display(), "Cache not found, building documents");
    let documents = build()?;
    write_cache(cache_path, &documents)?;
    Ok(documents)
}

fn read_cache(path: &Path) -> Option<Vec<Document>> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<CacheFile>(&raw) {
        Ok(cache) if cache.version == CACHE_VERSION => Some(cache.documents),
        Ok(cache) => {
            warn!(path = %path.display(), version = cache.version, "Ignoring cache with unknown version");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt cache");
            None
        }
    }
}

fn write_cache(path: &Path, documents: &[Document]) -> Result<(), ToolsError> {
    let io_err = |source| ToolsError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let body = serde_json::to_string(&CacheFile {
        version: CACHE_VERSION,
        documents: documents.to_vec(),
    })?;

    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp, body).map_err(io_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    Ok(())
}
