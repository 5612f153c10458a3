//! File references shared between storage, ingestion and the query path.

use std::path::PathBuf;

use serde::Serialize;

/// A stored file as seen by callers (`virtual_path`) and by the filesystem
/// (`real_path`). The real path is always derived, never supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileRef {
    pub virtual_path: String,
    pub real_path: PathBuf,
    /// Stable hex digest of the virtual path.
    pub id: String,
    /// Catalog key: the virtual path under its store's namespace, if any.
    pub catalog_key: String,
}

impl FileRef {
    /// Key used for catalog rows and per-path ordering.
    pub fn catalog_path(&self) -> &str {
        &self.catalog_key
    }

    /// Prefix shared by the keys of every file below this path.
    pub fn subtree_prefix(&self) -> String {
        format!("{}/", self.catalog_key)
    }
}
