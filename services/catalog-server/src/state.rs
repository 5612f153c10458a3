//! Shared state behind the HTTP handlers.

use std::sync::Arc;

use catalog_common::{CatalogError, CatalogRecord, CatalogResult, FileRef};
use ingestion::{register_catalog_hooks, CatalogSynchronizer, IndexMode, WorkerPool};
use netcdf_reader::DatasetOpener;
use storage::{CatalogStore, FileService, Storage};

/// Catalog key prefix for uploaded files.
pub const UPLOAD_NAMESPACE: &str = "uploads";
/// Catalog key prefix for files in the watched tree.
pub const WATCH_NAMESPACE: &str = "watch";

pub struct AppState {
    /// Upload store with the catalog hooks attached.
    pub storage: Storage,
    /// Mirrored view of the watched tree, if one is configured.
    pub watch_files: Option<FileService>,
    pub store: Arc<dyn CatalogStore>,
    pub opener: Arc<dyn DatasetOpener>,
    pub sync: CatalogSynchronizer,
    /// Attempts per query before an internal error is returned.
    pub query_retries: u32,
}

impl AppState {
    pub fn new(
        uploads: FileService,
        watch_files: Option<FileService>,
        store: Arc<dyn CatalogStore>,
        opener: Arc<dyn DatasetOpener>,
        pool: Arc<WorkerPool>,
        index_mode: IndexMode,
        query_retries: u32,
    ) -> Self {
        let uploads = uploads.with_namespace(UPLOAD_NAMESPACE);
        let watch_files = watch_files.map(|files| files.with_namespace(WATCH_NAMESPACE));

        let mut sync = CatalogSynchronizer::new(opener.clone(), store.clone(), pool);
        if let Some(files) = &watch_files {
            sync = sync.with_watch_root(files.clone());
        }

        let mut storage = Storage::new(uploads);
        register_catalog_hooks(&mut storage, &sync, index_mode);

        Self {
            storage,
            watch_files,
            store,
            opener,
            sync,
            query_retries: query_retries.max(1),
        }
    }

    /// Find the file a query names.
    ///
    /// A catalog key (`uploads/...`, `watch/...`) is tried first, then the
    /// bare virtual path in the uploads and then the watched tree.
    pub async fn locate(&self, path: &str) -> CatalogResult<FileRef> {
        let uploads = self.storage.files();
        let mut candidates: Vec<(&FileService, &str)> = Vec::with_capacity(4);
        if let Some(inner) = uploads.strip_namespace(path) {
            candidates.push((uploads, inner));
        }
        if let Some(files) = &self.watch_files {
            if let Some(inner) = files.strip_namespace(path) {
                candidates.push((files, inner));
            }
        }
        candidates.push((uploads, path));
        if let Some(files) = &self.watch_files {
            candidates.push((files, path));
        }

        for (files, virtual_path) in candidates {
            let Ok(file) = files.resolve(virtual_path) else {
                continue;
            };
            if files.exists(&file).await {
                return Ok(file);
            }
        }

        // Surfaces InvalidPath for a malformed name.
        let upload = uploads.resolve(path)?;
        Err(CatalogError::FileNotFound(upload.virtual_path))
    }

    /// The whole catalog with values coerced to strings.
    pub async fn catalog_records(&self) -> CatalogResult<Vec<CatalogRecord>> {
        let entries = self.store.query_all_distinct().await?;
        Ok(entries.iter().map(CatalogRecord::from).collect())
    }
}
