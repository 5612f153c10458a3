//! Storage façade handlers that keep the catalog in step with uploads.

use async_trait::async_trait;
use tracing::info;

use catalog_common::CatalogResult;
use storage::{EventHandler, Storage, StorageEvent, StorageEventKind};

use crate::config::IndexMode;
use crate::sync::CatalogSynchronizer;

/// Indexes a file after it is saved.
pub struct IndexOnSave {
    sync: CatalogSynchronizer,
    mode: IndexMode,
}

impl IndexOnSave {
    pub fn new(sync: CatalogSynchronizer, mode: IndexMode) -> Self {
        Self { sync, mode }
    }
}

#[async_trait]
impl EventHandler for IndexOnSave {
    async fn handle(&self, event: &StorageEvent) -> CatalogResult<()> {
        match self.mode {
            IndexMode::Background => self.sync.submit_index(event.file.clone()).await,
            IndexMode::Inline => self.sync.index_now(&event.file).await.map(|_| ()),
        }
    }
}

/// Drops a file's catalog rows after it is deleted.
pub struct RemoveOnDelete {
    sync: CatalogSynchronizer,
    mode: IndexMode,
}

impl RemoveOnDelete {
    pub fn new(sync: CatalogSynchronizer, mode: IndexMode) -> Self {
        Self { sync, mode }
    }
}

#[async_trait]
impl EventHandler for RemoveOnDelete {
    async fn handle(&self, event: &StorageEvent) -> CatalogResult<()> {
        match self.mode {
            IndexMode::Background => self.sync.submit_remove(event.file.clone()).await,
            IndexMode::Inline => self.sync.remove_now(&event.file).await.map(|_| ()),
        }
    }
}

pub struct LogAccess;

#[async_trait]
impl EventHandler for LogAccess {
    async fn handle(&self, event: &StorageEvent) -> CatalogResult<()> {
        info!(path = %event.file.virtual_path, id = %event.file.id, "File read");
        Ok(())
    }
}

/// Register the catalog handlers on the façade.
pub fn register_catalog_hooks(storage: &mut Storage, sync: &CatalogSynchronizer, mode: IndexMode) {
    storage.on(StorageEventKind::Save, IndexOnSave::new(sync.clone(), mode));
    storage.on(StorageEventKind::Delete, RemoveOnDelete::new(sync.clone(), mode));
    storage.on(StorageEventKind::Read, LogAccess);
}
