//! Storage façade with ordered event hooks.
//!
//! Every successful `save`, `delete` or `read` triggers the handlers
//! registered for that event, in registration order. The first handler that
//! fails stops the chain and its error is returned. A failed file operation
//! triggers nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use catalog_common::{CatalogResult, FileRef};

use crate::files::FileService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageEventKind {
    Save,
    Delete,
    Read,
}

impl fmt::Display for StorageEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageEventKind::Save => "SAVE",
            StorageEventKind::Delete => "DELETE",
            StorageEventKind::Read => "READ",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub kind: StorageEventKind,
    pub file: FileRef,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &StorageEvent) -> CatalogResult<()>;
}

/// Handler built from a plain closure. See [`handler_fn`].
pub struct FnHandler<F>(F);

/// Wrap a synchronous closure as an [`EventHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&StorageEvent) -> CatalogResult<()> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&StorageEvent) -> CatalogResult<()> + Send + Sync,
{
    async fn handle(&self, event: &StorageEvent) -> CatalogResult<()> {
        (self.0)(event)
    }
}

pub struct Storage {
    files: FileService,
    handlers: HashMap<StorageEventKind, Vec<Arc<dyn EventHandler>>>,
}

impl Storage {
    pub fn new(files: FileService) -> Self {
        Self {
            files,
            handlers: HashMap::new(),
        }
    }

    pub fn files(&self) -> &FileService {
        &self.files
    }

    pub fn resolve(&self, path: &str) -> CatalogResult<FileRef> {
        self.files.resolve(path)
    }

    /// Append a handler for `kind`. Handlers run in the order registered.
    pub fn on(&mut self, kind: StorageEventKind, handler: impl EventHandler + 'static) {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    pub fn handler_count(&self, kind: StorageEventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Run the handlers for the event, stopping at the first failure.
    pub async fn trigger(&self, event: &StorageEvent) -> CatalogResult<()> {
        let Some(handlers) = self.handlers.get(&event.kind) else {
            return Ok(());
        };

        for (position, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.handle(event).await {
                warn!(
                    event = %event.kind,
                    path = %event.file.virtual_path,
                    handler = position,
                    error = %e,
                    "Event handler failed"
                );
                return Err(e);
            }
        }

        debug!(
            event = %event.kind,
            path = %event.file.virtual_path,
            handlers = handlers.len(),
            "Event handlers completed"
        );
        Ok(())
    }

    pub async fn save<R>(&self, path: &str, reader: &mut R) -> CatalogResult<FileRef>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let file = self.files.resolve(path)?;
        self.files.save(&file, reader).await?;
        self.apply(StorageEventKind::Save, file).await
    }

    pub async fn delete(&self, path: &str) -> CatalogResult<FileRef> {
        let file = self.files.resolve(path)?;
        self.files.delete(&file).await?;
        self.apply(StorageEventKind::Delete, file).await
    }

    pub async fn read<W>(&self, path: &str, writer: &mut W) -> CatalogResult<FileRef>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let file = self.files.resolve(path)?;
        self.files.read(&file, writer).await?;
        self.apply(StorageEventKind::Read, file).await
    }

    async fn apply(&self, kind: StorageEventKind, file: FileRef) -> CatalogResult<FileRef> {
        let event = StorageEvent { kind, file };
        self.trigger(&event).await?;
        Ok(event.file)
    }
}
