//! Persistence for the netCDF catalog.
//!
//! - [`catalog`]: the metadata table behind a [`CatalogStore`] trait, backed by SQLite
//! - [`memory`]: an in-process [`CatalogStore`]
//! - [`files`]: virtual path to on-disk file mapping
//! - [`hooks`]: the [`Storage`] façade that fires handlers after file operations

pub mod catalog;
pub mod files;
pub mod hooks;
pub mod memory;

pub use catalog::{CatalogStore, SqliteCatalog};
pub use files::{path_id, FileLayout, FileService};
pub use hooks::{handler_fn, EventHandler, FnHandler, Storage, StorageEvent, StorageEventKind};
pub use memory::MemoryCatalog;
