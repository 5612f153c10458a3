//! Catalog synchronization for trees of netCDF files.
//!
//! # Architecture
//!
//! Changes arrive from two places: the [`watcher`] (files appearing,
//! disappearing or being renamed under a watched directory) and the
//! storage façade [`hooks`] (uploads and deletes through the service).
//! Both end up in the [`CatalogSynchronizer`], which turns them into jobs
//! on the [`WorkerPool`]. Jobs touching the same path are kept in order by
//! the [`PathSequencer`]; jobs on different paths run concurrently.
//!
//! Extraction is blocking work and runs on tokio's blocking pool.

pub mod config;
pub mod error;
pub mod hooks;
pub mod sequencer;
pub mod sync;
pub mod watcher;
pub mod worker_pool;

// Re-exports
pub use config::{IndexMode, SyncConfig};
pub use error::{ConfigError, Result};
pub use hooks::{register_catalog_hooks, IndexOnSave, LogAccess, RemoveOnDelete};
pub use sequencer::{PathSequencer, Ticket, Turn};
pub use sync::CatalogSynchronizer;
pub use watcher::{expand_directories, rewatch_events, spawn_sync_loop, translate, DirectoryWatcher};
pub use worker_pool::{spawn_error_supervisor, Job, WorkerPool};
