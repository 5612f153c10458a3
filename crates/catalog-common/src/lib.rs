//! Common types and utilities shared across the netCDF catalog crates.

pub mod catalog;
pub mod error;
pub mod event;
pub mod file;
pub mod query;
pub mod value;

pub use catalog::{CatalogRecord, EntryType, MetadataEntry};
pub use error::{CatalogError, CatalogResult};
pub use event::{SyncOp, WatchOp, WatcherEvent, RENAME_SEPARATOR};
pub use file::FileRef;
pub use query::{Coordinate, QueryRequest, SliceResult};
pub use value::{DataKind, Value};
