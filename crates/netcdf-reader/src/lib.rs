//! Read access to netCDF datasets for the catalog.
//!
//! The crate is split along one seam: [`dataset`] defines the traits every
//! backend implements ([`native`] over the netcdf library, [`memory`] for
//! in-process data), and the remaining modules only talk to those traits.
//!
//! - [`codec`]: little-endian encoding and scalar attribute decoding
//! - [`resolver`]: coordinate value to index lookup
//! - [`slice`]: hyperslab computation and slice extraction
//! - [`metadata`]: flattening a dataset into catalog entries
//!
//! All calls block; async callers should use a blocking thread.

pub mod codec;
pub mod dataset;
pub mod memory;
pub mod metadata;
pub mod native;
pub mod resolver;
pub mod slice;

pub use dataset::{AttrData, Attribute, Dataset, DatasetOpener, Dimension, NativeArray, Variable};
pub use memory::{MemoryDataset, MemoryOpener, MemoryVariable};
pub use metadata::extract_metadata;
pub use native::{silence_hdf5_errors, NetcdfOpener};
pub use slice::{extract, hyperslab, lookup, Hyperslab};
