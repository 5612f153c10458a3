//! In-memory dataset backend.
//!
//! Holds row-major arrays and slices them the same way the netcdf library
//! does, so extractors can be exercised without files on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use catalog_common::{CatalogError, CatalogResult, DataKind};

use crate::dataset::{AttrData, Attribute, Dataset, DatasetOpener, Dimension, NativeArray, Variable};

#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    attributes: Vec<Attribute>,
    variables: Vec<MemoryVariable>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: &str, data: AttrData) -> Self {
        self.attributes.push(Attribute::new(name, data));
        self
    }

    pub fn with_variable(mut self, variable: MemoryVariable) -> Self {
        self.variables.push(variable);
        self
    }
}

impl Dataset for MemoryDataset {
    fn attributes(&self) -> CatalogResult<Vec<Attribute>> {
        Ok(self.attributes.clone())
    }

    fn variables(&self) -> CatalogResult<Vec<Box<dyn Variable + '_>>> {
        Ok(self
            .variables
            .iter()
            .map(|v| Box::new(v.clone()) as Box<dyn Variable + '_>)
            .collect())
    }

    fn variable(&self, name: &str) -> CatalogResult<Option<Box<dyn Variable + '_>>> {
        Ok(self
            .variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| Box::new(v.clone()) as Box<dyn Variable + '_>))
    }
}

#[derive(Debug, Clone)]
enum Contents {
    Values(NativeArray),
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct MemoryVariable {
    name: String,
    dimensions: Vec<Dimension>,
    attributes: Vec<Attribute>,
    contents: Contents,
    broken_dimensions: bool,
}

impl MemoryVariable {
    /// A variable over the named dimensions. `values` is row-major.
    pub fn new(name: &str, dimensions: &[(&str, usize)], values: NativeArray) -> Self {
        Self {
            name: name.to_string(),
            dimensions: dimensions
                .iter()
                .map(|(n, len)| Dimension::new(*n, *len))
                .collect(),
            attributes: Vec::new(),
            contents: Contents::Values(values),
            broken_dimensions: false,
        }
    }

    /// A one-dimensional coordinate variable named after its own dimension.
    pub fn coordinate(name: &str, values: NativeArray) -> Self {
        let len = values.len();
        Self::new(name, &[(name, len)], values)
    }

    /// A variable whose kind lies outside the supported set.
    pub fn unsupported(name: &str, dimensions: &[(&str, usize)], kind: &str) -> Self {
        let mut var = Self::new(name, dimensions, NativeArray::Byte(Vec::new()));
        var.contents = Contents::Unsupported(kind.to_string());
        var
    }

    pub fn with_attribute(mut self, name: &str, data: AttrData) -> Self {
        self.attributes.push(Attribute::new(name, data));
        self
    }

    /// Make dimension enumeration fail, as a damaged file would.
    pub fn with_broken_dimensions(mut self) -> Self {
        self.broken_dimensions = true;
        self
    }
}

impl Variable for MemoryVariable {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> CatalogResult<DataKind> {
        match &self.contents {
            Contents::Values(values) => Ok(values.kind()),
            Contents::Unsupported(kind) => Err(CatalogError::TypeMismatch(kind.clone())),
        }
    }

    fn dimensions(&self) -> CatalogResult<Vec<Dimension>> {
        if self.broken_dimensions {
            return Err(CatalogError::Dataset(format!(
                "cannot enumerate dimensions of {}",
                self.name
            )));
        }
        Ok(self.dimensions.clone())
    }

    fn attributes(&self) -> CatalogResult<Vec<Attribute>> {
        Ok(self.attributes.clone())
    }

    fn read(&self, offsets: &[usize], lengths: &[usize]) -> CatalogResult<NativeArray> {
        let values = match &self.contents {
            Contents::Values(values) => values,
            Contents::Unsupported(kind) => return Err(CatalogError::TypeMismatch(kind.clone())),
        };

        let shape: Vec<usize> = self.dimensions.iter().map(|d| d.len).collect();
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(CatalogError::Dataset(format!(
                "{} holds {} values but its shape needs {}",
                self.name,
                values.len(),
                expected
            )));
        }
        check_extents(&self.name, &shape, offsets, lengths)?;

        Ok(match values {
            NativeArray::Byte(v) => NativeArray::Byte(gather(v, &shape, offsets, lengths)),
            NativeArray::Short(v) => NativeArray::Short(gather(v, &shape, offsets, lengths)),
            NativeArray::Int(v) => NativeArray::Int(gather(v, &shape, offsets, lengths)),
            NativeArray::Int64(v) => NativeArray::Int64(gather(v, &shape, offsets, lengths)),
            NativeArray::Float(v) => NativeArray::Float(gather(v, &shape, offsets, lengths)),
            NativeArray::Double(v) => NativeArray::Double(gather(v, &shape, offsets, lengths)),
            NativeArray::Char(v) => NativeArray::Char(gather(v, &shape, offsets, lengths)),
        })
    }
}

fn check_extents(
    name: &str,
    shape: &[usize],
    offsets: &[usize],
    lengths: &[usize],
) -> CatalogResult<()> {
    if offsets.len() != shape.len() || lengths.len() != shape.len() {
        return Err(CatalogError::Dataset(format!(
            "{} has {} dimensions, got {} offsets and {} lengths",
            name,
            shape.len(),
            offsets.len(),
            lengths.len()
        )));
    }

    for (dim, ((offset, len), size)) in offsets.iter().zip(lengths).zip(shape).enumerate() {
        if offset + len > *size {
            return Err(CatalogError::Dataset(format!(
                "{}: index exceeds dimension bound on axis {} ({} + {} > {})",
                name, dim, offset, len, size
            )));
        }
    }
    Ok(())
}

/// Copy the hyperslab out of a row-major buffer.
fn gather<T: Copy>(data: &[T], shape: &[usize], offsets: &[usize], lengths: &[usize]) -> Vec<T> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    let total: usize = lengths.iter().product();
    let mut out = Vec::with_capacity(total);
    let mut index = vec![0usize; lengths.len()];

    for _ in 0..total {
        let flat: usize = index
            .iter()
            .zip(offsets)
            .zip(&strides)
            .map(|((i, o), s)| (i + o) * s)
            .sum();
        out.push(data[flat]);

        for axis in (0..index.len()).rev() {
            index[axis] += 1;
            if index[axis] < lengths[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}

/// Serves registered in-memory datasets by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    datasets: Arc<RwLock<HashMap<PathBuf, MemoryDataset>>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, dataset: MemoryDataset) {
        if let Ok(mut datasets) = self.datasets.write() {
            datasets.insert(path.into(), dataset);
        }
    }

    pub fn remove(&self, path: &Path) {
        if let Ok(mut datasets) = self.datasets.write() {
            datasets.remove(path);
        }
    }
}

impl DatasetOpener for MemoryOpener {
    fn open(&self, path: &Path) -> CatalogResult<Box<dyn Dataset>> {
        let datasets = self
            .datasets
            .read()
            .map_err(|_| CatalogError::Internal("dataset registry poisoned".to_string()))?;

        datasets
            .get(path)
            .cloned()
            .map(|ds| Box::new(ds) as Box<dyn Dataset>)
            .ok_or_else(|| CatalogError::Dataset(format!("Failed to open {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> MemoryVariable {
        // 2 x 3 grid: [[0, 1, 2], [10, 11, 12]]
        MemoryVariable::new(
            "grid",
            &[("y", 2), ("x", 3)],
            NativeArray::Int(vec![0, 1, 2, 10, 11, 12]),
        )
    }

    #[test]
    fn test_read_full_extent() {
        let values = grid().read_all().unwrap();
        assert_eq!(values, NativeArray::Int(vec![0, 1, 2, 10, 11, 12]));
    }

    #[test]
    fn test_read_column() {
        let values = grid().read(&[0, 1], &[2, 1]).unwrap();
        assert_eq!(values, NativeArray::Int(vec![1, 11]));
    }

    #[test]
    fn test_read_inner_block() {
        let values = grid().read(&[1, 1], &[1, 2]).unwrap();
        assert_eq!(values, NativeArray::Int(vec![11, 12]));
    }

    #[test]
    fn test_read_past_bound_fails() {
        let err = grid().read(&[1, 2], &[1, 2]).unwrap_err();
        assert!(matches!(err, CatalogError::Dataset(_)));
    }

    #[test]
    fn test_zero_length_read_is_empty() {
        let values = grid().read(&[0, 0], &[0, 3]).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_broken_dimensions_fail() {
        let var = grid().with_broken_dimensions();
        assert!(var.dimensions().is_err());
    }

    #[test]
    fn test_opener_serves_registered_paths_only() {
        let opener = MemoryOpener::new();
        opener.insert("/data/a.nc", MemoryDataset::new());
        assert!(opener.open(Path::new("/data/a.nc")).is_ok());
        assert!(opener.open(Path::new("/data/b.nc")).is_err());

        opener.remove(Path::new("/data/a.nc"));
        assert!(opener.open(Path::new("/data/a.nc")).is_err());
    }
}
