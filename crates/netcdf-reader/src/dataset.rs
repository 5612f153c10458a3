//! Backend-neutral view of a multidimensional dataset.
//!
//! Everything above this module (codec, resolver, extractors) works against
//! these traits, so the netCDF library and the in-memory backend are
//! interchangeable.

use std::path::Path;

use catalog_common::{CatalogResult, DataKind};

/// A named dimension and its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

impl Dimension {
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }
}

/// Raw attribute contents, one typed vector per supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrData {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Char(Vec<u8>),
    /// Attribute stored with a kind outside the closed set.
    Unsupported(String),
}

impl AttrData {
    pub fn len(&self) -> usize {
        match self {
            AttrData::Byte(v) => v.len(),
            AttrData::Short(v) => v.len(),
            AttrData::Int(v) => v.len(),
            AttrData::Int64(v) => v.len(),
            AttrData::Float(v) => v.len(),
            AttrData::Double(v) => v.len(),
            AttrData::Char(v) => v.len(),
            AttrData::Unsupported(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text(s: &str) -> Self {
        AttrData::Char(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub data: AttrData,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data: AttrData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Values read from a variable, in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArray {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Char(Vec<u8>),
}

impl NativeArray {
    pub fn kind(&self) -> DataKind {
        match self {
            NativeArray::Byte(_) => DataKind::Byte,
            NativeArray::Short(_) => DataKind::Short,
            NativeArray::Int(_) => DataKind::Int,
            NativeArray::Int64(_) => DataKind::Int64,
            NativeArray::Float(_) => DataKind::Float,
            NativeArray::Double(_) => DataKind::Double,
            NativeArray::Char(_) => DataKind::Char,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NativeArray::Byte(v) => v.len(),
            NativeArray::Short(v) => v.len(),
            NativeArray::Int(v) => v.len(),
            NativeArray::Int64(v) => v.len(),
            NativeArray::Float(v) => v.len(),
            NativeArray::Double(v) => v.len(),
            NativeArray::Char(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One variable of an open dataset.
pub trait Variable {
    fn name(&self) -> String;

    /// Element kind. Kinds outside the closed set fail with `TypeMismatch`.
    fn kind(&self) -> CatalogResult<DataKind>;

    fn dimensions(&self) -> CatalogResult<Vec<Dimension>>;

    fn attributes(&self) -> CatalogResult<Vec<Attribute>>;

    /// Read the hyperslab starting at `offsets` with extent `lengths`.
    fn read(&self, offsets: &[usize], lengths: &[usize]) -> CatalogResult<NativeArray>;

    /// Read every value of the variable.
    fn read_all(&self) -> CatalogResult<NativeArray> {
        let dims = self.dimensions()?;
        let offsets = vec![0; dims.len()];
        let lengths: Vec<usize> = dims.iter().map(|d| d.len).collect();
        self.read(&offsets, &lengths)
    }
}

/// An open dataset. Dropping it releases the underlying handle.
pub trait Dataset {
    fn attributes(&self) -> CatalogResult<Vec<Attribute>>;

    fn variables(&self) -> CatalogResult<Vec<Box<dyn Variable + '_>>>;

    fn variable(&self, name: &str) -> CatalogResult<Option<Box<dyn Variable + '_>>>;
}

/// Opens datasets by filesystem path.
pub trait DatasetOpener: Send + Sync {
    fn open(&self, path: &Path) -> CatalogResult<Box<dyn Dataset>>;
}
