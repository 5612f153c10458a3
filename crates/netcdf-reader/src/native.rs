//! Dataset backend using the native netcdf library.
//!
//! The netcdf library wraps libnetcdf/HDF5, so every call here is blocking.
//! Async callers should run extraction on a blocking thread.

use std::path::Path;
use std::sync::Once;

use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::AttributeValue;

use catalog_common::{CatalogError, CatalogResult, DataKind};

use crate::dataset::{AttrData, Attribute, Dataset, DatasetOpener, Dimension, NativeArray, Variable};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g. a failed open on a file that
/// is still being written). This disables that output by calling
/// H5Eset_auto2 with null handlers. Safe to call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Opens files from disk with the netcdf library.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfOpener;

impl DatasetOpener for NetcdfOpener {
    fn open(&self, path: &Path) -> CatalogResult<Box<dyn Dataset>> {
        silence_hdf5_errors();

        let file = netcdf::open(path).map_err(|e| {
            CatalogError::Dataset(format!("Failed to open {}: {}", path.display(), e))
        })?;

        Ok(Box::new(NetcdfDataset { file }))
    }
}

struct NetcdfDataset {
    file: netcdf::File,
}

impl Dataset for NetcdfDataset {
    fn attributes(&self) -> CatalogResult<Vec<Attribute>> {
        self.file.attributes().map(|attr| convert_attribute(&attr)).collect()
    }

    fn variables(&self) -> CatalogResult<Vec<Box<dyn Variable + '_>>> {
        Ok(self
            .file
            .variables()
            .map(|var| Box::new(NetcdfVariable { var }) as Box<dyn Variable + '_>)
            .collect())
    }

    fn variable(&self, name: &str) -> CatalogResult<Option<Box<dyn Variable + '_>>> {
        Ok(self
            .file
            .variable(name)
            .map(|var| Box::new(NetcdfVariable { var }) as Box<dyn Variable + '_>))
    }
}

struct NetcdfVariable<'f> {
    var: netcdf::Variable<'f>,
}

impl Variable for NetcdfVariable<'_> {
    fn name(&self) -> String {
        self.var.name()
    }

    fn kind(&self) -> CatalogResult<DataKind> {
        match self.var.vartype() {
            NcVariableType::Int(IntType::I8) => Ok(DataKind::Byte),
            NcVariableType::Int(IntType::I16) => Ok(DataKind::Short),
            NcVariableType::Int(IntType::I32) => Ok(DataKind::Int),
            NcVariableType::Int(IntType::I64) => Ok(DataKind::Int64),
            NcVariableType::Float(FloatType::F32) => Ok(DataKind::Float),
            NcVariableType::Float(FloatType::F64) => Ok(DataKind::Double),
            NcVariableType::Char => Ok(DataKind::Char),
            other => Err(CatalogError::TypeMismatch(format!("{:?}", other))),
        }
    }

    fn dimensions(&self) -> CatalogResult<Vec<Dimension>> {
        Ok(self
            .var
            .dimensions()
            .iter()
            .map(|d| Dimension::new(d.name(), d.len()))
            .collect())
    }

    fn attributes(&self) -> CatalogResult<Vec<Attribute>> {
        self.var.attributes().map(|attr| convert_attribute(&attr)).collect()
    }

    fn read(&self, offsets: &[usize], lengths: &[usize]) -> CatalogResult<NativeArray> {
        let extents = (offsets, lengths);
        let failed = |e: netcdf::Error| {
            CatalogError::Dataset(format!("Failed to read {}: {}", self.var.name(), e))
        };

        Ok(match self.kind()? {
            DataKind::Byte => NativeArray::Byte(self.var.get_values(extents).map_err(failed)?),
            DataKind::Short => NativeArray::Short(self.var.get_values(extents).map_err(failed)?),
            DataKind::Int => NativeArray::Int(self.var.get_values(extents).map_err(failed)?),
            DataKind::Int64 => NativeArray::Int64(self.var.get_values(extents).map_err(failed)?),
            DataKind::Float => NativeArray::Float(self.var.get_values(extents).map_err(failed)?),
            DataKind::Double => NativeArray::Double(self.var.get_values(extents).map_err(failed)?),
            // NC_CHAR has no numeric conversion; read the bytes as stored.
            DataKind::Char => NativeArray::Char(self.var.get_raw_values(extents).map_err(failed)?),
        })
    }
}

fn convert_attribute(attr: &netcdf::Attribute<'_>) -> CatalogResult<Attribute> {
    let value = attr.value().map_err(|e| {
        CatalogError::Dataset(format!("Failed to read attribute {}: {}", attr.name(), e))
    })?;

    let data = match value {
        AttributeValue::Schar(v) => AttrData::Byte(vec![v]),
        AttributeValue::Schars(v) => AttrData::Byte(v),
        AttributeValue::Short(v) => AttrData::Short(vec![v]),
        AttributeValue::Shorts(v) => AttrData::Short(v),
        AttributeValue::Int(v) => AttrData::Int(vec![v]),
        AttributeValue::Ints(v) => AttrData::Int(v),
        AttributeValue::Longlong(v) => AttrData::Int64(vec![v]),
        AttributeValue::Longlongs(v) => AttrData::Int64(v),
        AttributeValue::Float(v) => AttrData::Float(vec![v]),
        AttributeValue::Floats(v) => AttrData::Float(v),
        AttributeValue::Double(v) => AttrData::Double(vec![v]),
        AttributeValue::Doubles(v) => AttrData::Double(v),
        AttributeValue::Str(v) => AttrData::Char(v.into_bytes()),
        AttributeValue::Uchar(_) | AttributeValue::Uchars(_) => AttrData::Unsupported("UBYTE".into()),
        AttributeValue::Ushort(_) | AttributeValue::Ushorts(_) => {
            AttrData::Unsupported("USHORT".into())
        }
        AttributeValue::Uint(_) | AttributeValue::Uints(_) => AttrData::Unsupported("UINT".into()),
        AttributeValue::Ulonglong(_) | AttributeValue::Ulonglongs(_) => {
            AttrData::Unsupported("UINT64".into())
        }
        AttributeValue::Strs(_) => AttrData::Unsupported("STRING".into()),
    };

    Ok(Attribute::new(attr.name(), data))
}
