//! Little-endian encoding of numeric arrays and scalar attribute decoding.

use catalog_common::{CatalogError, CatalogResult, DataKind, SliceResult, Value};

use crate::dataset::{AttrData, Attribute, NativeArray};

/// Encode an array read as `kind` into its little-endian byte form.
///
/// Fails with `TypeMismatch` if the array does not hold `kind` values.
pub fn encode(kind: DataKind, array: &NativeArray) -> CatalogResult<SliceResult> {
    if array.kind() != kind {
        return Err(CatalogError::TypeMismatch(format!(
            "{} declared but {} read",
            kind,
            array.kind()
        )));
    }

    let value = match array {
        NativeArray::Byte(v) => v.iter().map(|x| *x as u8).collect(),
        NativeArray::Char(v) => v.clone(),
        NativeArray::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        NativeArray::Int(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        NativeArray::Int64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        NativeArray::Float(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        NativeArray::Double(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
    };

    Ok(SliceResult { kind, value })
}

macro_rules! decode_le {
    ($bytes:expr, $t:ty) => {{
        const N: usize = std::mem::size_of::<$t>();
        $bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut buf = [0u8; N];
                buf.copy_from_slice(chunk);
                <$t>::from_le_bytes(buf)
            })
            .collect::<Vec<$t>>()
    }};
}

/// Inverse of [`encode`].
pub fn decode(kind: DataKind, bytes: &[u8]) -> CatalogResult<NativeArray> {
    if bytes.len() % kind.element_size() != 0 {
        return Err(CatalogError::Decode(format!(
            "{} bytes is not a whole number of {} values",
            bytes.len(),
            kind
        )));
    }

    Ok(match kind {
        DataKind::Byte => NativeArray::Byte(bytes.iter().map(|b| *b as i8).collect()),
        DataKind::Char => NativeArray::Char(bytes.to_vec()),
        DataKind::Short => NativeArray::Short(decode_le!(bytes, i16)),
        DataKind::Int => NativeArray::Int(decode_le!(bytes, i32)),
        DataKind::Int64 => NativeArray::Int64(decode_le!(bytes, i64)),
        DataKind::Float => NativeArray::Float(decode_le!(bytes, f32)),
        DataKind::Double => NativeArray::Double(decode_le!(bytes, f64)),
    })
}

/// Read the first element of an attribute as a scalar value.
///
/// Returns `Ok(None)` for empty attributes and for NaN doubles. Attributes
/// stored with an unsupported kind fail with `TypeMismatch`.
pub fn read_scalar_attribute(attr: &Attribute) -> CatalogResult<Option<Value>> {
    let value = match &attr.data {
        AttrData::Unsupported(kind) => {
            return Err(CatalogError::TypeMismatch(format!(
                "{} (attribute {})",
                kind, attr.name
            )))
        }
        AttrData::Char(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim_end_matches('\0');
            (!bytes.is_empty()).then(|| Value::Text(text.to_string()))
        }
        AttrData::Byte(v) => v.first().map(|x| Value::Byte(*x)),
        AttrData::Short(v) => v.first().map(|x| Value::Short(*x)),
        AttrData::Int(v) => v.first().map(|x| Value::Int(*x)),
        AttrData::Int64(v) => v.first().map(|x| Value::Int64(*x)),
        AttrData::Float(v) => v.first().map(|x| Value::Float(*x)),
        AttrData::Double(v) => v.first().filter(|x| !x.is_nan()).map(|x| Value::Double(*x)),
    };
    Ok(value)
}
