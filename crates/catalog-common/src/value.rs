//! Data kinds and decoded attribute values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// The closed set of primitive element types a dataset may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataKind {
    Byte,
    Short,
    Int,
    Int64,
    Float,
    Double,
    Char,
}

impl DataKind {
    pub const ALL: [DataKind; 7] = [
        DataKind::Byte,
        DataKind::Short,
        DataKind::Int,
        DataKind::Int64,
        DataKind::Float,
        DataKind::Double,
        DataKind::Char,
    ];

    /// Wire name used in query responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Byte => "BYTE",
            Self::Short => "SHORT",
            Self::Int => "INT",
            Self::Int64 => "INT64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Char => "CHAR",
        }
    }

    /// Parse a wire name. Anything outside the closed set is a `TypeMismatch`.
    pub fn from_name(name: &str) -> CatalogResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| CatalogError::TypeMismatch(name.to_string()))
    }

    /// Width of one element in bytes.
    pub fn element_size(&self) -> usize {
        match self {
            Self::Byte | Self::Char => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Int64 | Self::Double => 8,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single decoded attribute or metadata value.
///
/// Serializes untagged, so a map of values renders as plain JSON numbers
/// and strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Tag persisted next to the value so it can be rebuilt from storage.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Value::Byte(_) => "BYTE",
            Value::Short(_) => "SHORT",
            Value::Int(_) => "INT",
            Value::Int64(_) => "INT64",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
        }
    }

    /// Storage representation: numbers as their shortest round-trip text.
    pub fn to_stored(&self) -> Vec<u8> {
        match self {
            Value::Text(s) => s.as_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
            other => other.to_string().into_bytes(),
        }
    }

    /// Rebuild a value from its tag and storage representation.
    pub fn from_stored(tag: &str, raw: &[u8]) -> CatalogResult<Self> {
        if tag == "BYTES" {
            return Ok(Value::Bytes(raw.to_vec()));
        }

        let text = std::str::from_utf8(raw)
            .map_err(|e| CatalogError::Decode(format!("{} value is not UTF-8: {}", tag, e)))?;
        let bad = |e: String| CatalogError::Decode(format!("{} value '{}': {}", tag, text, e));

        if tag == "TEXT" {
            return Ok(Value::Text(text.to_string()));
        }

        let kind = DataKind::from_name(tag)
            .map_err(|_| CatalogError::Decode(format!("unknown value tag {}", tag)))?;
        Ok(match kind {
            DataKind::Byte => Value::Byte(text.parse::<i8>().map_err(|e| bad(e.to_string()))?),
            DataKind::Short => Value::Short(text.parse::<i16>().map_err(|e| bad(e.to_string()))?),
            DataKind::Int => Value::Int(text.parse::<i32>().map_err(|e| bad(e.to_string()))?),
            DataKind::Int64 => Value::Int64(text.parse::<i64>().map_err(|e| bad(e.to_string()))?),
            DataKind::Float => Value::Float(text.parse::<f32>().map_err(|e| bad(e.to_string()))?),
            DataKind::Double => Value::Double(text.parse::<f64>().map_err(|e| bad(e.to_string()))?),
            // Character data is always persisted as TEXT.
            DataKind::Char => return Err(bad("CHAR is not a stored tag".to_string())),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_case_insensitive() {
        assert_eq!(DataKind::from_name("float").unwrap(), DataKind::Float);
        assert_eq!(DataKind::from_name("INT64").unwrap(), DataKind::Int64);
    }

    #[test]
    fn test_unknown_kind_is_type_mismatch() {
        let err = DataKind::from_name("UINT").unwrap_err();
        assert!(matches!(err, CatalogError::TypeMismatch(ref k) if k == "UINT"));
    }

    #[test]
    fn test_stored_float_keeps_exact_value() {
        let value = Value::Float(0.1);
        let rebuilt = Value::from_stored(value.kind_tag(), &value.to_stored()).unwrap();
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn test_stored_json_blob_is_opaque() {
        let value = Value::Bytes(br#"{"units":"K"}"#.to_vec());
        assert_eq!(value.to_string(), r#"{"units":"K"}"#);
        let rebuilt = Value::from_stored("BYTES", &value.to_stored()).unwrap();
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn test_every_numeric_tag_rebuilds() {
        let values = [
            Value::Byte(i8::MIN),
            Value::Short(i16::MAX),
            Value::Int(-7),
            Value::Int64(i64::MIN),
            Value::Float(-2.5e-7),
            Value::Double(f64::MAX),
            Value::Text("degrees_north".into()),
        ];
        for value in values {
            let rebuilt = Value::from_stored(value.kind_tag(), &value.to_stored()).unwrap();
            assert_eq!(rebuilt, value);
        }
    }

    #[test]
    fn test_unknown_stored_tag_is_decode_error() {
        for tag in ["UINT", "CHAR"] {
            let err = Value::from_stored(tag, b"1").unwrap_err();
            assert!(matches!(err, CatalogError::Decode(_)), "{}", tag);
        }
    }

    #[test]
    fn test_corrupt_stored_number_is_decode_error() {
        let err = Value::from_stored("INT", b"twelve").unwrap_err();
        assert!(matches!(err, CatalogError::Decode(_)));
    }

    #[test]
    fn test_values_serialize_untagged() {
        let json = serde_json::to_string(&vec![Value::Short(3), Value::Text("K".into())]).unwrap();
        assert_eq!(json, r#"[3,"K"]"#);
    }
}
