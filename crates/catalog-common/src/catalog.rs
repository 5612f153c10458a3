//! Catalog rows produced by metadata extraction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Kind of fact a catalog row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryType {
    /// Dataset-level attribute.
    #[serde(rename = "A")]
    GlobalAttribute,
    /// A dimension of some variable, with its length.
    #[serde(rename = "D")]
    Dimension,
    /// A variable, with its space-joined dimension names.
    #[serde(rename = "V")]
    Variable,
    /// A variable's attribute map as a JSON blob.
    #[serde(rename = "VA")]
    VariableAttributes,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalAttribute => "A",
            Self::Dimension => "D",
            Self::Variable => "V",
            Self::VariableAttributes => "VA",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(Self::GlobalAttribute),
            "D" => Some(Self::Dimension),
            "V" => Some(Self::Variable),
            "VA" => Some(Self::VariableAttributes),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted fact about one file.
///
/// `value` is `None` for attributes that hold no value (zero length, or a
/// NaN double).
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub path: String,
    pub entry_type: EntryType,
    pub key: String,
    pub value: Option<Value>,
}

impl MetadataEntry {
    pub fn new(
        path: impl Into<String>,
        entry_type: EntryType,
        key: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        Self {
            path: path.into(),
            entry_type,
            key: key.into(),
            value,
        }
    }
}

/// Catalog row as exposed in dumps, with the value coerced to a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub key: String,
    pub value: Option<String>,
}

impl From<&MetadataEntry> for CatalogRecord {
    fn from(entry: &MetadataEntry) -> Self {
        Self {
            path: entry.path.clone(),
            entry_type: entry.entry_type,
            key: entry.key.clone(),
            value: entry.value.as_ref().map(|v| v.to_string()),
        }
    }
}
