//! Slice query request and response types.

use serde::{Deserialize, Serialize};

use crate::value::DataKind;

/// A named bound on one dimension of a variable.
///
/// When the dataset has a coordinate variable of the same name, `min` and
/// `max` are coordinate values. Otherwise their floors are used as indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Min")]
    pub min: f64,
    #[serde(alias = "Max")]
    pub max: f64,
}

impl Coordinate {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    /// Bound selecting a single coordinate value.
    pub fn point(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, value)
    }
}

/// A slice query against one variable of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "Variable")]
    pub variable: String,
    #[serde(default, alias = "Coordinates")]
    pub coordinates: Vec<Coordinate>,
}

/// Extracted hyperslab: element kind plus little-endian encoded values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceResult {
    pub kind: DataKind,
    pub value: Vec<u8>,
}

impl SliceResult {
    /// Number of encoded elements.
    pub fn len(&self) -> usize {
        self.value.len() / self.kind.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}
