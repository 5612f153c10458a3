//! Flatten a dataset's structure into catalog entries.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use catalog_common::{CatalogError, CatalogResult, EntryType, MetadataEntry, Value};

use crate::codec::read_scalar_attribute;
use crate::dataset::{Dataset, Dimension, Variable};

/// Extract every catalog entry for the dataset stored at `path`.
///
/// Emits one `GlobalAttribute` per dataset attribute, then per variable a
/// `Variable` entry (space-joined dimension names), a `VariableAttributes`
/// entry (JSON map of attribute name to value) and one `Dimension` entry per
/// dimension. Any failure other than dimension enumeration aborts the whole
/// extraction with `ExtractionFailure`.
pub fn extract_metadata(dataset: &dyn Dataset, path: &str) -> CatalogResult<Vec<MetadataEntry>> {
    let failed = |err: CatalogError| match err {
        CatalogError::ExtractionFailure { .. } => err,
        other => CatalogError::ExtractionFailure {
            path: path.to_string(),
            reason: other.to_string(),
        },
    };

    let mut entries = Vec::new();

    for attr in dataset.attributes().map_err(failed)? {
        let value = read_scalar_attribute(&attr).map_err(failed)?;
        entries.push(MetadataEntry::new(
            path,
            EntryType::GlobalAttribute,
            attr.name,
            value,
        ));
    }

    for variable in dataset.variables().map_err(failed)? {
        let name = variable.name();
        let dimensions = enumerate_dimensions(variable.as_ref());

        let joined = dimensions.as_ref().map(|dims| {
            Value::Text(
                dims.iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        });
        entries.push(MetadataEntry::new(
            path,
            EntryType::Variable,
            name.clone(),
            joined.ok(),
        ));

        let attributes = variable_attributes(variable.as_ref()).map_err(failed)?;
        entries.push(MetadataEntry::new(
            path,
            EntryType::VariableAttributes,
            name.clone(),
            Some(attributes),
        ));

        match dimensions {
            Ok(dims) => {
                for dim in dims {
                    entries.push(MetadataEntry::new(
                        path,
                        EntryType::Dimension,
                        dim.name,
                        Some(Value::Int64(dim.len as i64)),
                    ));
                }
            }
            Err(e) => {
                warn!(
                    path = %path,
                    variable = %name,
                    error = %e,
                    "Skipping dimensions of variable"
                );
            }
        }
    }

    debug!(path = %path, entries = entries.len(), "Extracted metadata");
    Ok(entries)
}

/// Dimension enumeration runs inside a panic boundary; a damaged variable
/// only loses its own dimension entries.
fn enumerate_dimensions(variable: &dyn Variable) -> CatalogResult<Vec<Dimension>> {
    match panic::catch_unwind(AssertUnwindSafe(|| variable.dimensions())) {
        Ok(result) => result,
        Err(payload) => Err(CatalogError::Dataset(format!(
            "dimension enumeration panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn variable_attributes(variable: &dyn Variable) -> CatalogResult<Value> {
    let mut map = BTreeMap::new();
    for attr in variable.attributes()? {
        let value = read_scalar_attribute(&attr)?;
        map.insert(attr.name, value);
    }
    Ok(Value::Bytes(serde_json::to_vec(&map)?))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
