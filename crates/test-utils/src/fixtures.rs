//! Sample datasets shared across the test suite.
//!
//! Every fixture describes the same small ocean grid so that in-memory
//! and on-disk tests can assert against the same numbers:
//!
//! - global attribute `title`
//! - dimensions `time` (2) and `lat` (3)
//! - coordinate variable `lat` (float) with `units`
//! - data variable `sst(time, lat)` (double) with `units`; `time` has no
//!   coordinate variable, so it is addressed by index

use std::path::Path;

use catalog_common::{EntryType, MetadataEntry, Value};
use netcdf_reader::{AttrData, MemoryDataset, MemoryVariable, NativeArray};

pub const SAMPLE_TITLE: &str = "Sea surface temperature";

pub const SAMPLE_LAT: [f32; 3] = [-0.5, 0.0, 0.5];

/// Row-major `sst(time, lat)`.
pub const SAMPLE_SST: [f64; 6] = [280.0, 281.0, 282.0, 290.0, 291.0, 292.0];

/// The sample grid as an in-memory dataset.
pub fn sample_dataset() -> MemoryDataset {
    MemoryDataset::new()
        .with_attribute("title", AttrData::text(SAMPLE_TITLE))
        .with_variable(
            MemoryVariable::coordinate("lat", NativeArray::Float(SAMPLE_LAT.to_vec()))
                .with_attribute("units", AttrData::text("degrees_north")),
        )
        .with_variable(
            MemoryVariable::new(
                "sst",
                &[("time", 2), ("lat", 3)],
                NativeArray::Double(SAMPLE_SST.to_vec()),
            )
            .with_attribute("units", AttrData::text("K")),
        )
}

/// A second, unrelated dataset for tests that need two distinct files.
pub fn pressure_dataset() -> MemoryDataset {
    MemoryDataset::new()
        .with_attribute("source", AttrData::text("station"))
        .with_variable(MemoryVariable::new(
            "pressure",
            &[("obs", 4)],
            NativeArray::Int(vec![1013, 1009, 998, 1021]),
        ))
}

/// Write the sample grid as a real netCDF file.
pub fn write_sample_netcdf(path: &Path) {
    let mut file = netcdf::create(path).expect("create netCDF file");
    file.add_attribute("title", SAMPLE_TITLE)
        .expect("add title");
    file.add_dimension("time", 2).expect("add time dimension");
    file.add_dimension("lat", 3).expect("add lat dimension");

    let mut lat = file
        .add_variable::<f32>("lat", &["lat"])
        .expect("add lat variable");
    lat.put_values(&SAMPLE_LAT, ..).expect("write lat");
    lat.add_attribute("units", "degrees_north")
        .expect("add lat units");

    let mut sst = file
        .add_variable::<f64>("sst", &["time", "lat"])
        .expect("add sst variable");
    sst.put_values(&SAMPLE_SST, ..).expect("write sst");
    sst.add_attribute("units", "K").expect("add sst units");
}

/// Hand-built catalog entries for store tests that don't go through extraction.
pub fn sample_entries(path: &str) -> Vec<MetadataEntry> {
    vec![
        MetadataEntry::new(
            path,
            EntryType::GlobalAttribute,
            "title",
            Some(Value::Text(SAMPLE_TITLE.to_string())),
        ),
        MetadataEntry::new(
            path,
            EntryType::Variable,
            "sst",
            Some(Value::Text("time lat".to_string())),
        ),
        MetadataEntry::new(
            path,
            EntryType::VariableAttributes,
            "sst",
            Some(Value::Bytes(br#"{"units":"K"}"#.to_vec())),
        ),
        MetadataEntry::new(path, EntryType::Dimension, "time", Some(Value::Int64(2))),
        MetadataEntry::new(path, EntryType::Dimension, "lat", Some(Value::Int64(3))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_reader::{extract_metadata, Dataset};

    #[test]
    fn test_sample_dataset_shape() {
        let ds = sample_dataset();
        let sst = ds.variable("sst").unwrap().unwrap();
        let dims: Vec<usize> = sst.dimensions().unwrap().iter().map(|d| d.len).collect();
        assert_eq!(dims, vec![2, 3]);
    }

    #[test]
    fn test_sample_dataset_extracts() {
        let entries = extract_metadata(&sample_dataset(), "sample.nc").unwrap();
        assert!(entries
            .iter()
            .any(|e| e.entry_type == EntryType::Variable && e.key == "sst"));
    }

    #[test]
    fn test_sample_entries_share_path() {
        assert!(sample_entries("x.nc").iter().all(|e| e.path == "x.nc"));
    }
}
