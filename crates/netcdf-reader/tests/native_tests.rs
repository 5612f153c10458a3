//! Tests against real netCDF files written to a temp directory.

use std::path::Path;

use catalog_common::{Coordinate, DataKind, EntryType, QueryRequest, Value};
use netcdf_reader::codec::decode;
use netcdf_reader::{extract_metadata, lookup, DatasetOpener, NativeArray, NetcdfOpener};
use tempfile::TempDir;

/// lat(3) coordinate plus sst(time=2, lat=3) without a time coordinate.
fn write_sample(path: &Path) {
    let mut file = netcdf::create(path).unwrap();
    file.add_attribute("title", "Sea surface temperature").unwrap();
    file.add_dimension("time", 2).unwrap();
    file.add_dimension("lat", 3).unwrap();

    let mut lat = file.add_variable::<f32>("lat", &["lat"]).unwrap();
    lat.put_values(&[-0.5f32, 0.0, 0.5], ..).unwrap();
    lat.add_attribute("units", "degrees_north").unwrap();

    let mut sst = file.add_variable::<f64>("sst", &["time", "lat"]).unwrap();
    sst.put_values(&[280.0, 281.0, 282.0, 290.0, 291.0, 292.0], ..)
        .unwrap();
    sst.add_attribute("scale", 0.01f64).unwrap();
}

fn sample_file() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sst.nc");
    write_sample(&path);
    (dir, path)
}

// ============================================================================
// Slice lookups
// ============================================================================

#[test]
fn test_lookup_single_row_and_column() {
    let (_dir, path) = sample_file();
    let request = QueryRequest {
        variable: "sst".to_string(),
        coordinates: vec![Coordinate::point("time", 1.0), Coordinate::point("lat", 0.5)],
    };

    let result = lookup(&NetcdfOpener, &path, &request).unwrap();
    assert_eq!(result.kind, DataKind::Double);
    assert_eq!(
        decode(result.kind, &result.value).unwrap(),
        NativeArray::Double(vec![292.0])
    );
}

#[test]
fn test_lookup_float_coordinate_range() {
    let (_dir, path) = sample_file();
    let request = QueryRequest {
        variable: "sst".to_string(),
        coordinates: vec![Coordinate::new("lat", -0.5, 0.0)],
    };

    let result = lookup(&NetcdfOpener, &path, &request).unwrap();
    assert_eq!(
        decode(result.kind, &result.value).unwrap(),
        NativeArray::Double(vec![280.0, 281.0, 290.0, 291.0])
    );
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn test_metadata_from_file() {
    let (_dir, path) = sample_file();
    let dataset = NetcdfOpener.open(&path).ok().unwrap();
    let entries = extract_metadata(dataset.as_ref(), "sst.nc").unwrap();

    let title = entries
        .iter()
        .find(|e| e.entry_type == EntryType::GlobalAttribute)
        .unwrap();
    assert_eq!(title.key, "title");
    assert_eq!(
        title.value,
        Some(Value::Text("Sea surface temperature".to_string()))
    );

    let sst = entries
        .iter()
        .find(|e| e.entry_type == EntryType::Variable && e.key == "sst")
        .unwrap();
    assert_eq!(sst.value, Some(Value::Text("time lat".to_string())));

    let variables = entries
        .iter()
        .filter(|e| e.entry_type == EntryType::Variable)
        .count();
    assert_eq!(variables, 2);
}

// ============================================================================
// Shared fixture
// ============================================================================

#[test]
fn test_fixture_coordinate_reads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fixture.nc");
    test_utils::write_sample_netcdf(&path);

    let request = QueryRequest {
        variable: "lat".to_string(),
        coordinates: Vec::new(),
    };
    let result = lookup(&NetcdfOpener, &path, &request).unwrap();
    assert_eq!(result.kind, DataKind::Float);

    match decode(result.kind, &result.value).unwrap() {
        NativeArray::Float(values) => {
            test_utils::assert_slice_approx_eq!(values, test_utils::SAMPLE_LAT, 1e-6)
        }
        other => panic!("unexpected array {:?}", other),
    }
}

#[test]
fn test_fixture_file_matches_memory_dataset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fixture.nc");
    test_utils::write_sample_netcdf(&path);

    let dataset = NetcdfOpener.open(&path).ok().unwrap();
    let from_file = extract_metadata(dataset.as_ref(), "fixture.nc").unwrap();
    let from_memory = extract_metadata(&test_utils::sample_dataset(), "fixture.nc").unwrap();

    let keys = |entries: &[catalog_common::MetadataEntry]| {
        let mut keys: Vec<(EntryType, String)> = entries
            .iter()
            .map(|e| (e.entry_type, e.key.clone()))
            .collect();
        keys.sort();
        keys
    };
    assert_eq!(keys(&from_file), keys(&from_memory));
}

#[test]
fn test_external_archive_extracts() {
    let path = test_utils::require_test_file!("era5_sample.nc");

    let dataset = NetcdfOpener.open(&path).ok().unwrap();
    let entries = extract_metadata(dataset.as_ref(), "era5_sample.nc").unwrap();
    assert!(entries
        .iter()
        .any(|e| e.entry_type == EntryType::Dimension));
}
