//! Slice extraction: turn named coordinate bounds into a hyperslab and read it.

use std::path::Path;

use tracing::debug;

use catalog_common::{CatalogError, CatalogResult, Coordinate, QueryRequest, SliceResult};

use crate::codec;
use crate::dataset::{Dataset, DatasetOpener, Variable};
use crate::resolver;

/// Per-dimension start offsets and extents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperslab {
    pub offsets: Vec<usize>,
    pub lengths: Vec<usize>,
}

/// Compute the hyperslab of `variable` selected by `coordinates`.
///
/// Dimensions without a bound keep their full range. If two bounds name the
/// same dimension the later one wins.
pub fn hyperslab(
    dataset: &dyn Dataset,
    variable: &dyn Variable,
    coordinates: &[Coordinate],
) -> CatalogResult<Hyperslab> {
    let dimensions = variable.dimensions()?;
    let mut offsets = vec![0usize; dimensions.len()];
    let mut lengths: Vec<usize> = dimensions.iter().map(|d| d.len).collect();

    for coordinate in coordinates {
        let axis = dimensions
            .iter()
            .position(|d| d.name == coordinate.name)
            .ok_or_else(|| CatalogError::CoordinateNotFound(coordinate.name.clone()))?;

        let (start, end) = match dataset.variable(&coordinate.name)? {
            Some(coordinate_var) => {
                let values = coordinate_var.read_all()?;
                let start = resolver::index_of(&coordinate.name, coordinate.min, &values)?;
                let end = resolver::index_of(&coordinate.name, coordinate.max, &values)?;
                (start, end)
            }
            None => literal_indices(coordinate, dimensions[axis].len)?,
        };

        if end < start {
            return Err(CatalogError::InvalidBounds {
                coordinate: coordinate.name.clone(),
                message: format!("max index {} precedes min index {}", end, start),
            });
        }

        offsets[axis] = start;
        lengths[axis] = end - start + 1;
    }

    Ok(Hyperslab { offsets, lengths })
}

/// Bounds on a dimension without a coordinate variable are floored to indices.
fn literal_indices(coordinate: &Coordinate, dim_len: usize) -> CatalogResult<(usize, usize)> {
    let invalid = |message: String| CatalogError::InvalidBounds {
        coordinate: coordinate.name.clone(),
        message,
    };

    let (min, max) = (coordinate.min.floor(), coordinate.max.floor());
    if !min.is_finite() || !max.is_finite() {
        return Err(invalid("bounds must be finite".to_string()));
    }
    if min < 0.0 {
        return Err(invalid(format!("negative index {}", min)));
    }
    if max < min {
        return Err(invalid(format!("max index {} precedes min index {}", max, min)));
    }
    if max >= dim_len as f64 {
        return Err(invalid(format!("index {} past dimension length {}", max, dim_len)));
    }

    Ok((min as usize, max as usize))
}

/// Extract the requested slice from an open dataset.
pub fn extract(dataset: &dyn Dataset, request: &QueryRequest) -> CatalogResult<SliceResult> {
    let variable = dataset
        .variable(&request.variable)?
        .ok_or_else(|| CatalogError::VariableNotFound(request.variable.clone()))?;

    let kind = variable.kind()?;
    let slab = hyperslab(dataset, variable.as_ref(), &request.coordinates)?;

    debug!(
        variable = %request.variable,
        offsets = ?slab.offsets,
        lengths = ?slab.lengths,
        "Reading hyperslab"
    );

    let values = variable.read(&slab.offsets, &slab.lengths)?;
    codec::encode(kind, &values)
}

/// Open the dataset at `path`, extract the slice, and close it again.
pub fn lookup(
    opener: &dyn DatasetOpener,
    path: &Path,
    request: &QueryRequest,
) -> CatalogResult<SliceResult> {
    let dataset = opener.open(path)?;
    extract(dataset.as_ref(), request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::dataset::NativeArray;
    use crate::memory::{MemoryDataset, MemoryVariable};
    use catalog_common::DataKind;

    /// lat(4) coordinate, time(2) without a coordinate variable, temp(time, lat).
    fn dataset() -> MemoryDataset {
        MemoryDataset::new()
            .with_variable(MemoryVariable::coordinate(
                "lat",
                NativeArray::Double(vec![10.0, 10.5, 11.0, 11.5]),
            ))
            .with_variable(MemoryVariable::new(
                "temp",
                &[("time", 2), ("lat", 4)],
                NativeArray::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
            ))
    }

    fn request(coordinates: Vec<Coordinate>) -> QueryRequest {
        QueryRequest {
            variable: "temp".to_string(),
            coordinates,
        }
    }

    fn slab_for(coordinates: Vec<Coordinate>) -> CatalogResult<Hyperslab> {
        let ds = dataset();
        let var = ds.variable("temp").unwrap().unwrap();
        hyperslab(&ds, var.as_ref(), &coordinates)
    }

    #[test]
    fn test_no_bounds_selects_everything() {
        let slab = slab_for(vec![]).unwrap();
        assert_eq!(slab.offsets, vec![0, 0]);
        assert_eq!(slab.lengths, vec![2, 4]);
    }

    /// time(5) x lat(4) x lon(3), no coordinate variables, values 0..60.
    fn cube() -> MemoryDataset {
        MemoryDataset::new().with_variable(MemoryVariable::new(
            "temp",
            &[("time", 5), ("lat", 4), ("lon", 3)],
            NativeArray::Int((0..60).collect()),
        ))
    }

    #[test]
    fn test_three_dimensions_without_bounds_select_everything() {
        let ds = cube();
        let var = ds.variable("temp").unwrap().unwrap();
        let slab = hyperslab(&ds, var.as_ref(), &[]).unwrap();

        assert_eq!(slab.offsets, vec![0, 0, 0]);
        assert_eq!(slab.lengths, vec![5, 4, 3]);
        assert_eq!(slab.lengths.iter().product::<usize>(), 60);

        let result = extract(&ds, &request(vec![])).unwrap();
        assert_eq!(result.value.len(), 60 * 4);
    }

    #[test]
    fn test_three_dimensions_with_partial_bounds() {
        let result = extract(
            &cube(),
            &request(vec![
                Coordinate::new("time", 2.0, 3.0),
                Coordinate::point("lon", 1.0),
            ]),
        )
        .unwrap();

        assert_eq!(result.kind, DataKind::Int);
        assert_eq!(
            decode(result.kind, &result.value).unwrap(),
            NativeArray::Int(vec![25, 28, 31, 34, 37, 40, 43, 46])
        );
    }

    #[test]
    fn test_point_bound_on_coordinate_variable() {
        let slab = slab_for(vec![Coordinate::point("lat", 11.5)]).unwrap();
        assert_eq!(slab.offsets, vec![0, 3]);
        assert_eq!(slab.lengths, vec![2, 1]);
    }

    #[test]
    fn test_literal_index_bounds_are_floored() {
        let slab = slab_for(vec![Coordinate::new("time", 1.7, 1.2)]).unwrap();
        assert_eq!(slab.offsets, vec![1, 0]);
        assert_eq!(slab.lengths, vec![1, 4]);
    }

    #[test]
    fn test_reversed_coordinate_bounds_fail() {
        let err = slab_for(vec![Coordinate::new("lat", 11.0, 10.5)]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidBounds { .. }));
    }

    #[test]
    fn test_literal_index_past_end_fails() {
        let err = slab_for(vec![Coordinate::new("time", 0.0, 2.0)]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidBounds { .. }));
    }

    #[test]
    fn test_unknown_dimension_fails() {
        let err = slab_for(vec![Coordinate::point("depth", 0.0)]).unwrap_err();
        assert!(matches!(err, CatalogError::CoordinateNotFound(ref n) if n == "depth"));
    }

    #[test]
    fn test_unresolvable_value_fails() {
        let err = slab_for(vec![Coordinate::new("lat", 10.25, 11.0)]).unwrap_err();
        assert!(matches!(err, CatalogError::ValueNotFound { .. }));
    }

    #[test]
    fn test_later_bound_on_same_dimension_wins() {
        let slab = slab_for(vec![
            Coordinate::point("lat", 10.0),
            Coordinate::new("lat", 10.5, 11.0),
        ])
        .unwrap();
        assert_eq!(slab.offsets, vec![0, 1]);
        assert_eq!(slab.lengths, vec![2, 2]);
    }

    #[test]
    fn test_extract_reads_selected_values() {
        let result = extract(
            &dataset(),
            &request(vec![
                Coordinate::point("time", 1.0),
                Coordinate::new("lat", 10.5, 11.0),
            ]),
        )
        .unwrap();

        assert_eq!(result.kind, DataKind::Float);
        assert_eq!(result.value.len(), 8);
        assert_eq!(
            decode(result.kind, &result.value).unwrap(),
            NativeArray::Float(vec![6.0, 7.0])
        );
    }

    #[test]
    fn test_extract_unknown_variable() {
        let mut req = request(vec![]);
        req.variable = "salinity".to_string();
        assert!(matches!(
            extract(&dataset(), &req),
            Err(CatalogError::VariableNotFound(_))
        ));
    }

    #[test]
    fn test_extract_unsupported_kind() {
        let ds = dataset().with_variable(MemoryVariable::unsupported("flags", &[("lat", 4)], "UINT"));
        let mut req = request(vec![]);
        req.variable = "flags".to_string();
        assert!(matches!(
            extract(&ds, &req),
            Err(CatalogError::TypeMismatch(_))
        ));
    }
}
