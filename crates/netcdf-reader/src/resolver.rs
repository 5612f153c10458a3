//! Map a coordinate value to its index within a coordinate variable.

use catalog_common::{CatalogError, CatalogResult};

use crate::dataset::NativeArray;

/// Match tolerance, applied after casting to the stored width.
pub const EPSILON: f64 = 1e-15;

/// Index of the first element of `values` equal to `target`.
///
/// `target` is first cast to the stored kind: integers truncate toward zero
/// (saturating), FLOAT rounds to the nearest f32. A value that does not
/// reproduce any stored element fails with `ValueNotFound`.
pub fn index_of(coordinate: &str, target: f64, values: &NativeArray) -> CatalogResult<usize> {
    let not_found = || CatalogError::ValueNotFound {
        coordinate: coordinate.to_string(),
        value: target,
    };

    if !target.is_finite() {
        return Err(not_found());
    }

    let close = |a: f64, b: f64| (a - b).abs() < EPSILON;

    let position = match values {
        NativeArray::Byte(v) => {
            let t = f64::from(target as i8);
            v.iter().position(|x| close(f64::from(*x), t))
        }
        NativeArray::Short(v) => {
            let t = f64::from(target as i16);
            v.iter().position(|x| close(f64::from(*x), t))
        }
        NativeArray::Int(v) => {
            let t = f64::from(target as i32);
            v.iter().position(|x| close(f64::from(*x), t))
        }
        NativeArray::Int64(v) => {
            let t = target as i64;
            v.iter().position(|x| *x == t)
        }
        NativeArray::Float(v) => {
            let t = f64::from(target as f32);
            v.iter().position(|x| close(f64::from(*x), t))
        }
        NativeArray::Double(v) => v.iter().position(|x| close(*x, target)),
        NativeArray::Char(_) => {
            return Err(CatalogError::TypeMismatch(format!(
                "CHAR coordinate variable {}",
                coordinate
            )))
        }
    };

    position.ok_or_else(not_found)
}
