//! Transform trait for spatial coordinate transformations.

use crate::spatial::Point3;

/// Maps world points from one space to another.
///
/// All transforms used by a deformation run implement this trait. The
/// inverse is always available; grid transforms approximate it iteratively.
pub trait Transform {
    /// Apply the transform to a point.
    fn transform_point(&self, point: &Point3) -> Point3;

    /// Apply the inverse transform to a point.
    fn inverse_transform_point(&self, point: &Point3) -> Point3;
}
