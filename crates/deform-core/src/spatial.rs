//! Spatial primitives and axis ordering.
//!
//! Points, vectors and direction matrices are plain `nalgebra` types. Lattices
//! store their samples in a storage order (slowest dimension first); which
//! world axis each storage dimension runs along is carried by [`AxisOrder`]
//! and must always be queried rather than assumed.

use nalgebra::{Matrix3, Point3 as NaPoint3, Vector3 as NaVector3};
use serde::{Deserialize, Serialize};

pub type Point3 = NaPoint3<f64>;
pub type Vector3 = NaVector3<f64>;
pub type Direction3 = Matrix3<f64>;

/// A world axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialAxis {
    X,
    Y,
    Z,
}

impl SpatialAxis {
    /// All world axes in X, Y, Z order.
    pub const ALL: [SpatialAxis; 3] = [SpatialAxis::X, SpatialAxis::Y, SpatialAxis::Z];

    /// Component index of this axis in a world vector.
    pub fn component(self) -> usize {
        match self {
            SpatialAxis::X => 0,
            SpatialAxis::Y => 1,
            SpatialAxis::Z => 2,
        }
    }

    /// Unit world vector along this axis.
    pub fn unit(self) -> Vector3 {
        let mut v = Vector3::zeros();
        v[self.component()] = 1.0;
        v
    }
}

/// Maps storage dimensions (slowest first) to world axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisOrder([SpatialAxis; 3]);

impl AxisOrder {
    /// Z slowest, X fastest.
    pub const ZYX: AxisOrder = AxisOrder([SpatialAxis::Z, SpatialAxis::Y, SpatialAxis::X]);
    /// X slowest, Z fastest.
    pub const XYZ: AxisOrder = AxisOrder([SpatialAxis::X, SpatialAxis::Y, SpatialAxis::Z]);

    /// Build an axis order, returning `None` unless every world axis appears once.
    pub fn new(axes: [SpatialAxis; 3]) -> Option<Self> {
        let distinct = axes[0] != axes[1] && axes[1] != axes[2] && axes[0] != axes[2];
        distinct.then_some(Self(axes))
    }

    /// World axis of storage dimension `dim`.
    pub fn axis_of(&self, dim: usize) -> SpatialAxis {
        self.0[dim]
    }

    /// Storage dimension that runs along `axis`.
    pub fn dim_of(&self, axis: SpatialAxis) -> usize {
        self.0
            .iter()
            .position(|a| *a == axis)
            .unwrap_or(axis.component())
    }

    /// Storage dimensions of the X, Y and Z axes.
    pub fn xyz_dims(&self) -> [usize; 3] {
        [
            self.dim_of(SpatialAxis::X),
            self.dim_of(SpatialAxis::Y),
            self.dim_of(SpatialAxis::Z),
        ]
    }

    /// Direction matrix whose columns are the world unit vectors of each storage dimension.
    pub fn direction(&self) -> Direction3 {
        Direction3::from_columns(&[self.0[0].unit(), self.0[1].unit(), self.0[2].unit()])
    }
}

impl Default for AxisOrder {
    fn default() -> Self {
        Self::ZYX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_order_lookup() {
        let order = AxisOrder::ZYX;
        assert_eq!(order.dim_of(SpatialAxis::X), 2);
        assert_eq!(order.dim_of(SpatialAxis::Z), 0);
        assert_eq!(order.axis_of(1), SpatialAxis::Y);
        assert_eq!(order.xyz_dims(), [2, 1, 0]);
    }

    #[test]
    fn test_axis_order_rejects_duplicates() {
        assert!(AxisOrder::new([SpatialAxis::X, SpatialAxis::X, SpatialAxis::Y]).is_none());
        assert!(AxisOrder::new([SpatialAxis::Y, SpatialAxis::Z, SpatialAxis::X]).is_some());
    }

    #[test]
    fn test_direction_columns() {
        let dir = AxisOrder::ZYX.direction();
        let v = dir * Vector3::new(1.0, 0.0, 0.0);
        assert!((v - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }
}
