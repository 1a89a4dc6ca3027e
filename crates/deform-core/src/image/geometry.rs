//! Lattice geometry: extent, placement and orientation of a sampled grid.

use crate::error::{CoreError, Result};
use crate::interpolation;
use crate::spatial::{AxisOrder, Direction3, Point3, SpatialAxis, Vector3};

/// Placement of a regular lattice in world space.
///
/// Indices are in storage order (slowest dimension first). Column `k` of the
/// direction matrix is the world direction of storage dimension `k`; `spacing[k]`
/// is the signed step along it.
///
/// # Coordinate Systems
/// * **Index Space**: continuous storage indices
/// * **World Space**: `origin + direction * (spacing ⊙ index)`
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    shape: [usize; 3],
    origin: Point3,
    spacing: [f64; 3],
    direction: Direction3,
    inverse_direction: Direction3,
    axes: AxisOrder,
}

impl Geometry {
    /// Create a geometry with an explicit direction matrix.
    ///
    /// # Arguments
    /// * `shape` - Number of samples per storage dimension
    /// * `origin` - World position of index (0, 0, 0)
    /// * `spacing` - Signed step per storage dimension
    /// * `direction` - Column `k` is the world direction of storage dimension `k`
    /// * `axes` - World axis each storage dimension runs along
    pub fn new(
        shape: [usize; 3],
        origin: Point3,
        spacing: [f64; 3],
        direction: Direction3,
        axes: AxisOrder,
    ) -> Result<Self> {
        if shape.iter().any(|&n| n == 0) {
            return Err(CoreError::invalid_geometry(format!(
                "lattice extent must be positive along every axis, got {:?}",
                shape
            )));
        }
        let inverse_direction = direction.try_inverse().ok_or_else(|| {
            CoreError::SingularDirection(format!("{:?}", direction))
        })?;
        Ok(Self {
            shape,
            origin,
            spacing,
            direction,
            inverse_direction,
            axes,
        })
    }

    /// Create a geometry whose storage dimensions run exactly along the world axes in `axes`.
    pub fn axis_aligned(shape: [usize; 3], origin: Point3, spacing: [f64; 3], axes: AxisOrder) -> Result<Self> {
        Self::new(shape, origin, spacing, axes.direction(), axes)
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of lattice nodes.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    pub fn axes(&self) -> AxisOrder {
        self.axes
    }

    /// Signed step along a world axis.
    pub fn spacing_along(&self, axis: SpatialAxis) -> f64 {
        self.spacing[self.axes.dim_of(axis)]
    }

    /// Number of samples along a world axis.
    pub fn count_along(&self, axis: SpatialAxis) -> usize {
        self.shape[self.axes.dim_of(axis)]
    }

    /// Largest absolute step over all storage dimensions.
    pub fn max_abs_spacing(&self) -> f64 {
        self.spacing.iter().fold(0.0f64, |m, s| m.max(s.abs()))
    }

    /// World axes along which the lattice has a single sample.
    pub fn degenerate_axes(&self) -> Vec<SpatialAxis> {
        SpatialAxis::ALL
            .into_iter()
            .filter(|a| self.count_along(*a) == 1)
            .collect()
    }

    /// Map a continuous storage index to world space.
    pub fn index_to_world(&self, index: [f64; 3]) -> Point3 {
        let scaled = Vector3::new(
            index[0] * self.spacing[0],
            index[1] * self.spacing[1],
            index[2] * self.spacing[2],
        );
        self.origin + self.direction * scaled
    }

    /// Map a world point to a continuous storage index.
    pub fn world_to_index(&self, point: &Point3) -> [f64; 3] {
        let local = self.inverse_direction * (*point - self.origin);
        [
            local[0] / self.spacing[0],
            local[1] / self.spacing[1],
            local[2] / self.spacing[2],
        ]
    }

    /// World position of a lattice node.
    pub fn node_world(&self, index: [usize; 3]) -> Point3 {
        self.index_to_world([index[0] as f64, index[1] as f64, index[2] as f64])
    }

    /// Linear offset of a node.
    pub fn linear_index(&self, index: [usize; 3]) -> usize {
        interpolation::linear_index(self.shape, index)
    }

    /// Node index of a linear offset.
    pub fn index_of(&self, linear: usize) -> [usize; 3] {
        let k = linear % self.shape[2];
        let rest = linear / self.shape[2];
        [rest / self.shape[1], rest % self.shape[1], k]
    }

    /// In-bounds face neighbours of a node (two per non-degenerate dimension).
    pub fn face_neighbours(&self, index: [usize; 3]) -> impl Iterator<Item = [usize; 3]> + '_ {
        (0..3).flat_map(move |d| {
            let below = (index[d] > 0).then(|| {
                let mut n = index;
                n[d] -= 1;
                n
            });
            let above = (index[d] + 1 < self.shape[d]).then(|| {
                let mut n = index;
                n[d] += 1;
                n
            });
            below.into_iter().chain(above)
        })
    }

    /// All nodes with X outermost, then Y, then Z innermost.
    pub fn nodes_xyz_order(&self) -> Vec<[usize; 3]> {
        let [dx, dy, dz] = self.axes.xyz_dims();
        let mut nodes = Vec::with_capacity(self.len());
        for x in 0..self.shape[dx] {
            for y in 0..self.shape[dy] {
                for z in 0..self.shape[dz] {
                    let mut index = [0usize; 3];
                    index[dx] = x;
                    index[dy] = y;
                    index[dz] = z;
                    nodes.push(index);
                }
            }
        }
        nodes
    }

    /// A finer lattice covering the same extent, `factor` samples per original step.
    ///
    /// Degenerate dimensions stay single-sample.
    pub fn super_sampled(&self, factor: usize) -> Self {
        let factor = factor.max(1);
        let mut shape = self.shape;
        let mut spacing = self.spacing;
        for d in 0..3 {
            if self.shape[d] > 1 {
                shape[d] = (self.shape[d] - 1) * factor + 1;
                spacing[d] = self.spacing[d] / factor as f64;
            }
        }
        Self {
            shape,
            spacing,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> Geometry {
        Geometry::axis_aligned([3, 4, 5], Point3::new(1.0, 2.0, 3.0), [2.0, 1.0, 0.5], AxisOrder::ZYX).unwrap()
    }

    #[test]
    fn test_index_world_axes() {
        let g = lattice();
        let p = g.node_world([1, 2, 3]);
        // dim0 -> z, dim1 -> y, dim2 -> x
        assert!((p - Point3::new(1.0 + 1.5, 2.0 + 2.0, 3.0 + 2.0)).norm() < 1e-12);
        let idx = g.world_to_index(&p);
        assert!((idx[0] - 1.0).abs() < 1e-12);
        assert!((idx[1] - 2.0).abs() < 1e-12);
        assert!((idx[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_axis_queries() {
        let g = lattice();
        assert_eq!(g.count_along(SpatialAxis::X), 5);
        assert_eq!(g.spacing_along(SpatialAxis::Z), 2.0);
        assert_eq!(g.max_abs_spacing(), 2.0);
        assert!(g.degenerate_axes().is_empty());
    }

    #[test]
    fn test_linear_index_roundtrip() {
        let g = lattice();
        for linear in 0..g.len() {
            assert_eq!(g.linear_index(g.index_of(linear)), linear);
        }
    }

    #[test]
    fn test_face_neighbours() {
        let g = lattice();
        assert_eq!(g.face_neighbours([0, 0, 0]).count(), 3);
        assert_eq!(g.face_neighbours([1, 1, 1]).count(), 6);

        let flat = Geometry::axis_aligned([1, 4, 4], Point3::origin(), [1.0; 3], AxisOrder::ZYX).unwrap();
        assert_eq!(flat.face_neighbours([0, 1, 1]).count(), 4);
        assert_eq!(flat.degenerate_axes(), vec![SpatialAxis::Z]);
    }

    #[test]
    fn test_xyz_traversal_order() {
        let g = lattice();
        let nodes = g.nodes_xyz_order();
        assert_eq!(nodes.len(), g.len());
        assert_eq!(nodes[0], [0, 0, 0]);
        // Z (dim 0) varies fastest.
        assert_eq!(nodes[1], [1, 0, 0]);
        assert_eq!(nodes[3], [0, 1, 0]);
    }

    #[test]
    fn test_super_sampled_covers_extent() {
        let g = lattice();
        let fine = g.super_sampled(2);
        assert_eq!(fine.shape(), [5, 7, 9]);
        let a = g.node_world([2, 3, 4]);
        let b = fine.node_world([4, 6, 8]);
        assert!((a - b).norm() < 1e-12);
    }

    #[test]
    fn test_singular_direction_rejected() {
        let result = Geometry::new([2, 2, 2], Point3::origin(), [1.0; 3], Direction3::zeros(), AxisOrder::ZYX);
        assert!(matches!(result, Err(CoreError::SingularDirection(_))));
    }
}
