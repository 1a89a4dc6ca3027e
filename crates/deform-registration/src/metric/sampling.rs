//! Regular sampling lattices for whole-volume objectives.

use deform_core::{Geometry, Point3, Vector3};

/// A regular grid of world points: `start + i·steps[0] + j·steps[1] + k·steps[2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingLattice {
    pub start: Point3,
    pub counts: [usize; 3],
    pub steps: [Vector3; 3],
}

impl SamplingLattice {
    /// Every `stride`-th voxel of a volume's lattice.
    pub fn over(geometry: &Geometry, stride: usize) -> Self {
        let stride = stride.max(1);
        let shape = geometry.shape();
        let origin = geometry.index_to_world([0.0; 3]);
        let mut steps = [Vector3::zeros(); 3];
        let mut counts = [0usize; 3];
        for d in 0..3 {
            let mut unit = [0.0; 3];
            unit[d] = stride as f64;
            steps[d] = geometry.index_to_world(unit) - origin;
            counts[d] = (shape[d] + stride - 1) / stride;
        }
        Self {
            start: origin,
            counts,
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.counts.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All lattice points, last axis fastest.
    pub fn points(&self) -> impl Iterator<Item = Point3> + '_ {
        let [n0, n1, n2] = self.counts;
        (0..n0).flat_map(move |i| {
            (0..n1).flat_map(move |j| {
                (0..n2).map(move |k| {
                    self.start
                        + self.steps[0] * i as f64
                        + self.steps[1] * j as f64
                        + self.steps[2] * k as f64
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deform_core::AxisOrder;

    #[test]
    fn test_lattice_covers_volume() {
        let g = Geometry::axis_aligned([4, 5, 6], Point3::new(1.0, 0.0, 0.0), [1.0, 1.0, 2.0], AxisOrder::ZYX).unwrap();
        let lattice = SamplingLattice::over(&g, 2);
        assert_eq!(lattice.counts, [2, 3, 3]);
        assert_eq!(lattice.points().count(), 18);
        let last = lattice.points().last().unwrap();
        assert!((last - g.node_world([2, 4, 4])).norm() < 1e-12);
    }
}
