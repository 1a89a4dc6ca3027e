//! Displacement lattice and grid transform.
//!
//! A [`DeformationField`] stores one world-space displacement vector per
//! lattice node, with the three vector components held as separate
//! planes. [`GridTransform`] turns such a field into a transform.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::{CoreError, Result};
use crate::image::Geometry;
use crate::interpolation::{self, Interpolation};
use crate::spatial::{Point3, Vector3};
use super::trait_::Transform;

/// Dense lattice of displacement vectors.
///
/// `components[c]` holds world component `c` (X, Y, Z) for every node in
/// storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeformationField {
    geometry: Geometry,
    components: [Vec<f64>; 3],
}

impl DeformationField {
    /// Create a zero displacement field on a lattice.
    pub fn zeros(geometry: Geometry) -> Self {
        let n = geometry.len();
        Self {
            geometry,
            components: [vec![0.0; n], vec![0.0; n], vec![0.0; n]],
        }
    }

    /// Create a field by evaluating `f` at every node's world position.
    pub fn from_fn(geometry: Geometry, f: impl Fn(&Point3) -> Vector3) -> Self {
        let mut field = Self::zeros(geometry);
        for linear in 0..field.geometry.len() {
            let p = field.geometry.node_world(field.geometry.index_of(linear));
            field.set_vector_at(linear, &f(&p));
        }
        field
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Component plane for world axis `c`.
    pub fn component(&self, c: usize) -> &[f64] {
        &self.components[c]
    }

    /// Displacement at a linear node offset.
    pub fn vector_at(&self, linear: usize) -> Vector3 {
        Vector3::new(
            self.components[0][linear],
            self.components[1][linear],
            self.components[2][linear],
        )
    }

    pub fn set_vector_at(&mut self, linear: usize, v: &Vector3) {
        for c in 0..3 {
            self.components[c][linear] = v[c];
        }
    }

    /// Displacement at a node.
    pub fn vector(&self, index: [usize; 3]) -> Vector3 {
        self.vector_at(self.geometry.linear_index(index))
    }

    pub fn set_vector(&mut self, index: [usize; 3], v: &Vector3) {
        let linear = self.geometry.linear_index(index);
        self.set_vector_at(linear, v);
    }

    /// Reset every displacement to zero.
    pub fn fill_zero(&mut self) {
        for plane in self.components.iter_mut() {
            plane.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    /// Largest displacement magnitude in the field.
    pub fn max_magnitude(&self) -> f64 {
        (0..self.geometry.len())
            .map(|i| self.vector_at(i).norm())
            .fold(0.0, f64::max)
    }

    /// Trilinear displacement at a world point, zero outside the lattice.
    pub fn interpolate(&self, point: &Point3) -> Vector3 {
        let index = self.geometry.world_to_index(point);
        let shape = self.geometry.shape();
        let mut v = Vector3::zeros();
        for c in 0..3 {
            match interpolation::sample(&self.components[c], shape, index, Interpolation::Linear) {
                Some(value) => v[c] = value,
                None => return Vector3::zeros(),
            }
        }
        v
    }

    /// Displacement of the node closest to a world point, if inside the lattice.
    pub fn nearest_displacement(&self, point: &Point3) -> Option<Vector3> {
        let index = self.geometry.world_to_index(point);
        interpolation::nearest_index(self.geometry.shape(), index).map(|idx| self.vector(idx))
    }

    /// Mean displacement of the in-bounds face neighbours of a node.
    pub fn neighbour_mean(&self, index: [usize; 3]) -> Option<Vector3> {
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        for n in self.geometry.face_neighbours(index) {
            sum += self.vector(n);
            count += 1;
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Where the neighbours of a node expect it to land: the node position
    /// displaced by the mean neighbour displacement.
    pub fn neighbour_mean_target(&self, index: [usize; 3]) -> Option<Point3> {
        self.neighbour_mean(index)
            .map(|mean| self.geometry.node_world(index) + mean)
    }

    /// Add `weight * other` node by node.
    pub fn add_scaled(&mut self, other: &DeformationField, weight: f64) {
        for c in 0..3 {
            for (a, b) in self.components[c].iter_mut().zip(other.components[c].iter()) {
                *a += weight * b;
            }
        }
    }

    /// A copy of this field on a lattice `factor` times finer.
    pub fn super_sample(&self, factor: usize) -> Self {
        let mut fine = Self::zeros(self.geometry.super_sampled(factor));
        fine.resample_from(self);
        fine
    }

    /// Overwrite every node with the trilinear interpolation of `coarse`.
    pub fn resample_from(&mut self, coarse: &DeformationField) {
        for linear in 0..self.geometry.len() {
            let p = self.geometry.node_world(self.geometry.index_of(linear));
            let v = coarse.interpolate(&p);
            self.set_vector_at(linear, &v);
        }
    }

    /// Export as a `[3, d0, d1, d2]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let [d0, d1, d2] = self.geometry.shape();
        let values: Vec<f32> = self
            .components
            .iter()
            .flat_map(|plane| plane.iter().map(|&v| v as f32))
            .collect();
        Tensor::<B, 4>::from_data(TensorData::new(values, [3, d0, d1, d2]), device)
    }

    /// Import a `[3, d0, d1, d2]` tensor onto a lattice.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 4>, geometry: Geometry) -> Result<Self> {
        let [d0, d1, d2] = geometry.shape();
        let dims = tensor.dims();
        if dims != [3, d0, d1, d2] {
            return Err(CoreError::ShapeMismatch {
                expected: vec![3, d0, d1, d2],
                actual: dims.to_vec(),
            });
        }
        let values = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::TensorData(format!("{:?}", e)))?;
        let n = geometry.len();
        let plane = |c: usize| -> Vec<f64> { values[c * n..(c + 1) * n].iter().map(|&v| v as f64).collect() };
        Ok(Self {
            components: [plane(0), plane(1), plane(2)],
            geometry,
        })
    }
}

/// Transform that displaces points by an interpolated deformation field.
///
/// T(x) = x + d(x)
#[derive(Debug, Clone, PartialEq)]
pub struct GridTransform {
    field: DeformationField,
    inverse_iterations: usize,
    inverse_tolerance: f64,
}

impl GridTransform {
    /// Wrap a deformation field.
    pub fn new(field: DeformationField) -> Self {
        Self {
            field,
            inverse_iterations: 20,
            inverse_tolerance: 1e-6,
        }
    }

    /// Set the fixed-point iteration budget of the inverse.
    pub fn with_inverse_iterations(mut self, iterations: usize, tolerance: f64) -> Self {
        self.inverse_iterations = iterations;
        self.inverse_tolerance = tolerance;
        self
    }

    pub fn field(&self) -> &DeformationField {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut DeformationField {
        &mut self.field
    }
}

impl Transform for GridTransform {
    fn transform_point(&self, point: &Point3) -> Point3 {
        *point + self.field.interpolate(point)
    }

    fn inverse_transform_point(&self, point: &Point3) -> Point3 {
        let mut estimate = *point - self.field.interpolate(point);
        for _ in 0..self.inverse_iterations {
            let next = *point - self.field.interpolate(&estimate);
            let change = (next - estimate).norm();
            estimate = next;
            if change < self.inverse_tolerance {
                break;
            }
        }
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::AxisOrder;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn lattice() -> Geometry {
        Geometry::axis_aligned([5, 5, 5], Point3::origin(), [2.0; 3], AxisOrder::ZYX).unwrap()
    }

    #[test]
    fn test_interpolate_linear_field() {
        let field = DeformationField::from_fn(lattice(), |p| Vector3::new(0.1 * p.x, 0.0, -0.05 * p.z));
        let d = field.interpolate(&Point3::new(3.0, 1.0, 5.0));
        assert!((d - Vector3::new(0.3, 0.0, -0.25)).norm() < 1e-12);
    }

    #[test]
    fn test_grid_inverse() {
        let field = DeformationField::from_fn(lattice(), |p| Vector3::new(0.05 * p.y, 0.1, 0.0));
        let t = GridTransform::new(field);
        let p = Point3::new(3.0, 4.0, 2.5);
        let q = t.transform_point(&p);
        let back = t.inverse_transform_point(&q);
        assert!((back - p).norm() < 1e-5);
    }

    #[test]
    fn test_neighbour_mean_at_corner() {
        let mut field = DeformationField::zeros(lattice());
        field.set_vector([1, 0, 0], &Vector3::new(3.0, 0.0, 0.0));
        let mean = field.neighbour_mean([0, 0, 0]).unwrap();
        assert!((mean - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);

        let target = field.neighbour_mean_target([0, 0, 0]).unwrap();
        assert!((target - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_super_sample_preserves_nodes() {
        let field = DeformationField::from_fn(lattice(), |p| Vector3::new(p.x * p.y * 0.01, 0.0, 1.0));
        let fine = field.super_sample(2);
        assert_eq!(fine.geometry().shape(), [9, 9, 9]);
        assert!((fine.vector([2, 4, 6]) - field.vector([1, 2, 3])).norm() < 1e-12);
        let mid = fine.vector([0, 0, 1]);
        assert!((mid[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_displacement_outside() {
        let field = DeformationField::zeros(lattice());
        assert!(field.nearest_displacement(&Point3::new(-5.0, 0.0, 0.0)).is_none());
        assert!(field.nearest_displacement(&Point3::new(0.4, 7.9, 0.0)).is_some());
    }

    #[test]
    fn test_tensor_roundtrip() {
        let device = Default::default();
        let field = DeformationField::from_fn(lattice(), |p| Vector3::new(p.x, -p.y, 0.5));
        let tensor = field.to_tensor::<TestBackend>(&device);
        assert_eq!(tensor.dims(), [3, 5, 5, 5]);
        let back = DeformationField::from_tensor(tensor, lattice()).unwrap();
        assert!((back.vector([4, 3, 2]) - field.vector([4, 3, 2])).norm() < 1e-5);
    }
}
