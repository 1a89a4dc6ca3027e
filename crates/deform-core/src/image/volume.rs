//! Host-side scalar volume sampled by the registration code.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::{CoreError, Result};
use crate::image::geometry::Geometry;
use crate::image::image::Image;
use crate::interpolation::{self, Interpolation};
use crate::spatial::Point3;

/// A scalar lattice with its geometry.
///
/// Samples outside the lattice read as zero.
#[derive(Debug, Clone)]
pub struct Volume {
    geometry: Geometry,
    data: Vec<f32>,
}

impl Volume {
    /// Create a volume from storage-ordered samples.
    pub fn new(geometry: Geometry, data: Vec<f32>) -> Result<Self> {
        if data.len() != geometry.len() {
            return Err(CoreError::ShapeMismatch {
                expected: vec![geometry.len()],
                actual: vec![data.len()],
            });
        }
        Ok(Self { geometry, data })
    }

    /// A volume of zeros.
    pub fn zeros(geometry: Geometry) -> Self {
        let data = vec![0.0; geometry.len()];
        Self { geometry, data }
    }

    /// Fill a volume by evaluating `f` at every node's world position.
    pub fn from_fn(geometry: Geometry, f: impl Fn(&Point3) -> f32) -> Self {
        let data = (0..geometry.len())
            .map(|linear| f(&geometry.node_world(geometry.index_of(linear))))
            .collect();
        Self { geometry, data }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn value(&self, index: [usize; 3]) -> f32 {
        self.data[self.geometry.linear_index(index)]
    }

    pub fn set_value(&mut self, index: [usize; 3], value: f32) {
        let linear = self.geometry.linear_index(index);
        self.data[linear] = value;
    }

    /// Sample at a continuous storage index, `None` outside the lattice.
    pub fn try_sample_index(&self, index: [f64; 3], mode: Interpolation) -> Option<f64> {
        interpolation::sample(&self.data, self.geometry.shape(), index, mode)
    }

    /// Sample at a continuous storage index, zero outside the lattice.
    pub fn sample_index(&self, index: [f64; 3], mode: Interpolation) -> f64 {
        self.try_sample_index(index, mode).unwrap_or(0.0)
    }

    /// Sample at a world point, zero outside the lattice.
    pub fn sample_world(&self, point: &Point3, mode: Interpolation) -> f64 {
        self.sample_index(self.geometry.world_to_index(point), mode)
    }

    /// Smallest and largest stored value.
    pub fn real_range(&self) -> (f64, f64) {
        self.data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v as f64), hi.max(v as f64))
        })
    }

    /// Copy the samples of a tensor-backed image.
    pub fn from_image<B: Backend>(image: &Image<B>) -> Result<Self> {
        let data = image
            .data()
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::TensorData(format!("{:?}", e)))?;
        Self::new(image.geometry().clone(), data)
    }

    /// Upload the samples to a backend tensor.
    pub fn to_image<B: Backend>(&self, device: &B::Device) -> Result<Image<B>> {
        let shape = self.geometry.shape();
        let tensor = Tensor::<B, 3>::from_data(TensorData::new(self.data.clone(), shape), device);
        Image::new(tensor, self.geometry.clone())
    }
}

/// Whether `point` is inside the mask (no mask accepts every point).
pub fn point_not_masked(mask: Option<&Volume>, point: &Point3) -> bool {
    match mask {
        None => true,
        Some(mask) => mask.sample_world(point, Interpolation::Nearest) > 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::AxisOrder;

    fn geometry() -> Geometry {
        Geometry::axis_aligned([4, 4, 4], Point3::origin(), [1.0; 3], AxisOrder::ZYX).unwrap()
    }

    #[test]
    fn test_from_fn_follows_axis_order() {
        let vol = Volume::from_fn(geometry(), |p| p.x as f32);
        // x runs along the fastest storage dimension
        assert_eq!(vol.value([0, 0, 3]), 3.0);
        assert_eq!(vol.value([3, 0, 0]), 0.0);
    }

    #[test]
    fn test_sample_world_linear() {
        let vol = Volume::from_fn(geometry(), |p| (p.x + 2.0 * p.y) as f32);
        let v = vol.sample_world(&Point3::new(1.5, 0.5, 2.0), Interpolation::Linear);
        assert!((v - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_outside_reads_zero() {
        let vol = Volume::from_fn(geometry(), |_| 7.0);
        assert_eq!(vol.sample_world(&Point3::new(10.0, 0.0, 0.0), Interpolation::Linear), 0.0);
    }

    #[test]
    fn test_mask() {
        let mut mask = Volume::zeros(geometry());
        mask.set_value([1, 1, 1], 1.0);
        assert!(point_not_masked(Some(&mask), &Point3::new(1.1, 0.9, 1.0)));
        assert!(!point_not_masked(Some(&mask), &Point3::new(2.0, 2.0, 2.0)));
        assert!(point_not_masked(None, &Point3::new(2.0, 2.0, 2.0)));
    }

    #[test]
    fn test_real_range() {
        let vol = Volume::from_fn(geometry(), |p| (p.z - 1.0) as f32);
        assert_eq!(vol.real_range(), (-1.0, 2.0));
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(matches!(
            Volume::new(geometry(), vec![0.0; 3]),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }
}
