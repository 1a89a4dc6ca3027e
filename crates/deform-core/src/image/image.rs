//! Tensor-backed image with lattice geometry.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{CoreError, Result};
use crate::image::geometry::Geometry;

/// Image data held in a backend tensor of shape `[d0, d1, d2]` (storage order).
///
/// # Type Parameters
/// * `B` - The backend (CPU or GPU) holding the samples
#[derive(Debug, Clone)]
pub struct Image<B: Backend> {
    data: Tensor<B, 3>,
    geometry: Geometry,
}

impl<B: Backend> Image<B> {
    /// Attach a geometry to a tensor, checking that the extents agree.
    pub fn new(data: Tensor<B, 3>, geometry: Geometry) -> Result<Self> {
        let dims = data.dims();
        if dims != geometry.shape() {
            return Err(CoreError::ShapeMismatch {
                expected: geometry.shape().to_vec(),
                actual: dims.to_vec(),
            });
        }
        Ok(Self { data, geometry })
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Get the image shape as an array.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }
}
