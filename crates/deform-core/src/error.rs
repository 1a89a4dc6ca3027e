//! Error types for geometry and transform construction.

use thiserror::Error;

/// Errors raised while building lattices, volumes and transforms.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The direction cosine matrix cannot be inverted.
    #[error("Singular direction matrix: {0}")]
    SingularDirection(String),

    /// The linear part of an affine transform cannot be inverted.
    #[error("Singular transform: {0}")]
    SingularTransform(String),

    /// A data buffer does not match the lattice it is attached to.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A lattice was declared with an empty axis.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Tensor data could not be read back from the backend.
    #[error("Tensor data error: {0}")]
    TensorData(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an invalid geometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }
}
