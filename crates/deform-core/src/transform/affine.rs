//! Affine transform implementation.
//!
//! This module provides an affine transform (linear transformation + translation).

use crate::error::{CoreError, Result};
use crate::spatial::{Direction3, Point3, Vector3};
use super::trait_::Transform;

/// Affine Transform (Linear transformation + Translation).
///
/// Represents a general affine transformation with a fixed center:
/// T(x) = A(x - c) + c + t
///
/// where:
/// * A is a 3×3 matrix (linear transformation: rotation, scale, shear)
/// * t is a translation vector
/// * c is a fixed center of rotation/scaling
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform {
    matrix: Direction3,
    inverse: Direction3,
    translation: Vector3,
    center: Point3,
}

impl AffineTransform {
    /// Create a new affine transform.
    ///
    /// # Arguments
    /// * `matrix` - Linear transformation matrix
    /// * `translation` - Translation vector
    /// * `center` - Fixed center
    pub fn new(matrix: Direction3, translation: Vector3, center: Point3) -> Result<Self> {
        let inverse = matrix
            .try_inverse()
            .ok_or_else(|| CoreError::SingularTransform(format!("{:?}", matrix)))?;
        Ok(Self {
            matrix,
            inverse,
            translation,
            center,
        })
    }

    /// Create an identity affine transform.
    pub fn identity() -> Self {
        Self {
            matrix: Direction3::identity(),
            inverse: Direction3::identity(),
            translation: Vector3::zeros(),
            center: Point3::origin(),
        }
    }

    /// Create a pure translation.
    pub fn from_translation(translation: Vector3) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Get the transformation matrix.
    pub fn matrix(&self) -> &Direction3 {
        &self.matrix
    }

    /// Get the translation vector.
    pub fn translation(&self) -> &Vector3 {
        &self.translation
    }

    /// Get the center of rotation.
    pub fn center(&self) -> &Point3 {
        &self.center
    }
}

impl Transform for AffineTransform {
    fn transform_point(&self, point: &Point3) -> Point3 {
        self.center + self.matrix * (*point - self.center) + self.translation
    }

    fn inverse_transform_point(&self, point: &Point3) -> Point3 {
        self.center + self.inverse * (*point - self.center - self.translation)
    }
}
