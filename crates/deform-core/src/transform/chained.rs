//! Ordered composition of transforms.
//!
//! T(x) = Tn(...T2(T1(x)))

use crate::spatial::Point3;
use super::affine::AffineTransform;
use super::displacement_field::{DeformationField, GridTransform};
use super::trait_::Transform;

/// One element of a transform chain.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneralTransform {
    Affine(AffineTransform),
    Grid(GridTransform),
}

impl GeneralTransform {
    pub fn is_linear(&self) -> bool {
        matches!(self, GeneralTransform::Affine(_))
    }
}

impl Transform for GeneralTransform {
    fn transform_point(&self, point: &Point3) -> Point3 {
        match self {
            GeneralTransform::Affine(t) => t.transform_point(point),
            GeneralTransform::Grid(t) => t.transform_point(point),
        }
    }

    fn inverse_transform_point(&self, point: &Point3) -> Point3 {
        match self {
            GeneralTransform::Affine(t) => t.inverse_transform_point(point),
            GeneralTransform::Grid(t) => t.inverse_transform_point(point),
        }
    }
}

impl From<AffineTransform> for GeneralTransform {
    fn from(t: AffineTransform) -> Self {
        GeneralTransform::Affine(t)
    }
}

impl From<GridTransform> for GeneralTransform {
    fn from(t: GridTransform) -> Self {
        GeneralTransform::Grid(t)
    }
}

/// Transforms applied in order, first element first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformChain {
    transforms: Vec<GeneralTransform>,
}

impl TransformChain {
    /// Create an empty (identity) chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform, builder style.
    pub fn then(mut self, transform: impl Into<GeneralTransform>) -> Self {
        self.push(transform);
        self
    }

    /// Append a transform.
    pub fn push(&mut self, transform: impl Into<GeneralTransform>) {
        self.transforms.push(transform.into());
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneralTransform> {
        self.transforms.iter()
    }

    /// Split into the leading chain and the trailing grid transform.
    ///
    /// # Returns
    /// `None` when the chain does not end with a grid transform.
    pub fn split_nonlinear(&self) -> Option<(TransformChain, &GridTransform)> {
        match self.transforms.split_last() {
            Some((GeneralTransform::Grid(grid), leading)) => Some((
                TransformChain {
                    transforms: leading.to_vec(),
                },
                grid,
            )),
            _ => None,
        }
    }

    /// The trailing deformation field, if any.
    pub fn deformation(&self) -> Option<&DeformationField> {
        match self.transforms.last() {
            Some(GeneralTransform::Grid(grid)) => Some(grid.field()),
            _ => None,
        }
    }

    /// Mutable access to the trailing deformation field, if any.
    pub fn deformation_mut(&mut self) -> Option<&mut DeformationField> {
        match self.transforms.last_mut() {
            Some(GeneralTransform::Grid(grid)) => Some(grid.field_mut()),
            _ => None,
        }
    }
}

impl Transform for TransformChain {
    fn transform_point(&self, point: &Point3) -> Point3 {
        self.transforms
            .iter()
            .fold(*point, |p, t| t.transform_point(&p))
    }

    fn inverse_transform_point(&self, point: &Point3) -> Point3 {
        self.transforms
            .iter()
            .rev()
            .fold(*point, |p, t| t.inverse_transform_point(&p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Geometry;
    use crate::spatial::{AxisOrder, Vector3};

    fn grid() -> GridTransform {
        let g = Geometry::axis_aligned([4, 4, 4], Point3::origin(), [1.0; 3], AxisOrder::ZYX).unwrap();
        GridTransform::new(DeformationField::zeros(g))
    }

    #[test]
    fn test_chain_order() {
        let chain = TransformChain::new()
            .then(AffineTransform::from_translation(Vector3::new(1.0, 0.0, 0.0)))
            .then(AffineTransform::from_translation(Vector3::new(0.0, 1.0, 0.0)));
        let y = chain.transform_point(&Point3::origin());
        assert!((y - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
        let x = chain.inverse_transform_point(&y);
        assert!((x - Point3::origin()).norm() < 1e-12);
    }

    #[test]
    fn test_split_nonlinear() {
        let chain = TransformChain::new()
            .then(AffineTransform::identity())
            .then(grid());
        let (linear, _grid) = chain.split_nonlinear().unwrap();
        assert_eq!(linear.len(), 1);
        assert!(linear.iter().all(GeneralTransform::is_linear));
    }

    #[test]
    fn test_split_without_grid() {
        let chain = TransformChain::new().then(AffineTransform::identity());
        assert!(chain.split_nonlinear().is_none());
        assert!(TransformChain::new().split_nonlinear().is_none());
    }
}
