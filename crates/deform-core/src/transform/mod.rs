//! Spatial transforms.
//!
//! This module provides the transform trait and the transforms a
//! deformation run works with: affine maps, grid (displacement lattice)
//! transforms and ordered chains of both.

pub mod trait_;
pub mod affine;
pub mod displacement_field;
pub mod chained;

pub use trait_::Transform;
pub use affine::AffineTransform;
pub use displacement_field::{DeformationField, GridTransform};
pub use chained::{GeneralTransform, TransformChain};
