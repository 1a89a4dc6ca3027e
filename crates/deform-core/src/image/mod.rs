//! Lattice geometry, host-side volumes and tensor-backed images.
//!
//! `Volume` is what the registration code samples; `Image` is the burn tensor
//! view used to move data in and out of a backend.

pub mod geometry;
pub mod volume;
pub mod image;

pub use geometry::Geometry;
pub use volume::{point_not_masked, Volume};
pub use image::Image;
