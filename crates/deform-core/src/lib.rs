pub mod error;
pub mod spatial;
pub mod image;
pub mod interpolation;
pub mod transform;

pub use error::{CoreError, Result};
pub use image::{point_not_masked, Geometry, Image, Volume};
pub use interpolation::Interpolation;
pub use spatial::{AxisOrder, SpatialAxis, Point3, Vector3, Direction3};
pub use transform::{AffineTransform, DeformationField, GeneralTransform, GridTransform, Transform, TransformChain};
