//! Non-linear deformation estimation.
//!
//! `driver` runs the iterations, `node` estimates single lattice nodes,
//! `sublattice` builds their sample neighbourhoods, `quadratic` fits
//! objective stencils and `smoothing` folds estimates into the field.

pub mod quadratic;
pub mod sublattice;
pub mod node;
pub mod smoothing;
pub mod driver;

pub use driver::{NonlinearRegistration, RegistrationSummary};
pub use node::{NodeEstimate, NodeEstimator, NodeOutcome, Phase, SearchGeometry, SweepTransforms};
pub use quadratic::{
    displacement_from_quadratic_fit_2d, displacement_from_quadratic_fit_3d, principal_directions, Curvature,
    PrincipalDirections, QuadraticFit,
};
pub use smoothing::{ConfidenceConstants, K_MEAN};
