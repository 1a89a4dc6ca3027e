//! Lattice-node non-linear deformation estimation.
//!
//! Given matched source and target feature volumes and an initial transform
//! chain ending in a deformation field, [`NonlinearRegistration`] refines the
//! field node by node with a local similarity search and smoothing.

pub mod error;
pub mod config;
pub mod feature;
pub mod stats;
pub mod validation;
pub mod progress;
pub mod optimizer;
pub mod metric;
pub mod nonlinear;

pub use error::{RegistrationError, Result};
pub use config::{LocalSearch, NonlinearConfig, SimilarityMode, SmoothingStrategy, StencilWeights};
pub use feature::{Feature, FeatureSet, ObjectiveKind};
pub use stats::RunStatistics;
pub use progress::{ConsoleProgressCallback, HistoryCallback, IterationReport, ProgressCallback, ProgressTracker};
pub use metric::{cross_correlation_objective, MutualInformation};
pub use nonlinear::{NodeEstimate, NonlinearRegistration, RegistrationSummary};
