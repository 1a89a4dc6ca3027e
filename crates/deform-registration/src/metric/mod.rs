//! Similarity measures.
//!
//! `similarity` holds the per-node measures the local search optimizes;
//! `ncc` and `mutual_information` are whole-volume objectives used for
//! reporting and for callers comparing transforms.

pub mod similarity;
pub mod sampling;
pub mod ncc;
pub mod histogram;
pub mod mutual_information;

pub use similarity::{displacement_cost, LocalSimilarity, NodeObjective, COST_CEILING};
pub use sampling::SamplingLattice;
pub use ncc::cross_correlation_objective;
pub use histogram::{partial_volume_interpolation, JointHistogram, PartialVolumeSample};
pub use mutual_information::MutualInformation;
