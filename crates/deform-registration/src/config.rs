//! Configuration of a non-linear deformation run.
//!
//! Values only: callers load them however they like (the types derive
//! `serde` traits) and refine them with the `with_*` builders.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation;

/// How per-node estimates are folded into the deformation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingStrategy {
    /// Accumulate every estimate, then blur the whole field.
    Global,
    /// Blend each node with its neighbour mean as it is estimated.
    LocalIsotropic,
    /// Blend along the principal curvature directions of the local objective (3D only).
    LocalAnisotropic,
}

impl SmoothingStrategy {
    pub fn is_local(self) -> bool {
        !matches!(self, SmoothingStrategy::Global)
    }
}

/// How the best local displacement of a node is searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalSearch {
    /// Nelder–Mead simplex over the displacement.
    Simplex,
    /// Closed-form extremum of a quadratic fitted to a 3×3(×3) stencil.
    QuadraticFit,
}

/// How local similarity is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityMode {
    /// Correlate a spherical sub-lattice of samples.
    Neighbourhood,
    /// Compare value and gradient at a single point (features 0..3 hold value, d/dx, d/dy, d/dz).
    Projection,
}

/// Weights multiplied into the quadratic-fit stencil before fitting,
/// indexed by how many of the offsets are non-zero (centre, face, edge, corner).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StencilWeights(pub [f64; 4]);

impl StencilWeights {
    /// Unit weights used for 3×3×3 stencils.
    pub const VOLUMETRIC: StencilWeights = StencilWeights([1.0, 1.0, 1.0, 1.0]);
    /// Weights used for 3×3 stencils.
    pub const PLANAR: StencilWeights = StencilWeights([1.0, 0.97, 0.89, 0.89]);

    /// Weight of a stencil cell at the given offsets (each in -1..=1).
    pub fn weight(&self, offsets: &[i32]) -> f64 {
        let nonzero = offsets.iter().filter(|o| **o != 0).count();
        self.0[nonzero.min(3)]
    }
}

/// Parameters of a non-linear deformation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonlinearConfig {
    /// Number of sweeps over the lattice.
    pub iterations: usize,
    /// Weight of the neighbour mean when smoothing (0..=1).
    pub smoothing_weight: f64,
    /// Fraction of each iteration's estimate applied to the field.
    pub iteration_weight: f64,
    /// Trade-off between similarity and displacement cost (0..=1).
    pub similarity_cost_ratio: f64,
    /// Relative spread at which the simplex is considered converged.
    pub simplex_tolerance: f64,
    /// Simplex steps after which a node counts as not converged.
    pub max_simplex_steps: usize,
    /// Super-sampling factor of the warp used to build target sub-lattices (≤ 1 disables).
    pub super_sampling: usize,
    pub smoothing: SmoothingStrategy,
    pub search: LocalSearch,
    pub similarity: SimilarityMode,
    /// Source intensity below which a node is not estimated.
    pub source_threshold: f64,
    /// Target intensity at or below which a node is not visited.
    pub target_threshold: f64,
    /// Nodes with magnitude ≥ mean + factor·std are re-estimated.
    pub outlier_std_factor: f64,
    /// Sub-lattice diameter in samples minus one.
    pub sublattice_diameter: usize,
    /// Displacement magnitude above which a warning is logged.
    pub displacement_warning: f64,
    pub stencil_weights_3d: StencilWeights,
    pub stencil_weights_2d: StencilWeights,
    /// Jitter target sub-lattice voxels off integer positions.
    pub jitter: bool,
    /// Seed of the per-node jitter generators.
    pub seed: u64,
    /// Estimate nodes on the rayon thread pool.
    pub parallel: bool,
    /// Compute whole-volume cross-correlation before the run and after every iteration.
    pub report_similarity: bool,
    /// Hand the transform to progress callbacks after every iteration.
    pub snapshot_each_iteration: bool,
}

impl Default for NonlinearConfig {
    fn default() -> Self {
        Self {
            iterations: 4,
            smoothing_weight: 0.5,
            iteration_weight: 0.6,
            similarity_cost_ratio: 0.5,
            simplex_tolerance: 0.005,
            max_simplex_steps: 400,
            super_sampling: 0,
            smoothing: SmoothingStrategy::Global,
            search: LocalSearch::Simplex,
            similarity: SimilarityMode::Neighbourhood,
            source_threshold: 0.0,
            target_threshold: 0.0,
            outlier_std_factor: 1.0,
            sublattice_diameter: 7,
            displacement_warning: 50.0,
            stencil_weights_3d: StencilWeights::VOLUMETRIC,
            stencil_weights_2d: StencilWeights::PLANAR,
            jitter: true,
            seed: 0,
            parallel: true,
            report_similarity: false,
            snapshot_each_iteration: false,
        }
    }
}

impl NonlinearConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_smoothing_weight(mut self, weight: f64) -> Self {
        self.smoothing_weight = weight;
        self
    }

    pub fn with_iteration_weight(mut self, weight: f64) -> Self {
        self.iteration_weight = weight;
        self
    }

    pub fn with_similarity_cost_ratio(mut self, ratio: f64) -> Self {
        self.similarity_cost_ratio = ratio;
        self
    }

    pub fn with_simplex_tolerance(mut self, tolerance: f64) -> Self {
        self.simplex_tolerance = tolerance;
        self
    }

    pub fn with_super_sampling(mut self, factor: usize) -> Self {
        self.super_sampling = factor;
        self
    }

    pub fn with_smoothing(mut self, smoothing: SmoothingStrategy) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_search(mut self, search: LocalSearch) -> Self {
        self.search = search;
        self
    }

    pub fn with_similarity(mut self, similarity: SimilarityMode) -> Self {
        self.similarity = similarity;
        self
    }

    /// Set source (threshold1) and target (threshold2) intensity thresholds.
    pub fn with_thresholds(mut self, source: f64, target: f64) -> Self {
        self.source_threshold = source;
        self.target_threshold = target;
        self
    }

    pub fn with_outlier_std_factor(mut self, factor: f64) -> Self {
        self.outlier_std_factor = factor;
        self
    }

    pub fn with_sublattice_diameter(mut self, diameter: usize) -> Self {
        self.sublattice_diameter = diameter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sample target sub-lattices at their exact positions.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Estimate nodes on the calling thread.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_similarity_reporting(mut self) -> Self {
        self.report_similarity = true;
        self
    }

    pub fn with_snapshots(mut self) -> Self {
        self.snapshot_each_iteration = true;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        validation::validate_unit_interval("smoothing_weight", self.smoothing_weight)?;
        validation::validate_unit_interval("similarity_cost_ratio", self.similarity_cost_ratio)?;
        validation::validate_non_negative("iteration_weight", self.iteration_weight)?;
        validation::validate_non_negative("outlier_std_factor", self.outlier_std_factor)?;
        validation::validate_positive("simplex_tolerance", self.simplex_tolerance)?;
        validation::validate_positive("displacement_warning", self.displacement_warning)?;
        validation::validate_count("max_simplex_steps", self.max_simplex_steps)?;
        validation::validate_count("sublattice_diameter", self.sublattice_diameter)?;
        validation::validate_threshold("source_threshold", self.source_threshold)?;
        validation::validate_threshold("target_threshold", self.target_threshold)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistrationError;

    #[test]
    fn test_default_is_valid() {
        assert!(NonlinearConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = NonlinearConfig::new()
            .with_iterations(2)
            .with_smoothing(SmoothingStrategy::LocalAnisotropic)
            .with_search(LocalSearch::QuadraticFit)
            .with_thresholds(5.0, 10.0)
            .sequential();
        assert_eq!(config.iterations, 2);
        assert!(config.smoothing.is_local());
        assert_eq!(config.source_threshold, 5.0);
        assert!(!config.parallel);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = NonlinearConfig::new().with_smoothing_weight(1.5).validate().unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidConfiguration(_)));

        let err = NonlinearConfig::new().with_thresholds(-1.0, 0.0).validate().unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidThreshold(_)));
    }

    #[test]
    fn test_stencil_weights() {
        let w = StencilWeights::PLANAR;
        assert_eq!(w.weight(&[0, 0]), 1.0);
        assert_eq!(w.weight(&[1, 0]), 0.97);
        assert_eq!(w.weight(&[-1, 1]), 0.89);
        assert_eq!(StencilWeights::VOLUMETRIC.weight(&[1, 1, 1]), 1.0);
    }
}
