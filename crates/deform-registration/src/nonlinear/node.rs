//! Estimation of the displacement at a single lattice node.

use deform_core::{
    DeformationField, Geometry, Interpolation, Point3, SpatialAxis, Transform, TransformChain, Vector3,
};

use crate::config::{LocalSearch, NonlinearConfig, SimilarityMode, SmoothingStrategy};
use crate::error::{RegistrationError, Result};
use crate::feature::{Feature, FeatureSet};
use crate::metric::{LocalSimilarity, NodeObjective};
use crate::optimizer::{LocalOptimizer, SimplexOptimizer};

use super::quadratic::{self, stencil_offsets, Curvature, PrincipalDirections, QuadraticFit};
use super::sublattice;

/// Result of estimating one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeEstimate {
    /// Source intensity below threshold; nothing to estimate.
    NoEstimate,
    /// The quadratic fit had no maximum.
    IllConditioned,
    Estimated {
        /// World-space deformation to add to the node.
        deformation: Vector3,
        magnitude: f64,
        /// Displacement found by the local search, in primary target voxels.
        voxel_displacement: [f64; 3],
        /// Objective evaluations used; 0 when the search hit its step cap.
        evaluations: usize,
    },
}

impl NodeEstimate {
    pub fn is_estimated(&self) -> bool {
        matches!(self, NodeEstimate::Estimated { .. })
    }
}

/// A node estimate plus what anisotropic smoothing needs to blend it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeOutcome {
    pub estimate: NodeEstimate,
    /// Curvature of the objective at the new target, in world coordinates.
    pub curvature: Option<Curvature>,
    /// Lowest objective value of the curvature stencil.
    pub best_objective: f64,
}

impl NodeOutcome {
    fn plain(estimate: NodeEstimate) -> Self {
        Self {
            estimate,
            curvature: None,
            best_objective: 0.0,
        }
    }
}

/// Which sweep a node is estimated in; feeds the jitter seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Primary,
    Reestimate,
}

impl Phase {
    fn code(self) -> u64 {
        match self {
            Phase::Primary => 0,
            Phase::Reestimate => 1,
        }
    }
}

/// Step sizes and search dimensions shared by every node of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchGeometry {
    /// World spacing of the deformation lattice along its first non-degenerate axis.
    pub node_step: f64,
    /// `node_step` in units of the coarsest primary target step.
    pub simplex_size: f64,
    /// Storage dimensions of the primary target that are searched, ascending.
    pub active_dims: Vec<usize>,
}

impl SearchGeometry {
    /// Derive the search geometry from the deformation lattice and the primary target.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the lattice has fewer than two non-degenerate axes.
    pub fn new(lattice: &Geometry, data: &Geometry) -> Result<Self> {
        let active_axes: Vec<SpatialAxis> = SpatialAxis::ALL
            .into_iter()
            .filter(|a| lattice.count_along(*a) > 1)
            .collect();
        if active_axes.len() < 2 {
            return Err(RegistrationError::invalid_configuration(format!(
                "deformation lattice {:?} needs at least two axes with more than one node",
                lattice.shape()
            )));
        }
        let node_step = lattice.spacing_along(active_axes[0]).abs();
        let simplex_size = node_step / data.max_abs_spacing();
        let mut active_dims: Vec<usize> = active_axes.iter().map(|a| data.axes().dim_of(*a)).collect();
        active_dims.sort_unstable();
        Ok(Self {
            node_step,
            simplex_size,
            active_dims,
        })
    }

    pub fn is_planar(&self) -> bool {
        self.active_dims.len() == 2
    }

    /// Cube of the largest tolerated voxel displacement, `(2s)³`.
    pub fn cost_radius(&self) -> f64 {
        8.0 * self.simplex_size.powi(3)
    }

    /// Simplex size for an iteration, shrinking from `s` to `s/2` over the run.
    pub fn search_radius(&self, iteration: usize, total_iterations: usize) -> f64 {
        if total_iterations == 0 {
            return self.simplex_size;
        }
        let remaining = total_iterations.saturating_sub(iteration) as f64 / total_iterations as f64;
        self.simplex_size * (0.5 + 0.5 * remaining)
    }

    /// Voxel offset from search parameters scaled by `scale`.
    pub fn offset(&self, params: &[f64], scale: f64) -> [f64; 3] {
        let mut offset = [0.0; 3];
        for (p, &d) in params.iter().zip(self.active_dims.iter()) {
            offset[d] = p * scale;
        }
        offset
    }
}

/// Transforms a sweep reads while the field is frozen.
#[derive(Debug, Clone, Copy)]
pub struct SweepTransforms<'a> {
    /// Leading linear part of the chain.
    pub linear: &'a TransformChain,
    /// The whole chain, including the current deformation.
    pub full: &'a TransformChain,
    /// Finer copy of the current deformation, when super-sampling.
    pub super_sampled: Option<&'a DeformationField>,
}

/// Estimates nodes of one sweep. Holds only shared references, so a single
/// estimator serves every thread of a parallel sweep.
pub struct NodeEstimator<'a> {
    features: &'a FeatureSet,
    primary: &'a Feature,
    config: &'a NonlinearConfig,
    lattice: &'a Geometry,
    search: &'a SearchGeometry,
    transforms: SweepTransforms<'a>,
    iteration: usize,
}

impl<'a> NodeEstimator<'a> {
    pub fn new(
        features: &'a FeatureSet,
        config: &'a NonlinearConfig,
        lattice: &'a Geometry,
        search: &'a SearchGeometry,
        transforms: SweepTransforms<'a>,
        iteration: usize,
    ) -> Result<Self> {
        let primary = features.primary().ok_or(RegistrationError::NoFeatures)?;
        Ok(Self {
            features,
            primary,
            config,
            lattice,
            search,
            transforms,
            iteration,
        })
    }

    fn objective(&self) -> NodeObjective {
        NodeObjective::new(self.config.similarity_cost_ratio, self.search.cost_radius())
    }

    /// Estimate the deformation of `node`.
    ///
    /// # Arguments
    /// * `node` - Lattice index
    /// * `mean_target` - Where the node's neighbours expect it to land
    /// * `phase` - Sweep the estimate belongs to
    pub fn estimate(&self, node: [usize; 3], mean_target: &Point3, phase: Phase) -> NodeOutcome {
        let node_world = self.lattice.node_world(node);
        let source_node = self.transforms.linear.inverse_transform_point(&node_world);

        if self.primary.source.sample_world(&source_node, Interpolation::Linear) < self.config.source_threshold {
            return NodeOutcome::plain(NodeEstimate::NoEstimate);
        }

        // start halfway between the mapped node and its neighbours' expectation
        let mapped = self.transforms.full.transform_point(&source_node);
        let start = Point3::from((mapped.coords + mean_target.coords) / 2.0);
        let mut deformation = start - mapped;
        let anchor = self.transforms.full.inverse_transform_point(&start);

        let mut similarity = match self.config.similarity {
            SimilarityMode::Neighbourhood => self.neighbourhood(node, &source_node, &anchor, phase),
            SimilarityMode::Projection => {
                let target = self.transforms.full.transform_point(&anchor);
                let voxel = self.primary.target.geometry().world_to_index(&target);
                LocalSimilarity::projection(self.features, &anchor, voxel)
            }
        };
        let objective = self.objective();

        let (voxel_displacement, evaluations) = match self.config.search {
            LocalSearch::QuadraticFit => {
                let half = self.search.simplex_size / 2.0;
                let values = self.stencil(&similarity, &objective, half);
                let weights = if self.search.is_planar() {
                    &self.config.stencil_weights_2d
                } else {
                    &self.config.stencil_weights_3d
                };
                let dims = self.search.active_dims.len();
                match QuadraticFit::fit(&values, dims, weights).and_then(|fit| fit.maximum()) {
                    Some(x) => (self.search.offset(x.as_slice(), half), values.len()),
                    None => return NodeOutcome::plain(NodeEstimate::IllConditioned),
                }
            }
            LocalSearch::Simplex => self.simplex(&similarity, &objective),
        };

        if voxel_displacement.iter().any(|v| *v != 0.0) {
            let geometry = self.primary.target.geometry();
            let voxel = geometry.world_to_index(&start);
            let moved = geometry.index_to_world([
                voxel[0] + voxel_displacement[0],
                voxel[1] + voxel_displacement[1],
                voxel[2] + voxel_displacement[2],
            ]);
            deformation += moved - start;
        }

        let magnitude = deformation.norm();
        if magnitude > self.config.displacement_warning {
            tracing::warn!(
                "Displacement of {:.3} at node {:?} exceeds {} (voxel displacement {:?}, simplex size {:.3})",
                magnitude,
                node,
                self.config.displacement_warning,
                voxel_displacement,
                self.search.simplex_size
            );
        }

        let estimate = NodeEstimate::Estimated {
            deformation,
            magnitude,
            voxel_displacement,
            evaluations,
        };

        if self.config.smoothing == SmoothingStrategy::LocalAnisotropic && !self.search.is_planar() {
            let shift = voxel_displacement.map(|v| v * self.config.iteration_weight);
            similarity.shift_target(&shift);
            let values = self.stencil(&similarity, &objective, self.search.simplex_size / 2.0);
            let best_objective = values.iter().map(|v| 1.0 - v).fold(f64::INFINITY, f64::min);
            let mut stencil = [0.0; 27];
            stencil.copy_from_slice(&values);
            let curvature = quadratic::principal_directions(&stencil, &self.config.stencil_weights_3d);
            return NodeOutcome {
                estimate,
                curvature: Some(self.curvature_to_world(&curvature)),
                best_objective,
            };
        }

        NodeOutcome::plain(estimate)
    }

    fn neighbourhood(&self, node: [usize; 3], source_node: &Point3, anchor: &Point3, phase: Phase) -> LocalSimilarity<'a> {
        let width = 3.0 * self.search.node_step;
        let offsets = sublattice::spherical_offsets(self.lattice, width, self.config.sublattice_diameter + 1);
        let around_anchor: Vec<Point3> = offsets.iter().map(|o| *anchor + *o).collect();

        let targets = match self.transforms.super_sampled {
            Some(warp) => sublattice::target_lattice_super_sampled(&around_anchor, self.transforms.linear, warp),
            None => sublattice::target_lattice(&around_anchor, self.transforms.full),
        };
        let geometry = self.primary.target.geometry();
        let (voxels, sampling) = if self.config.jitter {
            let mut rng = sublattice::jitter_rng(
                self.config.seed,
                self.iteration,
                phase.code(),
                self.lattice.linear_index(node),
            );
            let voxels = sublattice::to_voxels(&targets, geometry, Some((&mut rng, &self.search.active_dims)));
            (voxels, Interpolation::Nearest)
        } else {
            (sublattice::to_voxels(&targets, geometry, None), Interpolation::Linear)
        };

        // compare the neighbourhood of the node itself against the displaced target
        let shift = *source_node - *anchor;
        let sources: Vec<Point3> = around_anchor.iter().map(|p| *p + shift).collect();
        LocalSimilarity::neighbourhood(self.features, &sources, voxels, sampling)
    }

    /// `1 − r` over the stencil of the active dimensions at `±half` voxels.
    fn stencil(&self, similarity: &LocalSimilarity<'_>, objective: &NodeObjective, half: f64) -> Vec<f64> {
        stencil_offsets(self.search.active_dims.len())
            .iter()
            .map(|cell| {
                let params: Vec<f64> = cell.iter().map(|c| *c as f64).collect();
                1.0 - objective.evaluate(similarity, &self.search.offset(&params, half))
            })
            .collect()
    }

    fn simplex(&self, similarity: &LocalSimilarity<'_>, objective: &NodeObjective) -> ([f64; 3], usize) {
        let dims = self.search.active_dims.len();
        let radius = self.search.search_radius(self.iteration, self.config.iterations);
        let mut optimizer = SimplexOptimizer::new(
            &vec![0.0; dims],
            radius,
            self.config.simplex_tolerance,
            |p: &[f64]| objective.evaluate(similarity, &self.search.offset(p, 1.0)),
        );
        let mut steps = 0;
        while steps < self.config.max_simplex_steps && optimizer.step() {
            steps += 1;
        }
        if steps >= self.config.max_simplex_steps {
            return ([0.0; 3], 0);
        }
        (self.search.offset(optimizer.best_parameters(), 1.0), optimizer.evaluations())
    }

    fn curvature_to_world(&self, curvature: &Curvature) -> Curvature {
        let geometry = self.primary.target.geometry();
        let spacing = geometry.spacing();
        let to_world = |v: &Vector3| -> Vector3 {
            let scaled = Vector3::new(v[0] * spacing[0], v[1] * spacing[1], v[2] * spacing[2]);
            let w = geometry.direction() * scaled;
            let n = w.norm();
            if n > 0.0 {
                w / n * v.norm()
            } else {
                w
            }
        };
        Curvature {
            normal: to_world(&curvature.normal),
            directions: curvature.directions.map(|d| PrincipalDirections {
                k1: d.k1,
                k2: d.k2,
                e1: to_world(&d.e1),
                e2: to_world(&d.e2),
            }),
        }
    }
}
