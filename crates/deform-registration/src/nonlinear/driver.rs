//! Iteration driver for non-linear deformation estimation.
//!
//! Each iteration sweeps the deformation lattice, folds the node estimates
//! into the field, re-estimates nodes whose displacement stands out, and
//! folds again. The field inside the caller's [`TransformChain`] is only
//! written between sweeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deform_core::{
    point_not_masked, DeformationField, Geometry, Interpolation, TransformChain, Vector3,
};
use rayon::prelude::*;

use crate::config::{NonlinearConfig, SmoothingStrategy};
use crate::error::{RegistrationError, Result};
use crate::feature::{Feature, FeatureSet};
use crate::metric::{cross_correlation_objective, SamplingLattice};
use crate::progress::{ConsoleProgressCallback, IterationReport, ProgressCallback, ProgressTracker};
use crate::stats::RunStatistics;
use crate::validation;

use super::node::{NodeEstimate, NodeEstimator, NodeOutcome, Phase, SearchGeometry, SweepTransforms};
use super::quadratic::Curvature;
use super::smoothing::{
    anisotropic_blend, extrapolate_unestimated, isotropic_blend, reestimate_increment, smooth_field,
    ConfidenceConstants,
};

/// Estimates above this fraction of the lattice step count as "over".
const OVER_FRACTION: f64 = 0.95;

/// What a finished run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSummary {
    pub iterations: usize,
    pub reports: Vec<IterationReport>,
    pub initial_similarity: Option<f64>,
    pub final_similarity: Option<f64>,
    pub elapsed: Duration,
}

/// A node the sweep estimated, with the neighbour mean it was estimated against.
#[derive(Debug, Clone, Copy)]
struct Visit {
    linear: usize,
    outcome: NodeOutcome,
    neighbour_mean: Vector3,
}

/// Per-iteration scratch volumes.
struct Scratch {
    additional: DeformationField,
    magnitudes: Vec<f64>,
    estimated: Vec<bool>,
}

impl Scratch {
    fn new(lattice: &Geometry) -> Self {
        Self {
            additional: DeformationField::zeros(lattice.clone()),
            magnitudes: vec![0.0; lattice.len()],
            estimated: vec![false; lattice.len()],
        }
    }
}

/// Non-linear deformation estimation over a lattice of control nodes.
pub struct NonlinearRegistration {
    config: NonlinearConfig,
    progress: ProgressTracker,
    cancel: Option<Arc<AtomicBool>>,
    confidence: ConfidenceConstants,
}

impl NonlinearRegistration {
    /// Create a run that logs every iteration to the console.
    pub fn new(config: NonlinearConfig) -> Self {
        let progress = ProgressTracker::new().with_callback(Arc::new(ConsoleProgressCallback::new(1)));
        Self {
            config,
            progress,
            cancel: None,
            confidence: ConfidenceConstants::default(),
        }
    }

    /// Replace the progress tracker.
    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// Add a progress callback.
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress.add_callback(callback);
        self
    }

    /// Stop between nodes once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &NonlinearConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Refine the deformation at the end of `transform` so that `features` align.
    ///
    /// # Errors
    /// Configuration and feature problems are reported before any node is
    /// visited. `Cancelled` leaves the field as composed by the last
    /// finished phase.
    pub fn execute(&self, features: &FeatureSet, transform: &mut TransformChain) -> Result<RegistrationSummary> {
        match self.run(features, transform) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.progress.error(&err.to_string());
                Err(err)
            }
        }
    }

    fn run(&self, features: &FeatureSet, transform: &mut TransformChain) -> Result<RegistrationSummary> {
        let config = &self.config;
        config.validate()?;
        validation::validate_features(features, config)?;

        let (linear, lattice) = match transform.split_nonlinear() {
            Some((linear, grid)) => (linear, grid.field().geometry().clone()),
            None => {
                return Err(RegistrationError::missing_deformation(
                    "the transform does not end with a deformation grid",
                ))
            }
        };
        validation::validate_smoothing(config, &lattice.degenerate_axes())?;
        let primary = features.primary().ok_or(RegistrationError::NoFeatures)?;
        let search = SearchGeometry::new(&lattice, primary.target.geometry())?;

        if search.simplex_size < 1.0 {
            tracing::warn!(
                "Lattice step {:.3} is finer than the data spacing {:.3}; the local search cannot resolve it",
                search.node_step,
                primary.target.geometry().max_abs_spacing()
            );
        }

        let start = Instant::now();
        let sampling = SamplingLattice::over(primary.source.geometry(), 1);
        let initial_similarity = if config.report_similarity {
            Some(self.whole_volume_similarity(primary, transform, &sampling))
        } else {
            None
        };
        self.progress.start(initial_similarity);

        let total = config.iterations;
        let mut reports = Vec::with_capacity(total);
        let mut scratch = Scratch::new(&lattice);

        for iteration in 0..total {
            if self.cancelled() {
                return Err(RegistrationError::Cancelled {
                    iterations_completed: iteration,
                });
            }
            let report = self.iterate(
                features,
                primary,
                transform,
                &linear,
                &lattice,
                &search,
                &mut scratch,
                iteration,
            )?;
            let similarity = if config.report_similarity {
                Some(self.whole_volume_similarity(primary, transform, &sampling))
            } else {
                None
            };
            let report = IterationReport {
                similarity,
                elapsed: start.elapsed(),
                ..report
            };
            self.progress.iteration(&report);
            if config.snapshot_each_iteration {
                self.progress.snapshot(iteration, transform);
            }
            reports.push(report);
        }

        let elapsed = start.elapsed();
        self.progress.complete(total, elapsed);
        let final_similarity = reports.last().and_then(|r| r.similarity).or(initial_similarity);
        Ok(RegistrationSummary {
            iterations: total,
            reports,
            initial_similarity,
            final_similarity,
            elapsed,
        })
    }

    fn whole_volume_similarity(&self, primary: &Feature, transform: &TransformChain, sampling: &SamplingLattice) -> f64 {
        cross_correlation_objective(
            primary,
            transform,
            sampling,
            (self.config.source_threshold, self.config.target_threshold),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn iterate(
        &self,
        features: &FeatureSet,
        primary: &Feature,
        transform: &mut TransformChain,
        linear: &TransformChain,
        lattice: &Geometry,
        search: &SearchGeometry,
        scratch: &mut Scratch,
        iteration: usize,
    ) -> Result<IterationReport> {
        let config = &self.config;
        let total = config.iterations;
        let nodes = lattice.nodes_xyz_order();
        scratch.estimated.iter_mut().for_each(|e| *e = false);

        let super_sampled = if config.super_sampling > 1 {
            Some(current_field(transform)?.super_sample(config.super_sampling))
        } else {
            None
        };

        // primary sweep
        let visits = {
            let field = current_field(transform)?;
            let estimator = NodeEstimator::new(
                features,
                config,
                lattice,
                search,
                SweepTransforms {
                    linear,
                    full: transform,
                    super_sampled: super_sampled.as_ref(),
                },
                iteration,
            )?;
            let threshold = config.target_threshold;
            self.sweep(&nodes, iteration, |node| {
                let target = lattice.node_world(node) + field.vector(node);
                if !point_not_masked(primary.target_mask.as_ref(), &target)
                    || primary.target.sample_world(&target, Interpolation::Linear) <= threshold
                {
                    return None;
                }
                let mean_target = field.neighbour_mean_target(node)?;
                Some(Visit {
                    linear: lattice.linear_index(node),
                    outcome: estimator.estimate(node, &mean_target, Phase::Primary),
                    neighbour_mean: mean_target - lattice.node_world(node),
                })
            })?
        };

        let mut stats = RunStatistics::new();
        let (mut tried, mut over, mut evaluations) = (0usize, 0usize, 0usize);
        {
            let field = current_field(transform)?;
            for visit in visits.iter().flatten() {
                let NodeEstimate::Estimated {
                    deformation,
                    magnitude,
                    evaluations: used,
                    ..
                } = visit.outcome.estimate
                else {
                    tried += 1;
                    continue;
                };
                let current = field.vector_at(visit.linear);
                let additional = match config.smoothing {
                    SmoothingStrategy::Global => deformation,
                    SmoothingStrategy::LocalIsotropic => {
                        isotropic_blend(
                            &current,
                            &visit.neighbour_mean,
                            &deformation,
                            config.smoothing_weight,
                            config.iteration_weight,
                        ) - current
                    }
                    SmoothingStrategy::LocalAnisotropic => {
                        let curvature = visit.outcome.curvature.unwrap_or_else(Curvature::flat);
                        anisotropic_blend(
                            &current,
                            &visit.neighbour_mean,
                            &deformation,
                            config.iteration_weight,
                            &curvature,
                            visit.outcome.best_objective,
                            &self.confidence,
                        ) - current
                    }
                };
                scratch.additional.set_vector_at(visit.linear, &additional);
                scratch.magnitudes[visit.linear] = magnitude;
                scratch.estimated[visit.linear] = true;
                stats.tally(magnitude.abs());
                if magnitude.abs() > OVER_FRACTION * search.node_step {
                    over += 1;
                }
                evaluations += used;
            }
        }

        self.compose(transform, scratch, None)?;

        let mean = stats.mean();
        let std = stats.std();
        let outlier_threshold = mean + config.outlier_std_factor * std;
        tracing::debug!(
            "Iteration {}: seen {}, tried {}, done {}, displacement {:.4} +/- {:.4}, max {:.4}, over {}",
            iteration + 1,
            nodes.len(),
            tried,
            stats.count(),
            mean,
            std,
            stats.max(),
            over
        );

        let mut outliers = 0;
        if iteration + 1 < total && stats.count() > 0 {
            scratch.additional.fill_zero();
            // only nodes estimated in the primary sweep can stand out
            let candidates: Vec<[usize; 3]> = nodes
                .iter()
                .copied()
                .filter(|n| {
                    let linear = lattice.linear_index(*n);
                    scratch.estimated[linear] && scratch.magnitudes[linear] > outlier_threshold
                })
                .collect();
            outliers = candidates.len();

            let visits = {
                let field = current_field(transform)?;
                let estimator = NodeEstimator::new(
                    features,
                    config,
                    lattice,
                    search,
                    SweepTransforms {
                        linear,
                        full: transform,
                        super_sampled: super_sampled.as_ref(),
                    },
                    iteration,
                )?;
                self.sweep(&candidates, iteration, |node| {
                    let target = lattice.node_world(node) + field.vector(node);
                    if !point_not_masked(primary.target_mask.as_ref(), &target) {
                        return None;
                    }
                    let mean_target = field.neighbour_mean_target(node)?;
                    Some(Visit {
                        linear: lattice.linear_index(node),
                        outcome: estimator.estimate(node, &mean_target, Phase::Reestimate),
                        neighbour_mean: mean_target - lattice.node_world(node),
                    })
                })?
            };

            {
                let field = current_field(transform)?;
                for visit in visits.iter().flatten() {
                    if let NodeEstimate::Estimated { deformation, .. } = visit.outcome.estimate {
                        let additional = if config.smoothing.is_local() {
                            reestimate_increment(
                                &field.vector_at(visit.linear),
                                &deformation,
                                &visit.neighbour_mean,
                                config.smoothing_weight,
                            )
                        } else {
                            deformation
                        };
                        scratch.additional.set_vector_at(visit.linear, &additional);
                    }
                }
            }
            self.compose(transform, scratch, Some(outlier_threshold))?;
        }

        scratch.additional.fill_zero();
        scratch.magnitudes.iter_mut().for_each(|m| *m = 0.0);

        let done = stats.count();
        Ok(IterationReport {
            iteration,
            total_iterations: total,
            nodes_seen: nodes.len(),
            nodes_tried: tried,
            nodes_done: done,
            nodes_over: over,
            outliers,
            magnitudes: stats,
            mean_evaluations: if done == 0 { 0.0 } else { evaluations as f64 / done as f64 },
            similarity: None,
            elapsed: Duration::ZERO,
        })
    }

    /// Visit `nodes` in order, in parallel when configured.
    fn sweep<F>(&self, nodes: &[[usize; 3]], iteration: usize, visit: F) -> Result<Vec<Option<Visit>>>
    where
        F: Fn([usize; 3]) -> Option<Visit> + Sync,
    {
        let cancel = self.cancel.as_deref();
        let run = |node: &[usize; 3]| -> Result<Option<Visit>> {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(RegistrationError::Cancelled {
                    iterations_completed: iteration,
                });
            }
            Ok(visit(*node))
        };
        if self.config.parallel {
            nodes.par_iter().map(run).collect()
        } else {
            nodes.iter().map(run).collect()
        }
    }

    /// Fold `scratch.additional` into the field.
    ///
    /// Local strategies add it directly, first extending it to unestimated
    /// nodes on the primary pass. The global strategy applies the iteration
    /// weight and blurs the result, restricted to outliers when a threshold
    /// is given.
    fn compose(&self, transform: &mut TransformChain, scratch: &mut Scratch, outlier_threshold: Option<f64>) -> Result<()> {
        let config = &self.config;
        let field = transform.deformation_mut().ok_or_else(missing)?;
        if config.smoothing.is_local() {
            if outlier_threshold.is_none() {
                extrapolate_unestimated(field, &mut scratch.additional, &scratch.estimated);
            }
            field.add_scaled(&scratch.additional, 1.0);
        } else {
            let mut accumulated = field.clone();
            accumulated.add_scaled(&scratch.additional, config.iteration_weight);
            *field = smooth_field(&accumulated, &scratch.magnitudes, outlier_threshold, config.smoothing_weight);
        }
        Ok(())
    }
}

fn missing() -> RegistrationError {
    RegistrationError::missing_deformation("the deformation grid disappeared from the transform")
}

fn current_field(transform: &TransformChain) -> Result<&DeformationField> {
    transform.deformation().ok_or_else(missing)
}
