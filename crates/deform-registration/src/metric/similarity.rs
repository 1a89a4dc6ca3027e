//! Local similarity between a source sub-lattice and a displaced target sub-lattice.
//!
//! Offsets are voxel displacements in the storage order of the primary
//! target volume. The source side is sampled once when the evaluator is
//! built; every call only resamples the target side.

use deform_core::{Geometry, Interpolation, Point3};

use crate::feature::{FeatureSet, ObjectiveKind};

/// Cost assigned to displacements at or beyond the cost radius.
pub const COST_CEILING: f64 = 1e38;

/// Penalty on a voxel displacement: `0.2·v / (R − v)` with `v = |d|³`.
///
/// Zero at the origin, strictly increasing, and `COST_CEILING` once
/// `v ≥ max_radius`.
pub fn displacement_cost(offset: &[f64; 3], max_radius: f64) -> f64 {
    let norm = (offset[0] * offset[0] + offset[1] * offset[1] + offset[2] * offset[2]).sqrt();
    let v = norm * norm * norm;
    if v < max_radius {
        0.2 * v / (max_radius - v)
    } else {
        COST_CEILING
    }
}

#[derive(Debug, Clone)]
struct Neighbourhood {
    /// Source samples per feature.
    source: Vec<Vec<f64>>,
    /// Per-feature normaliser: ‖a‖ for cross-correlation, sample count otherwise.
    normalizers: Vec<f64>,
    /// Target sub-lattice in primary target voxel coordinates.
    target_voxels: Vec<[f64; 3]>,
}

#[derive(Debug, Clone)]
struct Projection {
    source: [f64; 4],
    target_anchor: [f64; 3],
}

#[derive(Debug, Clone)]
enum Samples {
    Neighbourhood(Neighbourhood),
    Projection(Projection),
}

/// Per-node similarity evaluator.
///
/// Owns the node's sample buffers, so evaluators for different nodes can
/// be used from different threads.
#[derive(Debug, Clone)]
pub struct LocalSimilarity<'a> {
    features: &'a FeatureSet,
    samples: Samples,
    total_weight: f64,
    target_sampling: Interpolation,
    same_geometry: Vec<bool>,
}

impl<'a> LocalSimilarity<'a> {
    /// Build a neighbourhood evaluator.
    ///
    /// # Arguments
    /// * `features` - Non-empty feature set
    /// * `source_points` - Source sub-lattice in world coordinates
    /// * `target_voxels` - Matching target sub-lattice in primary target voxel coordinates
    /// * `target_sampling` - How target volumes are sampled
    pub fn neighbourhood(
        features: &'a FeatureSet,
        source_points: &[Point3],
        target_voxels: Vec<[f64; 3]>,
        target_sampling: Interpolation,
    ) -> Self {
        let len = source_points.len();
        let mut source = Vec::with_capacity(features.len());
        let mut normalizers = Vec::with_capacity(features.len());
        for feature in features.iter() {
            let samples: Vec<f64> = source_points
                .iter()
                .map(|p| feature.source.sample_world(p, Interpolation::Linear))
                .collect();
            let normalizer = match feature.objective {
                ObjectiveKind::CrossCorrelation => samples.iter().map(|a| a * a).sum::<f64>().sqrt(),
                _ => len as f64,
            };
            source.push(samples);
            normalizers.push(normalizer);
        }
        Self::with_samples(
            features,
            Samples::Neighbourhood(Neighbourhood {
                source,
                normalizers,
                target_voxels,
            }),
            target_sampling,
        )
    }

    /// Build a projection evaluator from value and gradient features (0..3).
    ///
    /// # Arguments
    /// * `features` - At least four features: value, d/dx, d/dy, d/dz
    /// * `source_anchor` - Source point in world coordinates
    /// * `target_anchor` - Matching target point in primary target voxel coordinates
    pub fn projection(features: &'a FeatureSet, source_anchor: &Point3, target_anchor: [f64; 3]) -> Self {
        let mut source = [0.0; 4];
        for (i, feature) in features.iter().take(4).enumerate() {
            let v = feature.source.sample_world(source_anchor, Interpolation::Linear);
            source[i] = if i == 0 { v } else { 2.0 * v };
        }
        Self::with_samples(
            features,
            Samples::Projection(Projection {
                source,
                target_anchor,
            }),
            Interpolation::Linear,
        )
    }

    fn with_samples(features: &'a FeatureSet, samples: Samples, target_sampling: Interpolation) -> Self {
        let primary = features.primary().map(|f| f.target.geometry().clone());
        let same_geometry = features
            .iter()
            .map(|f| primary.as_ref() == Some(f.target.geometry()))
            .collect();
        Self {
            features,
            samples,
            total_weight: features.total_weight(),
            target_sampling,
            same_geometry,
        }
    }

    fn primary_geometry(&self) -> Option<&Geometry> {
        self.features.primary().map(|f| f.target.geometry())
    }

    /// Number of source samples.
    pub fn sample_count(&self) -> usize {
        match &self.samples {
            Samples::Neighbourhood(n) => n.target_voxels.len(),
            Samples::Projection(_) => 1,
        }
    }

    /// Move the target sub-lattice by a voxel offset.
    pub fn shift_target(&mut self, offset: &[f64; 3]) {
        match &mut self.samples {
            Samples::Neighbourhood(n) => {
                for v in n.target_voxels.iter_mut() {
                    for d in 0..3 {
                        v[d] += offset[d];
                    }
                }
            }
            Samples::Projection(p) => {
                for d in 0..3 {
                    p.target_anchor[d] += offset[d];
                }
            }
        }
    }

    /// Sample target feature `i` at a primary-target voxel position.
    fn sample_target(&self, i: usize, voxel: [f64; 3], mode: Interpolation) -> f64 {
        let Some(feature) = self.features.get(i) else {
            return 0.0;
        };
        if self.same_geometry[i] {
            return feature.target.sample_index(voxel, mode);
        }
        match self.primary_geometry() {
            Some(primary) => feature.target.sample_world(&primary.index_to_world(voxel), mode),
            None => 0.0,
        }
    }

    /// Similarity at a voxel offset; higher is more similar.
    ///
    /// Neighbourhood mode combines per-feature scores by weight. Projection mode
    /// returns the normalized dot product of the value/gradient 4-vectors, or 0 if
    /// either vector vanishes.
    pub fn similarity(&self, offset: &[f64; 3]) -> f64 {
        match &self.samples {
            Samples::Neighbourhood(n) => {
                if self.total_weight == 0.0 {
                    return 0.0;
                }
                let shifted: Vec<[f64; 3]> = n
                    .target_voxels
                    .iter()
                    .map(|v| [v[0] + offset[0], v[1] + offset[1], v[2] + offset[2]])
                    .collect();
                let mut total = 0.0;
                for (i, feature) in self.features.iter().enumerate() {
                    let source = &n.source[i];
                    let target = shifted.iter().map(|v| self.sample_target(i, *v, self.target_sampling));
                    let score = match feature.objective {
                        ObjectiveKind::CrossCorrelation => {
                            let (mut s12, mut s22) = (0.0, 0.0);
                            for (a, b) in source.iter().zip(target) {
                                s12 += a * b;
                                s22 += b * b;
                            }
                            if n.normalizers[i] == 0.0 || s22 == 0.0 {
                                0.0
                            } else {
                                s12 / (n.normalizers[i] * s22.sqrt())
                            }
                        }
                        ObjectiveKind::Difference => {
                            let ssd: f64 = source.iter().zip(target).map(|(a, b)| (a - b) * (a - b)).sum();
                            if n.normalizers[i] == 0.0 { 0.0 } else { -ssd / n.normalizers[i] }
                        }
                        ObjectiveKind::Label => {
                            let agree = source
                                .iter()
                                .zip(target)
                                .filter(|(a, b)| a.round() == b.round())
                                .count();
                            if n.normalizers[i] == 0.0 { 0.0 } else { agree as f64 / n.normalizers[i] }
                        }
                        ObjectiveKind::MutualInformation => 0.0,
                    };
                    total += feature.weight * score;
                }
                total / self.total_weight
            }
            Samples::Projection(p) => {
                let Some(primary) = self.primary_geometry() else {
                    return 0.0;
                };
                let voxel = [
                    p.target_anchor[0] + offset[0],
                    p.target_anchor[1] + offset[1],
                    p.target_anchor[2] + offset[2],
                ];
                let world = primary.index_to_world(voxel);
                let mut target = [0.0; 4];
                for (i, feature) in self.features.iter().take(4).enumerate() {
                    let v = feature.target.sample_world(&world, Interpolation::Linear);
                    target[i] = if i == 0 { v } else { 2.0 * v };
                }
                let dot: f64 = p.source.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
                let na: f64 = p.source.iter().map(|a| a * a).sum::<f64>().sqrt();
                let nb: f64 = target.iter().map(|b| b * b).sum::<f64>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    0.0
                } else {
                    dot / (na * nb)
                }
            }
        }
    }
}

/// The quantity minimized at a node: `1 − sim·ratio + cost·(1 − ratio)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeObjective {
    /// Similarity/cost trade-off in [0, 1].
    pub ratio: f64,
    /// Cube of the largest tolerated displacement, in voxels³.
    pub cost_radius: f64,
}

impl NodeObjective {
    pub fn new(ratio: f64, cost_radius: f64) -> Self {
        Self { ratio, cost_radius }
    }

    /// Objective at a voxel offset.
    pub fn evaluate(&self, similarity: &LocalSimilarity<'_>, offset: &[f64; 3]) -> f64 {
        let sim = similarity.similarity(offset);
        let cost = displacement_cost(offset, self.cost_radius);
        1.0 - sim * self.ratio + cost * (1.0 - self.ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use deform_core::{AxisOrder, Volume};

    fn geometry() -> Geometry {
        Geometry::axis_aligned([12, 12, 12], Point3::origin(), [1.0; 3], AxisOrder::ZYX).unwrap()
    }

    fn blob() -> Volume {
        Volume::from_fn(geometry(), |p| {
            let d2 = (p.x - 6.0).powi(2) + (p.y - 5.5).powi(2) + (p.z - 6.5).powi(2);
            (100.0 * (-d2 / 8.0).exp()) as f32
        })
    }

    fn points() -> (Vec<Point3>, Vec<[f64; 3]>) {
        let mut world = Vec::new();
        let mut voxels = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    let p = Point3::new(5.0 + k as f64, 4.0 + j as f64, 5.0 + i as f64);
                    voxels.push(geometry().world_to_index(&p));
                    world.push(p);
                }
            }
        }
        (world, voxels)
    }

    #[test]
    fn test_self_correlation_is_one() {
        let set = FeatureSet::single(Feature::new(blob(), blob()));
        let (world, voxels) = points();
        let sim = LocalSimilarity::neighbourhood(&set, &world, voxels, Interpolation::Nearest);
        assert!((sim.similarity(&[0.0; 3]) - 1.0).abs() < 1e-12);
        let shifted = sim.similarity(&[0.0, 0.0, 1.0]);
        assert!(shifted < 1.0 && shifted > -1.0);
    }

    #[test]
    fn test_difference_and_label() {
        let set = FeatureSet::single(Feature::new(blob(), blob()).with_objective(ObjectiveKind::Difference));
        let (world, voxels) = points();
        let sim = LocalSimilarity::neighbourhood(&set, &world, voxels.clone(), Interpolation::Linear);
        assert!(sim.similarity(&[0.0; 3]).abs() < 1e-9);
        assert!(sim.similarity(&[1.0, 0.0, 0.0]) < 0.0);

        let labels = Volume::from_fn(geometry(), |p| if p.x < 6.0 { 1.0 } else { 2.0 });
        let set = FeatureSet::single(Feature::new(labels.clone(), labels).with_objective(ObjectiveKind::Label));
        let sim = LocalSimilarity::neighbourhood(&set, &world, voxels, Interpolation::Nearest);
        assert_eq!(sim.similarity(&[0.0; 3]), 1.0);
        assert!(sim.similarity(&[0.0, 0.0, 2.0]) < 1.0);
    }

    #[test]
    fn test_weighted_combination() {
        let flat = Volume::from_fn(geometry(), |_| 1.0);
        let zero = Volume::zeros(geometry());
        let set = FeatureSet::single(Feature::new(blob(), blob()).with_weight(3.0))
            .with(Feature::new(flat, zero).with_weight(1.0));
        let (world, voxels) = points();
        let sim = LocalSimilarity::neighbourhood(&set, &world, voxels, Interpolation::Nearest);
        // second feature scores 0 against an empty target
        assert!((sim.similarity(&[0.0; 3]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_negative_weight_normalised_by_absolute_sum() {
        let set = FeatureSet::single(Feature::new(blob(), blob()).with_weight(2.0))
            .with(Feature::new(blob(), blob()).with_weight(-1.0));
        let (world, voxels) = points();
        let sim = LocalSimilarity::neighbourhood(&set, &world, voxels, Interpolation::Nearest);
        // (2·1 − 1·1) / (|2| + |−1|)
        assert!((sim.similarity(&[0.0; 3]) - 1.0 / 3.0).abs() < 1e-12);
        let shifted = sim.similarity(&[0.0, 1.0, 0.0]);
        assert!((-1.0..=1.0).contains(&shifted));
    }

    #[test]
    fn test_projection_mode() {
        let value = blob();
        let dx = Volume::from_fn(geometry(), |p| (p.x - 6.0) as f32);
        let dy = Volume::from_fn(geometry(), |p| (p.y - 5.5) as f32);
        let dz = Volume::from_fn(geometry(), |p| (p.z - 6.5) as f32);
        let set = FeatureSet::single(Feature::new(value.clone(), value))
            .with(Feature::new(dx.clone(), dx))
            .with(Feature::new(dy.clone(), dy))
            .with(Feature::new(dz.clone(), dz));
        let anchor = Point3::new(4.0, 5.0, 6.0);
        let sim = LocalSimilarity::projection(&set, &anchor, geometry().world_to_index(&anchor));
        assert!((sim.similarity(&[0.0; 3]) - 1.0).abs() < 1e-9);

        let empty = Volume::zeros(geometry());
        let set = FeatureSet::single(Feature::new(empty.clone(), empty.clone()))
            .with(Feature::new(empty.clone(), empty.clone()))
            .with(Feature::new(empty.clone(), empty.clone()))
            .with(Feature::new(empty.clone(), empty));
        let sim = LocalSimilarity::projection(&set, &anchor, [4.0, 5.0, 6.0]);
        assert_eq!(sim.similarity(&[0.0; 3]), 0.0);
    }

    #[test]
    fn test_cost_monotone_and_bounded() {
        let radius = 8.0;
        assert_eq!(displacement_cost(&[0.0; 3], radius), 0.0);
        let mut last = 0.0;
        for step in 1..20 {
            let r = step as f64 * 0.1;
            let c = displacement_cost(&[r, 0.0, 0.0], radius);
            assert!(c > last);
            last = c;
        }
        // approaching the radius the cost dominates any similarity in [-1, 1]
        assert!(displacement_cost(&[1.999, 0.0, 0.0], radius) > 2.0);
        assert_eq!(displacement_cost(&[2.0, 0.0, 0.0], radius), COST_CEILING);
    }

    #[test]
    fn test_objective_prefers_zero_for_identical_data() {
        let set = FeatureSet::single(Feature::new(blob(), blob()));
        let (world, voxels) = points();
        let sim = LocalSimilarity::neighbourhood(&set, &world, voxels, Interpolation::Linear);
        let objective = NodeObjective::new(0.5, 8.0);
        let at_zero = objective.evaluate(&sim, &[0.0; 3]);
        assert!((at_zero - 0.5).abs() < 1e-12);
        assert!(objective.evaluate(&sim, &[0.3, -0.2, 0.1]) > at_zero);
    }
}
