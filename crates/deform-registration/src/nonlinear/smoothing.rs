//! Folding node estimates into the deformation field.
//!
//! Local strategies blend each node as it is estimated; the global strategy
//! accumulates estimates and then blurs the whole field.

use deform_core::{DeformationField, Vector3};

use super::quadratic::{perpendicular_pair, Curvature, NORMAL_EPSILON};

/// Curvature assumed along both directions when only the normal is known.
pub const K_MEAN: f64 = 2.0;

/// Constants of the anisotropic confidence `c = |k| / (A + B·Smin + C·|k|)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceConstants {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for ConfidenceConstants {
    fn default() -> Self {
        Self {
            a: K_MEAN,
            b: 0.0,
            c: 0.0,
        }
    }
}

impl ConfidenceConstants {
    pub fn confidence(&self, curvature: f64, best_objective: f64) -> f64 {
        curvature.abs() / (self.a + self.b * best_objective + self.c * curvature.abs())
    }
}

/// `(1 − sw)(previous + iw·additional) + sw·mean`.
pub fn isotropic_blend(
    previous: &Vector3,
    neighbour_mean: &Vector3,
    additional: &Vector3,
    smoothing_weight: f64,
    iteration_weight: f64,
) -> Vector3 {
    (previous + additional * iteration_weight) * (1.0 - smoothing_weight) + neighbour_mean * smoothing_weight
}

/// Blend toward the neighbour mean, keeping the part of the update that lies
/// along the principal curvature directions in proportion to their confidence.
///
/// Without directions the node takes the neighbour mean if the normal is
/// undefined, and otherwise uses two directions perpendicular to the normal
/// with curvature [`K_MEAN`].
pub fn anisotropic_blend(
    previous: &Vector3,
    neighbour_mean: &Vector3,
    additional: &Vector3,
    iteration_weight: f64,
    curvature: &Curvature,
    best_objective: f64,
    constants: &ConfidenceConstants,
) -> Vector3 {
    let (k1, k2, e1, e2) = match curvature.directions {
        Some(d) => (d.k1, d.k2, d.e1, d.e2),
        None if curvature.normal.norm_squared() < NORMAL_EPSILON => return *neighbour_mean,
        None => {
            let (e1, e2) = perpendicular_pair(&curvature.normal);
            (K_MEAN, K_MEAN, e1, e2)
        }
    };
    let c1 = constants.confidence(k1, best_objective);
    let c2 = constants.confidence(k2, best_objective);
    let diff = previous + additional * iteration_weight - neighbour_mean;
    neighbour_mean + e1 * (c1 / (1.0 + c1) * diff.dot(&e1)) + e2 * (c2 / (1.0 + c2) * diff.dot(&e2))
}

/// `(1 − sw)(current + estimate) + sw·mean − current`: the increment that
/// moves an outlier node to its re-estimated, smoothed value.
pub fn reestimate_increment(
    current: &Vector3,
    estimate: &Vector3,
    neighbour_mean: &Vector3,
    smoothing_weight: f64,
) -> Vector3 {
    (current + estimate) * (1.0 - smoothing_weight) + neighbour_mean * smoothing_weight - current
}

/// For every node without an estimate, set `additional` to the step that
/// moves `current` to the mean of its neighbours.
pub fn extrapolate_unestimated(current: &DeformationField, additional: &mut DeformationField, estimated: &[bool]) {
    let geometry = current.geometry().clone();
    for (linear, done) in estimated.iter().enumerate() {
        if *done {
            continue;
        }
        let index = geometry.index_of(linear);
        let step = match current.neighbour_mean(index) {
            Some(mean) => mean - current.vector_at(linear),
            None => Vector3::zeros(),
        };
        additional.set_vector_at(linear, &step);
    }
}

/// Blur a field: each selected node becomes `(1 − sw)·v + sw·(mean of its
/// face neighbours)`; other nodes are copied. With a threshold, only nodes
/// whose magnitude exceeds it are selected.
pub fn smooth_field(
    field: &DeformationField,
    magnitudes: &[f64],
    threshold: Option<f64>,
    smoothing_weight: f64,
) -> DeformationField {
    let mut smoothed = field.clone();
    let geometry = field.geometry();
    for linear in 0..geometry.len() {
        let selected = match threshold {
            Some(t) => magnitudes.get(linear).is_some_and(|m| *m > t),
            None => true,
        };
        if !selected {
            continue;
        }
        if let Some(mean) = field.neighbour_mean(geometry.index_of(linear)) {
            let v = field.vector_at(linear) * (1.0 - smoothing_weight) + mean * smoothing_weight;
            smoothed.set_vector_at(linear, &v);
        }
    }
    smoothed
}
