//! Whole-volume normalized cross-correlation.

use deform_core::{point_not_masked, Interpolation, Transform};

use crate::feature::Feature;
use crate::metric::sampling::SamplingLattice;

/// Cross-correlation between a feature's source and its target under `transform`.
///
/// Each lattice point in source space contributes when it passes the source
/// mask and threshold, and its mapped point passes the target mask and
/// threshold. Returns `Σab / sqrt(Σa² Σb²)`, or 0 when nothing contributes.
///
/// # Arguments
/// * `feature` - Source/target pair with optional masks
/// * `transform` - Maps source world points to target world points
/// * `lattice` - Sample points in source world space
/// * `thresholds` - Source and target intensities a sample must exceed
pub fn cross_correlation_objective(
    feature: &Feature,
    transform: &impl Transform,
    lattice: &SamplingLattice,
    thresholds: (f64, f64),
) -> f64 {
    let (mut s11, mut s22, mut s12) = (0.0, 0.0, 0.0);
    for p in lattice.points() {
        if !point_not_masked(feature.source_mask.as_ref(), &p) {
            continue;
        }
        let a = feature.source.sample_world(&p, Interpolation::Linear);
        if a <= thresholds.0 {
            continue;
        }
        let q = transform.transform_point(&p);
        if !point_not_masked(feature.target_mask.as_ref(), &q) {
            continue;
        }
        let b = feature.target.sample_world(&q, Interpolation::Linear);
        if b <= thresholds.1 {
            continue;
        }
        s11 += a * a;
        s22 += b * b;
        s12 += a * b;
    }
    if s11 == 0.0 || s22 == 0.0 {
        0.0
    } else {
        s12 / (s11 * s22).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deform_core::{AffineTransform, AxisOrder, Geometry, Point3, Vector3, Volume};

    fn geometry() -> Geometry {
        Geometry::axis_aligned([10, 10, 10], Point3::origin(), [1.0; 3], AxisOrder::ZYX).unwrap()
    }

    fn blob(cx: f64) -> Volume {
        Volume::from_fn(geometry(), |p| {
            let d2 = (p.x - cx).powi(2) + (p.y - 4.5).powi(2) + (p.z - 4.5).powi(2);
            (1.0 + 50.0 * (-d2 / 6.0).exp()) as f32
        })
    }

    #[test]
    fn test_identity_correlation() {
        let feature = Feature::new(blob(4.5), blob(4.5));
        let lattice = SamplingLattice::over(&geometry(), 1);
        let c = cross_correlation_objective(&feature, &AffineTransform::identity(), &lattice, (0.0, 0.0));
        assert!((c - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_translation_recovers_alignment() {
        let feature = Feature::new(blob(4.0), blob(5.0));
        let lattice = SamplingLattice::over(&geometry(), 1);
        let misaligned = cross_correlation_objective(&feature, &AffineTransform::identity(), &lattice, (0.0, 0.0));
        let aligned = cross_correlation_objective(
            &feature,
            &AffineTransform::from_translation(Vector3::new(1.0, 0.0, 0.0)),
            &lattice,
            (0.0, 0.0),
        );
        assert!(aligned > misaligned);
    }

    #[test]
    fn test_nothing_above_threshold() {
        let feature = Feature::new(blob(4.5), blob(4.5));
        let lattice = SamplingLattice::over(&geometry(), 1);
        let c = cross_correlation_objective(&feature, &AffineTransform::identity(), &lattice, (1e6, 0.0));
        assert_eq!(c, 0.0);
    }
}
