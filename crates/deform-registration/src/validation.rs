//! Validation utilities for deformation runs.
//!
//! Range checks for configuration values and the start-of-run checks that
//! turn unusable inputs into fatal errors before any node is visited.

use deform_core::SpatialAxis;

use crate::config::{NonlinearConfig, SimilarityMode, SmoothingStrategy};
use crate::error::{RegistrationError, Result};
use crate::feature::{FeatureSet, ObjectiveKind};

/// Number of features projection similarity reads (value and three derivatives).
pub const PROJECTION_FEATURES: usize = 4;

/// Validate that a value lies in `[0, 1]`.
pub fn validate_unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must lie in [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validate that a value is finite and not negative.
pub fn validate_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validate that a value is finite and strictly positive.
pub fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be finite and positive, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validate that a count is at least one.
pub fn validate_count(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be at least 1",
            name
        )));
    }
    Ok(())
}

/// Validate an intensity threshold.
pub fn validate_threshold(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(RegistrationError::invalid_threshold(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validate the feature set against the configuration.
///
/// Fatal conditions: no features, zero absolute weight, an objective that cannot be
/// evaluated at nodes, too few features for projection similarity, and a data
/// volume with a zero step.
pub fn validate_features(features: &FeatureSet, config: &NonlinearConfig) -> Result<()> {
    if features.is_empty() {
        return Err(RegistrationError::NoFeatures);
    }
    if features.total_weight() == 0.0 {
        return Err(RegistrationError::ZeroFeatureWeight);
    }
    for (i, feature) in features.iter().enumerate() {
        if feature.objective == ObjectiveKind::MutualInformation {
            return Err(RegistrationError::unsupported_objective(format!(
                "feature {} uses mutual information, which is only available as a whole-volume objective",
                i
            )));
        }
        for (role, volume) in [("source", &feature.source), ("target", &feature.target)] {
            let spacing = volume.geometry().spacing();
            if spacing.iter().any(|s| *s == 0.0) {
                return Err(RegistrationError::zero_step_size(format!(
                    "feature {} {} volume has spacing {:?}",
                    i, role, spacing
                )));
            }
        }
    }
    if config.similarity == SimilarityMode::Projection && features.len() < PROJECTION_FEATURES {
        return Err(RegistrationError::invalid_configuration(format!(
            "projection similarity needs {} features (value, d/dx, d/dy, d/dz), got {}",
            PROJECTION_FEATURES,
            features.len()
        )));
    }
    Ok(())
}

/// Validate that the smoothing strategy is available for the lattice dimensionality.
pub fn validate_smoothing(config: &NonlinearConfig, degenerate_axes: &[SpatialAxis]) -> Result<()> {
    if config.smoothing == SmoothingStrategy::LocalAnisotropic && !degenerate_axes.is_empty() {
        return Err(RegistrationError::UnsupportedAnisotropic2D);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use deform_core::{AxisOrder, Geometry, Point3, Volume};

    fn volume(spacing: [f64; 3]) -> Volume {
        Volume::zeros(Geometry::axis_aligned([4, 4, 4], Point3::origin(), spacing, AxisOrder::ZYX).unwrap())
    }

    #[test]
    fn test_empty_features() {
        let err = validate_features(&FeatureSet::new(), &NonlinearConfig::default()).unwrap_err();
        assert!(matches!(err, RegistrationError::NoFeatures));
    }

    #[test]
    fn test_zero_weight() {
        let set = FeatureSet::single(Feature::new(volume([1.0; 3]), volume([1.0; 3])).with_weight(0.0));
        let err = validate_features(&set, &NonlinearConfig::default()).unwrap_err();
        assert!(matches!(err, RegistrationError::ZeroFeatureWeight));
    }

    #[test]
    fn test_opposite_weights_are_accepted() {
        let set = FeatureSet::single(Feature::new(volume([1.0; 3]), volume([1.0; 3])).with_weight(1.0))
            .with(Feature::new(volume([1.0; 3]), volume([1.0; 3])).with_weight(-1.0));
        assert_eq!(set.total_weight(), 2.0);
        assert!(validate_features(&set, &NonlinearConfig::default()).is_ok());
    }

    #[test]
    fn test_mutual_information_rejected() {
        let set = FeatureSet::single(
            Feature::new(volume([1.0; 3]), volume([1.0; 3])).with_objective(ObjectiveKind::MutualInformation),
        );
        let err = validate_features(&set, &NonlinearConfig::default()).unwrap_err();
        assert!(matches!(err, RegistrationError::UnsupportedObjective(_)));
    }

    #[test]
    fn test_zero_step() {
        let set = FeatureSet::single(Feature::new(volume([1.0; 3]), volume([0.0, 1.0, 1.0])));
        let err = validate_features(&set, &NonlinearConfig::default()).unwrap_err();
        assert!(matches!(err, RegistrationError::ZeroStepSize(_)));
    }

    #[test]
    fn test_projection_needs_derivatives() {
        let set = FeatureSet::single(Feature::new(volume([1.0; 3]), volume([1.0; 3])));
        let config = NonlinearConfig::default().with_similarity(SimilarityMode::Projection);
        assert!(validate_features(&set, &config).is_err());
    }

    #[test]
    fn test_anisotropic_2d_rejected() {
        let config = NonlinearConfig::default().with_smoothing(SmoothingStrategy::LocalAnisotropic);
        let err = validate_smoothing(&config, &[SpatialAxis::Z]).unwrap_err();
        assert!(matches!(err, RegistrationError::UnsupportedAnisotropic2D));
        assert!(validate_smoothing(&config, &[]).is_ok());
    }
}
