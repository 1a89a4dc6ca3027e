//! Error types for deformation estimation.
//!
//! Only conditions that abort a whole run are errors. A node that cannot be
//! estimated is reported through [`crate::nonlinear::NodeEstimate`] instead.

use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The transform to refine does not end with a deformation grid.
    #[error("No non-linear deformation to optimize: {0}")]
    MissingDeformation(String),

    /// Absolute feature weights sum to zero.
    #[error("Absolute feature weights sum to zero")]
    ZeroFeatureWeight,

    /// A data volume has a zero step along some axis.
    #[error("Zero step size in data volume: {0}")]
    ZeroStepSize(String),

    /// The objective kind cannot be evaluated at lattice nodes.
    #[error("Unsupported objective function: {0}")]
    UnsupportedObjective(String),

    /// Anisotropic smoothing was requested on a 2D lattice.
    #[error("Anisotropic smoothing is not supported for 2D deformation lattices")]
    UnsupportedAnisotropic2D,

    /// No features were supplied.
    #[error("Feature set is empty")]
    NoFeatures,

    /// Intensity threshold is unusable.
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The run was cancelled from outside.
    #[error("Registration cancelled after {iterations_completed} iteration(s)")]
    Cancelled { iterations_completed: usize },

    /// Geometry or transform failure from the core crate.
    #[error(transparent)]
    Core(#[from] deform_core::CoreError),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a missing deformation error.
    pub fn missing_deformation(msg: impl Into<String>) -> Self {
        Self::MissingDeformation(msg.into())
    }

    /// Create a zero step size error.
    pub fn zero_step_size(msg: impl Into<String>) -> Self {
        Self::ZeroStepSize(msg.into())
    }

    /// Create an unsupported objective error.
    pub fn unsupported_objective(msg: impl Into<String>) -> Self {
        Self::UnsupportedObjective(msg.into())
    }

    /// Create an invalid threshold error.
    pub fn invalid_threshold(msg: impl Into<String>) -> Self {
        Self::InvalidThreshold(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RegistrationError::missing_deformation("last transform is affine");
        assert!(matches!(err, RegistrationError::MissingDeformation(_)));
    }

    #[test]
    fn test_error_display() {
        let err = RegistrationError::invalid_configuration("smoothing weight 1.5");
        assert_eq!(err.to_string(), "Invalid configuration: smoothing weight 1.5");
        assert_eq!(
            RegistrationError::Cancelled { iterations_completed: 2 }.to_string(),
            "Registration cancelled after 2 iteration(s)"
        );
    }

    #[test]
    fn test_core_error_conversion() {
        let core = deform_core::CoreError::invalid_geometry("empty axis");
        let err: RegistrationError = core.into();
        assert!(err.to_string().contains("empty axis"));
    }
}
