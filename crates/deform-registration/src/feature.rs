//! The data that drives similarity: paired source/target volumes.

use burn::tensor::backend::Backend;
use deform_core::{Image, Volume};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a feature's samples are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Normalized cross-correlation.
    CrossCorrelation,
    /// Negative mean squared intensity difference.
    Difference,
    /// Fraction of samples whose rounded labels agree.
    Label,
    /// Mutual information; whole-volume only.
    MutualInformation,
}

/// One source/target pair with optional masks.
#[derive(Debug, Clone)]
pub struct Feature {
    pub source: Volume,
    pub target: Volume,
    pub source_mask: Option<Volume>,
    pub target_mask: Option<Volume>,
    pub weight: f64,
    pub objective: ObjectiveKind,
}

impl Feature {
    /// A cross-correlation feature of weight 1.
    pub fn new(source: Volume, target: Volume) -> Self {
        Self {
            source,
            target,
            source_mask: None,
            target_mask: None,
            weight: 1.0,
            objective: ObjectiveKind::CrossCorrelation,
        }
    }

    /// Build a feature from two tensor-backed images.
    pub fn from_images<B: Backend>(source: &Image<B>, target: &Image<B>) -> Result<Self> {
        Ok(Self::new(Volume::from_image(source)?, Volume::from_image(target)?))
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_objective(mut self, objective: ObjectiveKind) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_source_mask(mut self, mask: Volume) -> Self {
        self.source_mask = Some(mask);
        self
    }

    pub fn with_target_mask(mut self, mask: Volume) -> Self {
        self.target_mask = Some(mask);
        self
    }
}

/// Ordered list of features; the first one gates which nodes are visited.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(feature: Feature) -> Self {
        Self {
            features: vec![feature],
        }
    }

    pub fn with(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    /// The feature used for thresholds, masks and geometry.
    pub fn primary(&self) -> Option<&Feature> {
        self.features.first()
    }

    /// Sum of absolute weights; similarity is normalised by it.
    pub fn total_weight(&self) -> f64 {
        self.features.iter().map(|f| f.weight.abs()).sum()
    }
}
