//! Mutual information metric implementation.

use deform_core::{point_not_masked, Transform};

use crate::feature::Feature;
use crate::metric::histogram::{partial_volume_interpolation, JointHistogram};
use crate::metric::sampling::SamplingLattice;

/// Mutual information over a partial-volume joint histogram.
///
/// Intensities are binned by rounding, so volumes are expected to hold
/// small non-negative integers such as label or quantized images. Values
/// outside `[0, bins)` fall into the end bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutualInformation {
    bins: usize,
}

impl Default for MutualInformation {
    fn default() -> Self {
        Self { bins: 256 }
    }
}

impl MutualInformation {
    /// Create a new mutual information metric.
    ///
    /// # Arguments
    /// * `bins` - Histogram bins per image (default: 256)
    pub fn new(bins: usize) -> Self {
        Self { bins: bins.max(1) }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Build the joint histogram of a feature under `transform`.
    ///
    /// A lattice point contributes when it passes the source mask, lies
    /// inside the source volume with a value above `thresholds.0`, and its
    /// mapped point does the same in the target with `thresholds.1`.
    pub fn histogram(
        &self,
        feature: &Feature,
        transform: &impl Transform,
        lattice: &SamplingLattice,
        thresholds: (f64, f64),
    ) -> JointHistogram {
        let mut hist = JointHistogram::new(self.bins);
        for p in lattice.points() {
            if !point_not_masked(feature.source_mask.as_ref(), &p) {
                continue;
            }
            let Some(a) = partial_volume_interpolation(&feature.source, feature.source.geometry().world_to_index(&p))
            else {
                continue;
            };
            if a.value <= thresholds.0 {
                continue;
            }
            let q = transform.transform_point(&p);
            if !point_not_masked(feature.target_mask.as_ref(), &q) {
                continue;
            }
            let Some(b) = partial_volume_interpolation(&feature.target, feature.target.geometry().world_to_index(&q))
            else {
                continue;
            };
            if b.value <= thresholds.1 {
                continue;
            }
            hist.accumulate(&a, &b);
        }
        hist
    }

    /// Negative mutual information; lower is better, 0 when no sample contributes.
    pub fn evaluate(
        &self,
        feature: &Feature,
        transform: &impl Transform,
        lattice: &SamplingLattice,
        thresholds: (f64, f64),
    ) -> f64 {
        self.histogram(feature, transform, lattice, thresholds)
            .negative_mutual_information()
    }
}
