//! Partial-volume interpolation and joint histograms for mutual information.
//!
//! Rather than binning one interpolated value, each sample spreads its
//! trilinear weights over the bins of the eight enclosing voxels.

use deform_core::Volume;

/// The eight corners enclosing a point and their trilinear weights.
///
/// Corners are ordered with the first storage index slowest:
/// `(i0, i1, i2), (i0, i1, i2+1), (i0, i1+1, i2), ... (i0+1, i1+1, i2+1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialVolumeSample {
    pub values: [f64; 8],
    pub weights: [f64; 8],
    /// The trilinearly interpolated value.
    pub value: f64,
}

/// Partial-volume interpolation at a continuous storage index.
///
/// # Returns
/// `None` when any coordinate is negative or not below `size - 1`.
pub fn partial_volume_interpolation(volume: &Volume, voxel: [f64; 3]) -> Option<PartialVolumeSample> {
    let shape = volume.geometry().shape();
    for d in 0..3 {
        if !(voxel[d] >= 0.0 && voxel[d] < shape[d] as f64 - 1.0) {
            return None;
        }
    }
    let base = [voxel[0] as usize, voxel[1] as usize, voxel[2] as usize];
    let f = [
        voxel[0] - base[0] as f64,
        voxel[1] - base[1] as f64,
        voxel[2] - base[2] as f64,
    ];
    let r = [1.0 - f[0], 1.0 - f[1], 1.0 - f[2]];

    let mut values = [0.0; 8];
    let mut weights = [0.0; 8];
    for corner in 0..8 {
        let bits = [(corner >> 2) & 1, (corner >> 1) & 1, corner & 1];
        let index = [base[0] + bits[0], base[1] + bits[1], base[2] + bits[2]];
        values[corner] = volume.value(index) as f64;
        weights[corner] = (0..3)
            .map(|d| if bits[d] == 1 { f[d] } else { r[d] })
            .product();
    }
    let value = values.iter().zip(weights.iter()).map(|(v, w)| v * w).sum();
    Some(PartialVolumeSample {
        values,
        weights,
        value,
    })
}

/// Joint intensity histogram with its two marginals.
#[derive(Debug, Clone, PartialEq)]
pub struct JointHistogram {
    bins: usize,
    joint: Vec<f64>,
    first: Vec<f64>,
    second: Vec<f64>,
    samples: usize,
}

impl JointHistogram {
    /// Create an empty `bins × bins` histogram.
    pub fn new(bins: usize) -> Self {
        let bins = bins.max(1);
        Self {
            bins,
            joint: vec![0.0; bins * bins],
            first: vec![0.0; bins],
            second: vec![0.0; bins],
            samples: 0,
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Number of accumulated sample pairs.
    pub fn samples(&self) -> usize {
        self.samples
    }

    fn bin(&self, value: f64) -> usize {
        (value.round().max(0.0) as usize).min(self.bins - 1)
    }

    /// Spread one pair of partial-volume samples over the histogram.
    pub fn accumulate(&mut self, a: &PartialVolumeSample, b: &PartialVolumeSample) {
        let ia: Vec<usize> = a.values.iter().map(|v| self.bin(*v)).collect();
        let ib: Vec<usize> = b.values.iter().map(|v| self.bin(*v)).collect();
        for i in 0..8 {
            self.first[ia[i]] += a.weights[i];
            self.second[ib[i]] += b.weights[i];
        }
        for i in 0..8 {
            for j in 0..8 {
                self.joint[ia[i] * self.bins + ib[j]] += a.weights[i] * b.weights[j];
            }
        }
        self.samples += 1;
    }

    /// Accumulated joint weight of bin pair `(i, j)`.
    pub fn joint(&self, i: usize, j: usize) -> f64 {
        self.joint[i * self.bins + j]
    }

    /// Negative mutual information, `−Σ p_ij log(p_ij / (p_i p_j))`, normalized by
    /// the sample count. Zero for an empty histogram.
    pub fn negative_mutual_information(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let n = self.samples as f64;
        let mut mi = 0.0;
        for i in 0..self.bins {
            let pi = self.first[i] / n;
            if pi <= 0.0 {
                continue;
            }
            for j in 0..self.bins {
                let pj = self.second[j] / n;
                let pij = self.joint(i, j) / n;
                if pj > 0.0 && pij > 0.0 {
                    mi += pij * (pij / (pi * pj)).ln();
                }
            }
        }
        -mi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deform_core::{AxisOrder, Geometry, Point3};

    fn ramp() -> Volume {
        let g = Geometry::axis_aligned([4, 4, 4], Point3::origin(), [1.0; 3], AxisOrder::ZYX).unwrap();
        Volume::from_fn(g, |p| (p.x + 4.0 * p.y + 16.0 * p.z) as f32)
    }

    #[test]
    fn test_integer_corner_is_one_hot() {
        let vol = ramp();
        let s = partial_volume_interpolation(&vol, [1.0, 2.0, 0.0]).unwrap();
        assert_eq!(s.weights[0], 1.0);
        assert!(s.weights[1..].iter().all(|w| *w == 0.0));
        assert_eq!(s.value, vol.value([1, 2, 0]) as f64);
    }

    #[test]
    fn test_weights_partition_unity() {
        let vol = ramp();
        for coord in [[0.25, 1.5, 2.75], [2.999, 0.001, 1.0], [0.5, 0.5, 0.5]] {
            let s = partial_volume_interpolation(&vol, coord).unwrap();
            let total: f64 = s.weights.iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_interpolated_value() {
        let vol = ramp();
        let s = partial_volume_interpolation(&vol, [0.5, 1.25, 2.0]).unwrap();
        // z = 0.5, y = 1.25, x = 2.0
        assert!((s.value - (2.0 + 5.0 + 8.0)).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_bounds() {
        let vol = ramp();
        assert!(partial_volume_interpolation(&vol, [-0.1, 0.0, 0.0]).is_none());
        assert!(partial_volume_interpolation(&vol, [3.0, 0.0, 0.0]).is_none());
        assert!(partial_volume_interpolation(&vol, [2.99, 0.0, 0.0]).is_some());
    }

    #[test]
    fn test_identical_samples_fill_diagonal() {
        let vol = ramp();
        let mut hist = JointHistogram::new(64);
        for coord in [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.5, 2.0, 1.0]] {
            let s = partial_volume_interpolation(&vol, coord).unwrap();
            hist.accumulate(&s, &s);
        }
        assert_eq!(hist.samples(), 3);
        assert!(hist.joint(0, 0) > 0.0);
        assert!(hist.joint(21, 21) > 0.0);
        assert_eq!(hist.joint(0, 21), 0.0);
        assert!(hist.negative_mutual_information() < 0.0);
    }
}
