//! Point sampling on storage-ordered lattices.
//!
//! Coordinates are continuous voxel indices in storage order. A sample is
//! inside the lattice when every coordinate lies in `[-0.5, n - 0.5]`; linear
//! sampling clamps to the edge voxels inside that band.

use serde::{Deserialize, Serialize};

/// Interpolation mode for point sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Value of the closest voxel.
    Nearest,
    /// Trilinear blend of the eight enclosing voxels.
    #[default]
    Linear,
}

/// Linear offset of a storage index.
#[inline]
pub fn linear_index(shape: [usize; 3], index: [usize; 3]) -> usize {
    (index[0] * shape[1] + index[1]) * shape[2] + index[2]
}

/// Whether a continuous storage index lies inside the lattice band.
#[inline]
pub fn contains(shape: [usize; 3], voxel: [f64; 3]) -> bool {
    (0..3).all(|d| voxel[d] >= -0.5 && voxel[d] <= shape[d] as f64 - 0.5)
}

/// Nearest storage index, if inside the lattice.
pub fn nearest_index(shape: [usize; 3], voxel: [f64; 3]) -> Option<[usize; 3]> {
    if !contains(shape, voxel) {
        return None;
    }
    let mut index = [0usize; 3];
    for d in 0..3 {
        let r = voxel[d].round().max(0.0) as usize;
        index[d] = r.min(shape[d] - 1);
    }
    Some(index)
}

/// Sample a storage-ordered buffer at a continuous index.
///
/// # Arguments
/// * `data` - Values in storage order (last dimension fastest)
/// * `shape` - Lattice extent per storage dimension
/// * `voxel` - Continuous storage index
/// * `mode` - Interpolation mode
///
/// # Returns
/// The interpolated value, or `None` when the index is outside the lattice.
pub fn sample<T: Copy + Into<f64>>(
    data: &[T],
    shape: [usize; 3],
    voxel: [f64; 3],
    mode: Interpolation,
) -> Option<f64> {
    match mode {
        Interpolation::Nearest => {
            nearest_index(shape, voxel).map(|idx| data[linear_index(shape, idx)].into())
        }
        Interpolation::Linear => {
            if !contains(shape, voxel) {
                return None;
            }
            let mut lo = [0usize; 3];
            let mut hi = [0usize; 3];
            let mut frac = [0.0f64; 3];
            for d in 0..3 {
                if shape[d] == 1 {
                    continue;
                }
                let c = voxel[d].clamp(0.0, (shape[d] - 1) as f64);
                let i0 = (c.floor() as usize).min(shape[d] - 2);
                lo[d] = i0;
                hi[d] = i0 + 1;
                frac[d] = c - i0 as f64;
            }

            let mut value = 0.0;
            for corner in 0..8 {
                let mut idx = [0usize; 3];
                let mut weight = 1.0;
                for d in 0..3 {
                    let upper = (corner >> (2 - d)) & 1 == 1;
                    idx[d] = if upper { hi[d] } else { lo[d] };
                    weight *= if upper { frac[d] } else { 1.0 - frac[d] };
                }
                if weight != 0.0 {
                    value += weight * data[linear_index(shape, idx)].into();
                }
            }
            Some(value)
        }
    }
}
