//! Per-node sub-lattices: the source neighbourhood and its image in the target.

use deform_core::{DeformationField, Geometry, Point3, Transform, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Offsets of a spherical neighbourhood of `width` world units with
/// `samples` points per lattice dimension. Degenerate lattice dimensions
/// contribute no offset.
pub fn spherical_offsets(lattice: &Geometry, width: f64, samples: usize) -> Vec<Vector3> {
    let shape = lattice.shape();
    let half = width / 2.0;
    let per_dim = |d: usize| -> Vec<f64> {
        if shape[d] == 1 || samples < 2 {
            vec![0.0]
        } else {
            (0..samples)
                .map(|i| -half + width * i as f64 / (samples - 1) as f64)
                .collect()
        }
    };
    let axes: Vec<Vector3> = (0..3)
        .map(|d| lattice.direction().column(d).into_owned())
        .collect();
    let (t0, t1, t2) = (per_dim(0), per_dim(1), per_dim(2));

    let mut offsets = Vec::new();
    for a in &t0 {
        for b in &t1 {
            for c in &t2 {
                let radius2 = if half > 0.0 {
                    (a * a + b * b + c * c) / (half * half)
                } else {
                    0.0
                };
                if radius2 <= 1.0 + 1e-12 {
                    offsets.push(axes[0] * *a + axes[1] * *b + axes[2] * *c);
                }
            }
        }
    }
    offsets
}

/// Map source points through the full transform.
pub fn target_lattice(points: &[Point3], transform: &impl Transform) -> Vec<Point3> {
    points.iter().map(|p| transform.transform_point(p)).collect()
}

/// Map source points through the linear part, then add the displacement of
/// the nearest node of a super-sampled warp when the point falls on it.
pub fn target_lattice_super_sampled(
    points: &[Point3],
    linear: &impl Transform,
    warp: &DeformationField,
) -> Vec<Point3> {
    points
        .iter()
        .map(|p| {
            let q = linear.transform_point(p);
            match warp.nearest_displacement(&q) {
                Some(d) => q + d,
                None => q,
            }
        })
        .collect()
}

/// Generator for the jitter of one node in one phase of one iteration.
pub fn jitter_rng(seed: u64, iteration: usize, phase: u64, node: usize) -> StdRng {
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ ((iteration as u64) << 40)
        ^ (phase << 36)
        ^ node as u64;
    StdRng::seed_from_u64(mixed)
}

/// Convert world points to voxel coordinates of `geometry`, optionally moving
/// each coordinate of the `active` dimensions by a uniform offset in [-0.5, 0.5).
pub fn to_voxels(
    points: &[Point3],
    geometry: &Geometry,
    jitter: Option<(&mut StdRng, &[usize])>,
) -> Vec<[f64; 3]> {
    let mut voxels: Vec<[f64; 3]> = points.iter().map(|p| geometry.world_to_index(p)).collect();
    if let Some((rng, active)) = jitter {
        for v in voxels.iter_mut() {
            for &d in active {
                v[d] += rng.gen::<f64>() - 0.5;
            }
        }
    }
    voxels
}
