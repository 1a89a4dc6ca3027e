use deform_registration::nonlinear::{
    displacement_from_quadratic_fit_2d, displacement_from_quadratic_fit_3d, principal_directions,
};
use deform_registration::StencilWeights;
use proptest::prelude::*;

/// Concave quadratic with its peak at `peak`, sampled on the 3×3×3 stencil
/// (first offset slowest).
fn stencil_3d(peak: [f64; 3], diag: [f64; 3], off: [f64; 3]) -> [f64; 27] {
    let mut values = [0.0; 27];
    let mut cell = 0;
    for i in -1..=1 {
        for j in -1..=1 {
            for k in -1..=1 {
                let d = [i as f64 - peak[0], j as f64 - peak[1], k as f64 - peak[2]];
                let q = diag[0] * d[0] * d[0]
                    + diag[1] * d[1] * d[1]
                    + diag[2] * d[2] * d[2]
                    + 2.0 * (off[0] * d[0] * d[1] + off[1] * d[0] * d[2] + off[2] * d[1] * d[2]);
                values[cell] = 5.0 - 0.5 * q;
                cell += 1;
            }
        }
    }
    values
}

proptest! {
    #[test]
    fn test_fit_recovers_peak_3d(
        px in -1.0f64..1.0, py in -1.0f64..1.0, pz in -1.0f64..1.0,
        a in 1.0f64..4.0, b in 1.0f64..4.0, c in 1.0f64..4.0,
        e in -0.3f64..0.3, f in -0.3f64..0.3, g in -0.3f64..0.3,
    ) {
        let values = stencil_3d([px, py, pz], [a, b, c], [e, f, g]);
        let x = displacement_from_quadratic_fit_3d(&values, &StencilWeights::VOLUMETRIC).unwrap();
        prop_assert!((x[0] - px).abs() < 1e-8);
        prop_assert!((x[1] - py).abs() < 1e-8);
        prop_assert!((x[2] - pz).abs() < 1e-8);
    }

    #[test]
    fn test_fit_recovers_peak_2d(
        px in -1.0f64..1.0, py in -1.0f64..1.0,
        a in 1.0f64..4.0, b in 1.0f64..4.0, e in -0.5f64..0.5,
    ) {
        let mut values = [0.0; 9];
        let mut cell = 0;
        for i in -1..=1 {
            for j in -1..=1 {
                let (dx, dy) = (i as f64 - px, j as f64 - py);
                values[cell] = 3.0 - 0.5 * (a * dx * dx + b * dy * dy + 2.0 * e * dx * dy);
                cell += 1;
            }
        }
        let x = displacement_from_quadratic_fit_2d(&values, &StencilWeights([1.0; 4])).unwrap();
        prop_assert!((x[0] - px).abs() < 1e-8);
        prop_assert!((x[1] - py).abs() < 1e-8);
    }
}

#[test]
fn test_convex_stencil_has_no_maximum() {
    let mut values = stencil_3d([0.0; 3], [1.0; 3], [0.0; 3]);
    for v in values.iter_mut() {
        *v = -*v;
    }
    assert!(displacement_from_quadratic_fit_3d(&values, &StencilWeights::VOLUMETRIC).is_none());
}

#[test]
fn test_principal_directions_of_flat_stencil() {
    let curvature = principal_directions(&[1.0; 27], &StencilWeights::VOLUMETRIC);
    assert!(curvature.directions.is_none());
    assert!(curvature.normal.norm() < 1e-8);
}
