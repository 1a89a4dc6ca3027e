//! Quadratic fits to a 3×3(×3) stencil of objective values.
//!
//! Stencil cells are ordered with the first parameter slowest and offsets
//! `-1, 0, 1` along each parameter. Fitted coordinates are in stencil units;
//! callers scale them by the stencil spacing.

use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, SymmetricEigen, Vector2, Vector3};

use crate::config::StencilWeights;

/// Gradient norm² below which the iso-surface normal is undefined.
pub const NORMAL_EPSILON: f64 = 1e-8;

/// `f(x) = c + gᵀx + ½ xᵀHx` fitted over a stencil.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticFit {
    pub constant: f64,
    pub gradient: DVector<f64>,
    pub hessian: DMatrix<f64>,
}

/// Stencil offsets for `dims` parameters, first parameter slowest.
pub fn stencil_offsets(dims: usize) -> Vec<Vec<i32>> {
    let cells = 3usize.pow(dims as u32);
    (0..cells)
        .map(|cell| {
            (0..dims)
                .map(|d| {
                    let stride = 3usize.pow((dims - 1 - d) as u32);
                    ((cell / stride) % 3) as i32 - 1
                })
                .collect()
        })
        .collect()
}

impl QuadraticFit {
    /// Least-squares fit of a full quadratic to `3^dims` stencil values.
    ///
    /// Each value is scaled by its stencil weight before fitting.
    ///
    /// # Returns
    /// `None` if the value count does not match `dims` or the normal
    /// equations are singular.
    pub fn fit(values: &[f64], dims: usize, weights: &StencilWeights) -> Option<Self> {
        if dims == 0 || values.len() != 3usize.pow(dims as u32) {
            return None;
        }
        let offsets = stencil_offsets(dims);
        let terms = 1 + 2 * dims + dims * (dims - 1) / 2;

        let mut design = DMatrix::<f64>::zeros(values.len(), terms);
        let mut rhs = DVector::<f64>::zeros(values.len());
        for (row, (offset, value)) in offsets.iter().zip(values.iter()).enumerate() {
            let x: Vec<f64> = offset.iter().map(|o| *o as f64).collect();
            let mut col = 0;
            design[(row, col)] = 1.0;
            col += 1;
            for xi in &x {
                design[(row, col)] = *xi;
                col += 1;
            }
            for xi in &x {
                design[(row, col)] = 0.5 * xi * xi;
                col += 1;
            }
            for i in 0..dims {
                for j in (i + 1)..dims {
                    design[(row, col)] = x[i] * x[j];
                    col += 1;
                }
            }
            rhs[row] = value * weights.weight(offset);
        }

        let normal = design.transpose() * &design;
        let projected = design.transpose() * rhs;
        let params = normal.lu().solve(&projected)?;

        let gradient = DVector::from_iterator(dims, (0..dims).map(|i| params[1 + i]));
        let mut hessian = DMatrix::<f64>::zeros(dims, dims);
        for i in 0..dims {
            hessian[(i, i)] = params[1 + dims + i];
        }
        let mut col = 1 + 2 * dims;
        for i in 0..dims {
            for j in (i + 1)..dims {
                hessian[(i, j)] = params[col];
                hessian[(j, i)] = params[col];
                col += 1;
            }
        }
        Some(Self {
            constant: params[0],
            gradient,
            hessian,
        })
    }

    pub fn dims(&self) -> usize {
        self.gradient.len()
    }

    /// Location of the maximum, `x* = −H⁻¹g`.
    ///
    /// # Returns
    /// `None` unless `H` is negative definite and `x*` is finite.
    pub fn maximum(&self) -> Option<DVector<f64>> {
        let negated = -self.hessian.clone();
        let cholesky = negated.cholesky()?;
        let x = cholesky.solve(&self.gradient);
        if x.iter().all(|v| v.is_finite()) {
            Some(x)
        } else {
            None
        }
    }
}

/// Stencil-unit offset of the maximum of a 3×3×3 stencil.
pub fn displacement_from_quadratic_fit_3d(values: &[f64; 27], weights: &StencilWeights) -> Option<[f64; 3]> {
    let x = QuadraticFit::fit(values, 3, weights)?.maximum()?;
    Some([x[0], x[1], x[2]])
}

/// Stencil-unit offset of the maximum of a 3×3 stencil.
pub fn displacement_from_quadratic_fit_2d(values: &[f64; 9], weights: &StencilWeights) -> Option<[f64; 2]> {
    let x = QuadraticFit::fit(values, 2, weights)?.maximum()?;
    Some([x[0], x[1]])
}

/// Principal curvature directions of the iso-surface through the stencil centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalDirections {
    /// Larger curvature magnitude first.
    pub k1: f64,
    pub k2: f64,
    pub e1: Vector3<f64>,
    pub e2: Vector3<f64>,
}

/// Iso-surface normal and, when defined, its principal directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curvature {
    pub normal: Vector3<f64>,
    pub directions: Option<PrincipalDirections>,
}

impl Curvature {
    /// No normal and no principal directions.
    pub fn flat() -> Self {
        Self {
            normal: Vector3::zeros(),
            directions: None,
        }
    }
}

/// Two unit vectors perpendicular to `normal` and to each other.
pub fn perpendicular_pair(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let n = normal.normalize();
    let helper = if n.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let t1 = n.cross(&helper).normalize();
    let t2 = n.cross(&t1);
    (t1, t2)
}

/// Curvature of a 3×3×3 stencil at its centre.
///
/// The shape operator of the level set is `Tᵀ H T / |g|` over a tangent basis
/// `T` of the gradient `g`; its eigenpairs are the principal curvatures and
/// directions.
pub fn principal_directions(values: &[f64; 27], weights: &StencilWeights) -> Curvature {
    let Some(fit) = QuadraticFit::fit(values, 3, weights) else {
        return Curvature::flat();
    };
    let g = Vector3::new(fit.gradient[0], fit.gradient[1], fit.gradient[2]);
    if g.norm_squared() < NORMAL_EPSILON {
        return Curvature {
            normal: g,
            directions: None,
        };
    }
    let h = Matrix3::from_fn(|i, j| fit.hessian[(i, j)]);
    let (t1, t2) = perpendicular_pair(&g);
    let norm = g.norm();
    let shape = Matrix2::new(
        t1.dot(&(h * t1)),
        t1.dot(&(h * t2)),
        t2.dot(&(h * t1)),
        t2.dot(&(h * t2)),
    ) / norm;
    let eigen = SymmetricEigen::new(shape);
    let (a, b) = (eigen.eigenvalues[0], eigen.eigenvalues[1]);
    if !a.is_finite() || !b.is_finite() {
        return Curvature {
            normal: g,
            directions: None,
        };
    }
    let tangent = |v: Vector2<f64>| (t1 * v[0] + t2 * v[1]).normalize();
    let (first, second) = if a.abs() >= b.abs() { (0, 1) } else { (1, 0) };
    Curvature {
        normal: g,
        directions: Some(PrincipalDirections {
            k1: eigen.eigenvalues[first],
            k2: eigen.eigenvalues[second],
            e1: tangent(eigen.eigenvectors.column(first).into_owned()),
            e2: tangent(eigen.eigenvectors.column(second).into_owned()),
        }),
    }
}
