//! Nelder–Mead simplex ("amoeba") minimizer.
//!
//! Convergence is declared when the relative spread between the best and
//! worst vertex values falls below the tolerance:
//! `2|f_hi - f_lo| / (|f_hi| + |f_lo|) < tolerance`.

use super::trait_::LocalOptimizer;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;
const TINY: f64 = 1e-20;

/// Nelder–Mead simplex over `n` parameters.
pub struct SimplexOptimizer<F>
where
    F: FnMut(&[f64]) -> f64,
{
    objective: F,
    vertices: Vec<Vec<f64>>,
    values: Vec<f64>,
    tolerance: f64,
    evaluations: usize,
    best: usize,
}

impl<F> SimplexOptimizer<F>
where
    F: FnMut(&[f64]) -> f64,
{
    /// Build the initial simplex around `initial`.
    ///
    /// # Arguments
    /// * `initial` - Starting parameters (the first vertex)
    /// * `delta` - Offset of the other vertices along each parameter axis
    /// * `tolerance` - Relative spread at which the search stops
    /// * `objective` - Function to minimize
    pub fn new(initial: &[f64], delta: f64, tolerance: f64, mut objective: F) -> Self {
        let n = initial.len();
        let mut vertices = Vec::with_capacity(n + 1);
        vertices.push(initial.to_vec());
        for i in 0..n {
            let mut v = initial.to_vec();
            v[i] += delta;
            vertices.push(v);
        }
        let values: Vec<f64> = vertices.iter().map(|v| objective(v)).collect();
        let evaluations = values.len();
        let mut optimizer = Self {
            objective,
            vertices,
            values,
            tolerance,
            evaluations,
            best: 0,
        };
        optimizer.best = optimizer.lowest();
        optimizer
    }

    fn evaluate(&mut self, point: &[f64]) -> f64 {
        self.evaluations += 1;
        (self.objective)(point)
    }

    /// Index of the lowest vertex; earlier vertices win ties.
    fn lowest(&self) -> usize {
        let mut best = 0;
        for i in 1..self.values.len() {
            if self.values[i] < self.values[best] {
                best = i;
            }
        }
        best
    }

    /// Indices of the highest and second-highest vertices.
    fn highest_two(&self) -> (usize, usize) {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[b].total_cmp(&self.values[a]));
        (order[0], order.get(1).copied().unwrap_or(order[0]))
    }

    fn replace(&mut self, index: usize, point: Vec<f64>, value: f64) {
        self.vertices[index] = point;
        self.values[index] = value;
    }
}

impl<F> LocalOptimizer for SimplexOptimizer<F>
where
    F: FnMut(&[f64]) -> f64,
{
    fn step(&mut self) -> bool {
        let n = self.vertices[0].len();
        if n == 0 {
            return false;
        }
        let lo = self.lowest();
        let (hi, next_hi) = self.highest_two();

        let spread = 2.0 * (self.values[hi] - self.values[lo]).abs()
            / (self.values[hi].abs() + self.values[lo].abs() + TINY);
        if spread < self.tolerance {
            self.best = lo;
            return false;
        }

        let mut centroid = vec![0.0; n];
        for (i, v) in self.vertices.iter().enumerate() {
            if i != hi {
                for (c, x) in centroid.iter_mut().zip(v.iter()) {
                    *c += x;
                }
            }
        }
        centroid.iter_mut().for_each(|c| *c /= n as f64);

        let toward = |from: &[f64], to: &[f64], factor: f64| -> Vec<f64> {
            from.iter().zip(to.iter()).map(|(f, t)| f + factor * (t - f)).collect()
        };

        let reflected = toward(&centroid, &self.vertices[hi], -REFLECTION);
        let reflected_value = self.evaluate(&reflected);

        if reflected_value < self.values[lo] {
            let expanded = toward(&centroid, &reflected, EXPANSION);
            let expanded_value = self.evaluate(&expanded);
            if expanded_value < reflected_value {
                self.replace(hi, expanded, expanded_value);
            } else {
                self.replace(hi, reflected, reflected_value);
            }
        } else if reflected_value < self.values[next_hi] {
            self.replace(hi, reflected, reflected_value);
        } else {
            let contracted = toward(&centroid, &self.vertices[hi], CONTRACTION);
            let contracted_value = self.evaluate(&contracted);
            if contracted_value < self.values[hi] {
                self.replace(hi, contracted, contracted_value);
            } else {
                let anchor = self.vertices[lo].clone();
                for i in 0..self.vertices.len() {
                    if i == lo {
                        continue;
                    }
                    let shrunk = toward(&anchor, &self.vertices[i], SHRINK);
                    let value = self.evaluate(&shrunk);
                    self.replace(i, shrunk, value);
                }
            }
        }

        self.best = self.lowest();
        true
    }

    fn best_parameters(&self) -> &[f64] {
        &self.vertices[self.best]
    }

    fn best_value(&self) -> f64 {
        self.values[self.best]
    }

    fn evaluations(&self) -> usize {
        self.evaluations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<F: FnMut(&[f64]) -> f64>(opt: &mut SimplexOptimizer<F>, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && opt.step() {
            steps += 1;
        }
        steps
    }

    #[test]
    fn test_minimize_quadratic() {
        let mut opt = SimplexOptimizer::new(&[0.0, 0.0, 0.0], 0.5, 1e-10, |p: &[f64]| {
            1.0 + (p[0] - 0.3).powi(2) + (p[1] + 0.2).powi(2) + 2.0 * (p[2] - 0.1).powi(2)
        });
        let steps = run(&mut opt, 1000);
        assert!(steps < 1000);
        let best = opt.best_parameters();
        assert!((best[0] - 0.3).abs() < 1e-3);
        assert!((best[1] + 0.2).abs() < 1e-3);
        assert!((best[2] - 0.1).abs() < 1e-3);
        assert!(opt.evaluations() > 4);
    }

    #[test]
    fn test_start_at_minimum_stays() {
        let mut opt = SimplexOptimizer::new(&[0.0, 0.0], 0.25, 1e-3, |p: &[f64]| {
            1.0 + p[0] * p[0] + p[1] * p[1]
        });
        run(&mut opt, 400);
        assert_eq!(opt.best_parameters(), &[0.0, 0.0]);
        assert_eq!(opt.best_value(), 1.0);
    }

    #[test]
    fn test_flat_objective_converges_immediately() {
        let mut opt = SimplexOptimizer::new(&[1.0], 0.5, 1e-3, |_: &[f64]| 2.0);
        assert!(!opt.step());
        assert_eq!(opt.evaluations(), 2);
    }
}
