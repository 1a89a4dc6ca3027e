//! Local optimizer trait.

/// A minimizer that is advanced one step at a time.
///
/// The caller decides how many steps to allow; dropping the optimizer ends
/// the search.
pub trait LocalOptimizer {
    /// Perform one step.
    ///
    /// # Returns
    /// `true` while the search is still improving, `false` once converged.
    fn step(&mut self) -> bool;

    /// Best parameters found so far.
    fn best_parameters(&self) -> &[f64];

    /// Objective value at the best parameters.
    fn best_value(&self) -> f64;

    /// Number of objective evaluations so far.
    fn evaluations(&self) -> usize;
}
