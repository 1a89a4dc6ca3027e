//! Derivative-free local optimizers used per lattice node.

pub mod trait_;
pub mod simplex;

pub use trait_::LocalOptimizer;
pub use simplex::SimplexOptimizer;
