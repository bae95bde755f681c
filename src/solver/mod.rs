mod iterative;

pub use iterative::{IterativeSolver, SolverConfig, SolverStats};
