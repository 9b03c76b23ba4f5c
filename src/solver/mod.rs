//! Solving cover models

pub mod branch_bound;

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::cover::CoverModel;
use crate::errors::PangeblocksError;

pub use branch_bound::BranchAndBound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// The assignment is proven optimal
    Optimal,

    /// The assignment is feasible, but not proven optimal
    Feasible,

    /// No assignment satisfies the constraints
    Infeasible,

    /// The time limit was hit; an incumbent assignment may be available
    Timeout,
}

impl Display for SolverStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Feasible => "feasible",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::Timeout => "timeout",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub status: SolverStatus,

    /// Selection value for every variable of the model, when a solution was found
    pub assignment: Option<Vec<bool>>,

    pub objective: Option<f64>,
}

impl SolverOutput {
    pub fn infeasible() -> Self {
        Self { status: SolverStatus::Infeasible, assignment: None, objective: None }
    }
}

/// A solver for the 0/1 cover models built by [`crate::cover::CoverModelBuilder`].
///
/// Implementations must honour the fixed variables and return within roughly `time_limit`,
/// handing back their best assignment so far if they run out of time.
pub trait CoverSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, model: &CoverModel, time_limit: Duration) -> Result<SolverOutput, PangeblocksError>;
}
