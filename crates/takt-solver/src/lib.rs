//! # takt-solver
//!
//! Constraint-programming solver for the takt job-shop scheduling
//! engine. Compiles a [`SchedulingProblem`](takt_core::SchedulingProblem)
//! into a CP model (decision variables, constraint families, objective
//! expressions), drives the engine under a configurable multi-objective
//! policy, and extracts a concrete schedule.
//!
//! ## Pipeline
//!
//! 1. [`vars`] creates start/end/duration intervals per expanded task
//!    plus machine and operator assignment booleans
//! 2. [`constraints`] and [`operators`] emit the constraint families in a
//!    fixed order (durations, precedences, assignment, machine and cell
//!    capacity with setup gaps, unattended windows, WIP, due dates,
//!    skills, shifts, symmetry breaking, redundant bounds)
//! 3. [`objective`] builds objective expressions and strategy composites
//! 4. [`driver`] orchestrates the solves (lexicographic stages, epsilon
//!    bounds, Pareto sweeps) with cancellation between them
//! 5. [`extract`] turns engine values into the reported [`Solution`]
//! 6. [`verify`] re-checks any solution against the problem
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use takt_core::objective::MultiObjectiveConfig;
//! use takt_core::{Job, Machine, SchedulingProblem, SetupTimes, Task, TaskMode};
//! use takt_solver::CpScheduler;
//!
//! let job = Job::new("order-1", "sample order").task(
//!     Task::new("cut", "order-1").mode(TaskMode::new("cut-m1", "cut", "m1", 30)),
//! );
//! let problem = SchedulingProblem::new(
//!     vec![job],
//!     vec![Machine::new("m1", "cell-a", "Saw")],
//!     vec![],
//!     vec![],
//! );
//!
//! let result = CpScheduler::new()
//!     .solve(
//!         &problem,
//!         &SetupTimes::new(),
//!         &BTreeMap::new(),
//!         &MultiObjectiveConfig::makespan(),
//!     )
//!     .unwrap();
//! println!("makespan: {} units", result.solution.makespan);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use takt_core::objective::MultiObjectiveConfig;
use takt_core::{CellId, SchedulingProblem, SetupTimes};

pub mod constraints;
pub mod driver;
pub mod extract;
pub mod model;
pub mod objective;
pub mod operators;
pub mod vars;
pub mod verify;

pub use constraints::CompileOptions;
pub use driver::{
    CancelFlag, CpScheduler, ParetoOutcome, SearchBranching, SolveError, SolveResult,
    SolverParameters,
};
pub use extract::{
    ScheduledTask, SetupInstance, SetupTimeMetrics, Solution, SolveStatus, SolverStats,
};
pub use verify::verify_solution;

/// A complete solve request as consumed from an external loader:
/// the problem, optional setup times and WIP overrides, the objective
/// policy, and the engine parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolveRequest {
    pub problem: SchedulingProblem,
    #[serde(default)]
    pub setup_times: SetupTimes,
    #[serde(default)]
    pub wip_limits: BTreeMap<CellId, i64>,
    pub objective: MultiObjectiveConfig,
    #[serde(default)]
    pub parameters: SolverParameters,
    #[serde(default)]
    pub options: CompileOptions,
}

impl SolveRequest {
    /// Re-establish problem indices (after deserialization) and solve.
    pub fn solve(mut self) -> Result<SolveResult, SolveError> {
        self.problem.reindex();
        CpScheduler::new()
            .with_parameters(self.parameters.clone())
            .with_options(self.options.clone())
            .solve(
                &self.problem,
                &self.setup_times,
                &self.wip_limits,
                &self.objective,
            )
    }
}
