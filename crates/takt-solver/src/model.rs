//! CP Engine Wrapper
//!
//! Thin layer over the Pumpkin constraint solver exposing exactly what
//! the constraint compiler needs: bounded integer variables, 0/1
//! variables, linear inequalities over scaled views, unit-capacity
//! cumulative constraints, and single-variable optimisation under a
//! wall-clock budget.
//!
//! `<=` and `==` are expressed through the same `greater_than_or_equals`
//! primitive by negating coefficients, so every constraint reaching the
//! engine has one shape. Variable and constraint counts are tracked to
//! make model construction reproducible and testable.

use std::time::{Duration, Instant};

use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::variables::{DomainId, TransformableVariable};
use pumpkin_solver::Solver;

/// An integer decision variable handle
pub type Var = DomainId;

/// Engine-level outcome of one optimisation run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    /// Proven optimal
    Optimal,
    /// Solution found, optimality not proven within the budget
    Feasible,
    /// Proven infeasible
    Infeasible,
    /// Budget exhausted without any solution
    Unknown,
}

/// Direction of a single-variable optimisation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Minimise,
    Maximise,
}

/// Result of one solve: status, wall-clock seconds, the objective value,
/// and the values of the requested variables (positionally aligned with
/// the `wanted` slice passed to [`CpModel::optimise`]).
#[derive(Clone, Debug)]
pub struct SolveOutcome {
    pub status: EngineStatus,
    pub solve_time: f64,
    pub objective_value: Option<i64>,
    pub values: Option<Vec<i64>>,
}

/// Wrapper over the CP solver holding emission counters.
pub struct CpModel {
    solver: Solver,
    vars_created: usize,
    constraints_posted: usize,
}

impl Default for CpModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CpModel {
    pub fn new() -> Self {
        Self {
            solver: Solver::default(),
            vars_created: 0,
            constraints_posted: 0,
        }
    }

    /// Number of variables created so far
    pub fn var_count(&self) -> usize {
        self.vars_created
    }

    /// Number of constraints posted so far
    pub fn constraint_count(&self) -> usize {
        self.constraints_posted
    }

    /// A bounded integer variable
    pub fn int_var(&mut self, lb: i64, ub: i64) -> Var {
        self.vars_created += 1;
        self.solver.new_bounded_integer(lb as i32, ub as i32)
    }

    /// A 0/1 variable
    pub fn bool_var(&mut self) -> Var {
        self.int_var(0, 1)
    }

    /// Post `sum(coeff * var) >= rhs`
    pub fn ge(&mut self, terms: &[(Var, i64)], rhs: i64) {
        let tag = self.solver.new_constraint_tag();
        let views: Vec<_> = terms
            .iter()
            .map(|&(var, coeff)| var.scaled(coeff as i32))
            .collect();
        let _ = self
            .solver
            .add_constraint(cp::greater_than_or_equals(views, rhs as i32, tag))
            .post();
        self.constraints_posted += 1;
    }

    /// Post `sum(coeff * var) <= rhs`
    pub fn le(&mut self, terms: &[(Var, i64)], rhs: i64) {
        let negated: Vec<(Var, i64)> =
            terms.iter().map(|&(var, coeff)| (var, -coeff)).collect();
        self.ge(&negated, -rhs);
    }

    /// Post `sum(coeff * var) == rhs`
    pub fn eq(&mut self, terms: &[(Var, i64)], rhs: i64) {
        self.ge(terms, rhs);
        self.le(terms, rhs);
    }

    /// Fix a variable to a constant
    pub fn fix(&mut self, var: Var, value: i64) {
        self.eq(&[(var, 1)], value);
    }

    /// Post a cumulative constraint over fixed-duration tasks:
    /// at no time may the summed demand of running tasks exceed `capacity`.
    pub fn cumulative(
        &mut self,
        starts: &[Var],
        durations: &[i64],
        demands: &[i64],
        capacity: i64,
    ) {
        let tag = self.solver.new_constraint_tag();
        let starts: Vec<Var> = starts.to_vec();
        let durations: Vec<i32> = durations.iter().map(|&d| d as i32).collect();
        let demands: Vec<i32> = demands.iter().map(|&d| d as i32).collect();
        let _ = self
            .solver
            .add_constraint(cp::cumulative(
                starts,
                durations,
                demands,
                capacity as i32,
                tag,
            ))
            .post();
        self.constraints_posted += 1;
    }

    /// Optimise a single variable under a wall-clock budget, returning the
    /// values of `wanted` (in order) when a solution exists.
    ///
    /// Consumes the model: strategy drivers rebuild deterministically for
    /// every sequential solve.
    pub fn optimise(
        mut self,
        objective: Var,
        direction: Direction,
        budget: Duration,
        wanted: &[Var],
    ) -> SolveOutcome {
        let started = Instant::now();

        let mut brancher = self.solver.default_brancher();
        let mut termination = TimeBudget::starting_now(budget);

        fn noop_callback<B>(
            _: &Solver,
            _: pumpkin_solver::results::SolutionReference,
            _: &B,
        ) {
        }

        let engine_direction = match direction {
            Direction::Minimise => OptimisationDirection::Minimise,
            Direction::Maximise => OptimisationDirection::Maximise,
        };

        let result = self.solver.optimise(
            &mut brancher,
            &mut termination,
            LinearSatUnsat::new(engine_direction, objective, noop_callback),
        );

        let solve_time = started.elapsed().as_secs_f64();

        let (status, objective_value, values) = match result {
            OptimisationResult::Optimal(solution) => {
                let values: Vec<i64> = wanted
                    .iter()
                    .map(|&var| solution.get_integer_value(var) as i64)
                    .collect();
                let objective_value = solution.get_integer_value(objective) as i64;
                (EngineStatus::Optimal, Some(objective_value), Some(values))
            }
            OptimisationResult::Satisfiable(solution) => {
                let values: Vec<i64> = wanted
                    .iter()
                    .map(|&var| solution.get_integer_value(var) as i64)
                    .collect();
                let objective_value = solution.get_integer_value(objective) as i64;
                (EngineStatus::Feasible, Some(objective_value), Some(values))
            }
            OptimisationResult::Unsatisfiable => (EngineStatus::Infeasible, None, None),
            OptimisationResult::Unknown => (EngineStatus::Unknown, None, None),
        };

        SolveOutcome {
            status,
            solve_time,
            objective_value,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_emission() {
        let mut model = CpModel::new();
        let x = model.int_var(0, 10);
        let y = model.bool_var();
        assert_eq!(model.var_count(), 2);

        model.ge(&[(x, 1)], 3);
        assert_eq!(model.constraint_count(), 1);
        model.le(&[(x, 1), (y, 2)], 9);
        assert_eq!(model.constraint_count(), 2);
        // equality posts both directions
        model.eq(&[(x, 1)], 5);
        assert_eq!(model.constraint_count(), 4);
    }

    #[test]
    fn identical_builds_emit_identical_counts() {
        let build = || {
            let mut model = CpModel::new();
            let a = model.int_var(0, 20);
            let b = model.int_var(0, 20);
            model.ge(&[(b, 1), (a, -1)], 2);
            model.cumulative(&[a, b], &[2, 2], &[1, 1], 1);
            (model.var_count(), model.constraint_count())
        };
        assert_eq!(build(), build());
    }
}
