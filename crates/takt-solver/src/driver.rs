//! Solve Driver
//!
//! Validates inputs, compiles the model, and orchestrates the solves the
//! configured multi-objective strategy needs. Every sequential solve
//! rebuilds the model deterministically (entity IDs fully determine
//! emission order), applies the strategy's extra bounds, and runs under
//! the per-solve wall-clock budget. A cooperative cancellation flag is
//! checked between sequential solves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use takt_core::objective::{
    MultiObjectiveConfig, ObjectiveKind, ObjectiveStrategy, ParetoFrontier, ParetoSolution,
    TradeOffAnalysis,
};
use takt_core::time::calculate_horizon;
use takt_core::{CellId, ConfigError, EntityError, ProblemError, SchedulingProblem, SetupTimes};

use crate::constraints::{
    add_assignment_constraints, add_due_date_constraints, add_duration_constraints,
    add_machine_capacity_constraints, add_precedence_constraints, add_redundant_bounds,
    add_symmetry_constraints, add_unattended_constraints, add_wip_constraints,
    add_workcell_capacity_constraints, CompileOptions,
};
use crate::extract::{
    build_solution, objective_values_from, read_raw, wanted_vars, RawAssignment, Solution,
    SolveStatus, SolverStats,
};
use crate::model::{CpModel, Direction, Var};
use crate::objective::{composite_objective, direction_of, objective_var, AuxVars, ObjectiveMemo};
use crate::operators::add_operator_constraints;
use crate::vars::{build_variables, VariableStore};

/// Search branching modes accepted by the engine configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBranching {
    #[default]
    Automatic,
    Fixed,
}

/// Opaque engine parameters. The driver validates the ranges and passes
/// them through; the engine applies what it supports (the wall-clock
/// budget and its default brancher), the rest is recorded in logs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverParameters {
    pub num_workers: i64,
    pub max_time_seconds: f64,
    pub linearization_level: i64,
    pub search_branching: SearchBranching,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            num_workers: 4,
            max_time_seconds: 30.0,
            linearization_level: 1,
            search_branching: SearchBranching::Automatic,
        }
    }
}

impl SolverParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.num_workers) {
            return Err(ConfigError::BadParameters(format!(
                "num_workers must be within [1, 16]: {}",
                self.num_workers
            )));
        }
        if self.max_time_seconds <= 0.0 {
            return Err(ConfigError::BadParameters(format!(
                "max_time_seconds must be positive: {}",
                self.max_time_seconds
            )));
        }
        if !(0..=2).contains(&self.linearization_level) {
            return Err(ConfigError::BadParameters(format!(
                "linearization_level must be within [0, 2]: {}",
                self.linearization_level
            )));
        }
        Ok(())
    }

    fn budget(&self) -> Duration {
        Duration::from_secs_f64(self.max_time_seconds)
    }
}

/// Cooperative cancellation handle shared with the caller
pub type CancelFlag = Arc<AtomicBool>;

/// Fatal errors before or during model construction. Solve-time outcomes
/// (infeasible, timeout) are a status on the returned solution instead.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Problem(#[from] ProblemError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Frontier plus analysis for Pareto runs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParetoOutcome {
    pub frontier: ParetoFrontier<Solution>,
    pub analysis: TradeOffAnalysis,
}

/// Result of a solve: the primary solution, plus the frontier for
/// Pareto-strategy runs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolveResult {
    pub solution: Solution,
    pub pareto: Option<ParetoOutcome>,
}

/// The constraint-programming scheduler.
pub struct CpScheduler {
    pub parameters: SolverParameters,
    pub options: CompileOptions,
    cancel: Option<CancelFlag>,
}

impl Default for CpScheduler {
    fn default() -> Self {
        Self::new()
    }
}

struct Compiled {
    model: CpModel,
    store: VariableStore,
    aux: AuxVars,
    memo: ObjectiveMemo,
}

impl CpScheduler {
    pub fn new() -> Self {
        Self {
            parameters: SolverParameters::default(),
            options: CompileOptions::default(),
            cancel: None,
        }
    }

    pub fn with_parameters(mut self, parameters: SolverParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Install a cancellation flag checked between sequential solves
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Solve a problem under the configured multi-objective policy.
    pub fn solve(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        wip_overrides: &BTreeMap<CellId, i64>,
        config: &MultiObjectiveConfig,
    ) -> Result<SolveResult, SolveError> {
        problem.check_entities()?;
        let issues = problem.validate();
        if !issues.is_empty() {
            return Err(ProblemError::Validation(issues).into());
        }
        config.validate()?;
        self.parameters.validate()?;

        tracing::info!(
            strategy = ?config.strategy,
            objectives = config.objectives.len(),
            num_workers = self.parameters.num_workers,
            linearization_level = self.parameters.linearization_level,
            search_branching = ?self.parameters.search_branching,
            max_time_seconds = self.parameters.max_time_seconds,
            "starting solve"
        );

        if problem.total_task_count() == 0 {
            return Ok(SolveResult {
                solution: Solution::empty(SolveStatus::Optimal, SolverStats::default()),
                pareto: None,
            });
        }

        match config.strategy {
            ObjectiveStrategy::Lexicographic => self
                .solve_lexicographic(problem, setups, wip_overrides, config)
                .map(|solution| SolveResult {
                    solution,
                    pareto: None,
                }),
            ObjectiveStrategy::WeightedSum => self
                .solve_weighted_sum(problem, setups, wip_overrides, config)
                .map(|solution| SolveResult {
                    solution,
                    pareto: None,
                }),
            ObjectiveStrategy::EpsilonConstraint => self
                .solve_epsilon(problem, setups, wip_overrides, config)
                .map(|solution| SolveResult {
                    solution,
                    pareto: None,
                }),
            ObjectiveStrategy::ParetoOptimal => {
                self.solve_pareto(problem, setups, wip_overrides, config)
            }
        }
    }

    // ========================================================================
    // Model compilation
    // ========================================================================

    /// One deterministic compilation pass over every constraint family,
    /// in the fixed family order.
    fn compile(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        wip_overrides: &BTreeMap<CellId, i64>,
    ) -> Compiled {
        let horizon = calculate_horizon(problem);
        let mut model = CpModel::new();
        let mut store = build_variables(&mut model, problem, horizon);

        add_duration_constraints(&mut model, &store);
        add_precedence_constraints(&mut model, &store, problem);
        add_assignment_constraints(&mut model, &store, problem);
        add_machine_capacity_constraints(&mut model, &mut store, problem, setups);
        add_workcell_capacity_constraints(&mut model, &mut store, problem);
        let unattended =
            add_unattended_constraints(&mut model, &mut store, problem, &self.options);
        let cells = add_wip_constraints(&mut model, &mut store, problem, wip_overrides);
        let due = add_due_date_constraints(&mut model, &store, problem, &self.options);
        let operators = add_operator_constraints(&mut model, &mut store, problem);
        add_symmetry_constraints(&mut model, &store, problem);
        let timing = add_redundant_bounds(&mut model, &store, problem);

        tracing::debug!(
            variables = model.var_count(),
            constraints = model.constraint_count(),
            horizon,
            "model compiled"
        );

        Compiled {
            model,
            store,
            aux: AuxVars {
                timing,
                due,
                unattended,
                cells,
                operators,
            },
            memo: ObjectiveMemo::default(),
        }
    }

    fn objective(
        &self,
        compiled: &mut Compiled,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        kind: ObjectiveKind,
    ) -> Var {
        objective_var(
            &mut compiled.model,
            &mut compiled.store,
            problem,
            setups,
            &mut compiled.aux,
            &mut compiled.memo,
            kind,
        )
    }

    /// Run one solve and extract the schedule when a solution exists.
    fn solve_once(
        &self,
        compiled: Compiled,
        objective: Var,
        direction: Direction,
    ) -> (SolveStatus, Option<RawAssignment>, SolverStats) {
        let wanted = wanted_vars(&compiled.store);
        let outcome =
            compiled
                .model
                .optimise(objective, direction, self.parameters.budget(), &wanted);

        let stats = SolverStats {
            solve_time: outcome.solve_time,
            branches: 0,
            conflicts: 0,
            objective_value: outcome.objective_value.map(|v| v as f64),
        };
        let status = SolveStatus::from(outcome.status);
        let raw = outcome
            .values
            .map(|values| read_raw(&compiled.store, &values));
        (status, raw, stats)
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    /// Solve objectives in priority order, freezing each at its best
    /// value widened by the configured tolerance.
    fn solve_lexicographic(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        wip_overrides: &BTreeMap<CellId, i64>,
        config: &MultiObjectiveConfig,
    ) -> Result<Solution, SolveError> {
        let stages = config.sorted_objectives();
        let mut bounds: Vec<(ObjectiveKind, i64)> = Vec::new();
        let mut best: Option<(SolveStatus, RawAssignment, SolverStats)> = None;

        for (index, stage) in stages.iter().enumerate() {
            if self.cancelled() {
                return Ok(self.finish(problem, setups, best, SolveStatus::Cancelled));
            }

            let mut compiled = self.compile(problem, setups, wip_overrides);
            for &(kind, bound) in &bounds {
                let var = self.objective(&mut compiled, problem, setups, kind);
                if kind.is_maximization() {
                    compiled.model.ge(&[(var, 1)], bound);
                } else {
                    compiled.model.le(&[(var, 1)], bound);
                }
            }

            let var = self.objective(&mut compiled, problem, setups, stage.kind);
            let direction = direction_of(stage.kind);
            let (status, raw, stats) =
                self.solve_once(compiled, var, direction);

            tracing::info!(
                stage = index,
                kind = stage.kind.label(),
                %status,
                objective = ?stats.objective_value,
                "lexicographic stage finished"
            );

            let Some(raw) = raw else {
                if best.is_none() {
                    return Ok(Solution::empty(status, stats));
                }
                break;
            };

            // freeze this stage before moving to the next
            if let Some(value) = stats.objective_value {
                let tolerance = config.lexicographic_tolerance;
                let bound = if stage.kind.is_maximization() {
                    (value * (1.0 - tolerance)).floor() as i64
                } else {
                    (value * (1.0 + tolerance)).ceil() as i64
                };
                bounds.push((stage.kind, bound));
            }
            best = Some((status, raw, stats));
        }

        let (status, raw, stats) = best.expect("at least one stage succeeded");
        Ok(build_solution(problem, setups, &raw, status, stats))
    }

    /// One solve over the normalized weighted composite.
    fn solve_weighted_sum(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        wip_overrides: &BTreeMap<CellId, i64>,
        config: &MultiObjectiveConfig,
    ) -> Result<Solution, SolveError> {
        let mut compiled = self.compile(problem, setups, wip_overrides);
        let composite = composite_objective(
            &mut compiled.model,
            &mut compiled.store,
            problem,
            setups,
            &mut compiled.aux,
            &mut compiled.memo,
            config,
        );
        let (status, raw, stats) =
            self.solve_once(compiled, composite, Direction::Minimise);
        Ok(match raw {
            Some(raw) => build_solution(problem, setups, &raw, status, stats),
            None => Solution::empty(status, stats),
        })
    }

    /// Bound every epsilon-carrying objective and optimize the free one.
    fn solve_epsilon(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        wip_overrides: &BTreeMap<CellId, i64>,
        config: &MultiObjectiveConfig,
    ) -> Result<Solution, SolveError> {
        let mut compiled = self.compile(problem, setups, wip_overrides);

        let mut free = None;
        for objective in &config.objectives {
            match objective.epsilon_bound {
                Some(epsilon) => {
                    let var = self.objective(&mut compiled, problem, setups, objective.kind);
                    if objective.kind.is_maximization() {
                        compiled.model.ge(&[(var, 1)], epsilon.ceil() as i64);
                    } else {
                        compiled.model.le(&[(var, 1)], epsilon.floor() as i64);
                    }
                }
                None => free = Some(objective.kind),
            }
        }
        let free = free.expect("validated epsilon config has one free objective");

        let var = self.objective(&mut compiled, problem, setups, free);
        let (status, raw, stats) =
            self.solve_once(compiled, var, direction_of(free));
        Ok(match raw {
            Some(raw) => build_solution(problem, setups, &raw, status, stats),
            None => Solution::empty(status, stats),
        })
    }

    /// Sweep epsilon along the second objective between its individually
    /// optimal value and its value at the primary optimum, collecting
    /// non-dominated solutions.
    fn solve_pareto(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        wip_overrides: &BTreeMap<CellId, i64>,
        config: &MultiObjectiveConfig,
    ) -> Result<SolveResult, SolveError> {
        let kinds = config.kinds();
        let primary = kinds[0];
        let mut frontier: ParetoFrontier<Solution> = ParetoFrontier::new(kinds.clone());

        // anchor 1: primary alone
        let anchor_primary =
            self.single_objective_solve(problem, setups, wip_overrides, primary, &[]);
        let Some(anchor_primary) = anchor_primary else {
            return Ok(SolveResult {
                solution: Solution::empty(SolveStatus::Infeasible, SolverStats::default()),
                pareto: None,
            });
        };
        let primary_values = objective_values_from(problem, &anchor_primary);
        frontier.add(ParetoSolution::new(primary_values.clone(), anchor_primary.clone()));

        if kinds.len() >= 2 {
            let sweep = kinds[1];

            if !self.cancelled() {
                // anchor 2: sweep dimension alone
                if let Some(anchor_sweep) =
                    self.single_objective_solve(problem, setups, wip_overrides, sweep, &[])
                {
                    let sweep_values = objective_values_from(problem, &anchor_sweep);
                    let sweep_best = sweep_values.get(sweep);
                    let sweep_at_primary = primary_values.get(sweep);
                    frontier.add(ParetoSolution::new(sweep_values, anchor_sweep));

                    if let (Some(lo), Some(hi)) = (sweep_best, sweep_at_primary) {
                        let points = (config.pareto_iterations - 2).max(0);
                        for step in 1..=points {
                            if self.cancelled() {
                                break;
                            }
                            let fraction = step as f64 / (points + 1) as f64;
                            let epsilon = lo + (hi - lo) * fraction;
                            let Some(solution) = self.single_objective_solve(
                                problem,
                                setups,
                                wip_overrides,
                                primary,
                                &[(sweep, epsilon)],
                            ) else {
                                continue;
                            };
                            let values = objective_values_from(problem, &solution);
                            frontier.add(ParetoSolution::new(values, solution));
                        }
                    }
                }
            }
        }

        let analysis = TradeOffAnalysis::from_frontier(&frontier);
        let best = frontier
            .extreme_solution(primary)
            .map(|i| frontier.solutions[i].schedule.clone())
            .expect("frontier has the primary anchor");

        Ok(SolveResult {
            solution: best,
            pareto: Some(ParetoOutcome { frontier, analysis }),
        })
    }

    /// Compile, apply epsilon-style bounds, optimize one kind.
    fn single_objective_solve(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        wip_overrides: &BTreeMap<CellId, i64>,
        kind: ObjectiveKind,
        bounds: &[(ObjectiveKind, f64)],
    ) -> Option<Solution> {
        let mut compiled = self.compile(problem, setups, wip_overrides);
        for &(bound_kind, epsilon) in bounds {
            let var = self.objective(&mut compiled, problem, setups, bound_kind);
            if bound_kind.is_maximization() {
                compiled.model.ge(&[(var, 1)], epsilon.ceil() as i64);
            } else {
                compiled.model.le(&[(var, 1)], epsilon.floor() as i64);
            }
        }
        let var = self.objective(&mut compiled, problem, setups, kind);
        let (status, raw, stats) =
            self.solve_once(compiled, var, direction_of(kind));
        raw.map(|raw| build_solution(problem, setups, &raw, status, stats))
    }

    /// Wrap up a partially-completed strategy run.
    fn finish(
        &self,
        problem: &SchedulingProblem,
        setups: &SetupTimes,
        best: Option<(SolveStatus, RawAssignment, SolverStats)>,
        fallback: SolveStatus,
    ) -> Solution {
        match best {
            Some((status, raw, stats)) => build_solution(problem, setups, &raw, status, stats),
            None => Solution::empty(fallback, SolverStats::default()),
        }
    }
}
