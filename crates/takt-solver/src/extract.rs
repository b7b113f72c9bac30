//! Solution Extraction & Reporting
//!
//! Reads variable assignments back from a solved model, derives the
//! schedule, setup-time analytics, machine utilization, and lateness
//! totals, and packages everything into the [`Solution`] consumed by
//! external collaborators.
//!
//! The variable read-back uses one positional convention shared with the
//! solve driver: task starts and ends in task-key order, then machine
//! assignment booleans, then operator assignment booleans, both in map
//! order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rust_decimal::prelude::ToPrimitive;
use takt_core::objective::ObjectiveValues;
use takt_core::problem::TaskKey;
use takt_core::time::{units_to_minutes, TIME_UNIT_MINUTES};
use takt_core::{MachineId, OperatorId, SchedulingProblem, SetupTimes, TaskId};

use crate::model::{EngineStatus, Var};
use crate::vars::VariableStore;

/// Outcome of a solve as seen by callers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unknown,
    Cancelled,
}

impl SolveStatus {
    /// Whether a schedule accompanies this status
    pub fn has_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl From<EngineStatus> for SolveStatus {
    fn from(status: EngineStatus) -> Self {
        match status {
            EngineStatus::Optimal => SolveStatus::Optimal,
            EngineStatus::Feasible => SolveStatus::Feasible,
            EngineStatus::Infeasible => SolveStatus::Infeasible,
            EngineStatus::Unknown => SolveStatus::Unknown,
        }
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unknown => "UNKNOWN",
            SolveStatus::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// Engine statistics for one returned solution
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SolverStats {
    pub solve_time: f64,
    pub branches: u64,
    pub conflicts: u64,
    pub objective_value: Option<f64>,
}

/// One scheduled task in the result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Owning job ID (or instance ID in pattern mode)
    pub job_id: String,
    /// Concrete task ID (expanded in pattern mode)
    pub task_id: TaskId,
    pub task_name: String,
    /// Pattern task this was expanded from, when applicable
    pub pattern_task_id: Option<TaskId>,
    pub start_tu: i64,
    pub end_tu: i64,
    pub duration_minutes: i64,
    pub machine_id: Option<MachineId>,
    pub machine_name: Option<String>,
    pub operator_ids: Vec<OperatorId>,
    pub datetime_start: DateTime<Utc>,
    pub datetime_end: DateTime<Utc>,
}

/// One incurred setup between consecutive tasks on a machine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetupInstance {
    pub from_task: TaskId,
    pub to_task: TaskId,
    pub machine: MachineId,
    pub setup_units: i64,
    pub setup_minutes: i64,
    pub start_tu: i64,
    pub end_tu: i64,
}

/// Per-machine setup totals
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineSetupMetrics {
    pub total_setup_units: i64,
    pub total_setup_minutes: i64,
    pub num_setups: usize,
}

/// Aggregated setup-time analytics for one schedule
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SetupTimeMetrics {
    pub total_setup_units: i64,
    pub total_setup_minutes: i64,
    pub num_setups: usize,
    pub setup_instances: Vec<SetupInstance>,
    pub machine_setup_times: BTreeMap<MachineId, MachineSetupMetrics>,
    pub average_setup_units: f64,
    pub average_setup_minutes: f64,
}

/// The structured schedule returned to callers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    /// Sorted by (start, job, task)
    pub schedule: Vec<ScheduledTask>,
    pub makespan: i64,
    pub makespan_hours: f64,
    pub total_lateness_minutes: i64,
    pub setup_time_metrics: SetupTimeMetrics,
    /// Busy percentage per machine over the makespan
    pub machine_utilization: BTreeMap<MachineId, f64>,
    pub solver_stats: SolverStats,
}

impl Solution {
    /// A schedule-free solution carrying only a status
    pub fn empty(status: SolveStatus, stats: SolverStats) -> Self {
        Self {
            status,
            schedule: Vec::new(),
            makespan: 0,
            makespan_hours: 0.0,
            total_lateness_minutes: 0,
            setup_time_metrics: SetupTimeMetrics::default(),
            machine_utilization: BTreeMap::new(),
            solver_stats: stats,
        }
    }
}

// ============================================================================
// Variable read-back
// ============================================================================

/// Raw values read back from the engine
#[derive(Clone, Debug, Default)]
pub struct RawAssignment {
    pub starts: BTreeMap<TaskKey, i64>,
    pub ends: BTreeMap<TaskKey, i64>,
    pub machine_of: BTreeMap<TaskKey, MachineId>,
    pub operators_of: BTreeMap<TaskKey, Vec<OperatorId>>,
}

/// The positional list of variables whose values extraction needs
pub fn wanted_vars(store: &VariableStore) -> Vec<Var> {
    let mut wanted = Vec::new();
    for key in &store.task_keys {
        let vars = store.tasks[key];
        wanted.push(vars.start);
        wanted.push(vars.end);
    }
    for &var in store.assigned.values() {
        wanted.push(var);
    }
    for &var in store.op_assigned.values() {
        wanted.push(var);
    }
    wanted
}

/// Rebuild the raw assignment from positionally-aligned values
pub fn read_raw(store: &VariableStore, values: &[i64]) -> RawAssignment {
    let mut raw = RawAssignment::default();
    let mut cursor = 0usize;

    for key in &store.task_keys {
        raw.starts.insert(key.clone(), values[cursor]);
        raw.ends.insert(key.clone(), values[cursor + 1]);
        cursor += 2;
    }
    for (key, machine) in store.assigned.keys() {
        if values[cursor] == 1 {
            raw.machine_of.insert(key.clone(), machine.clone());
        }
        cursor += 1;
    }
    for (key, operator) in store.op_assigned.keys() {
        if values[cursor] == 1 {
            raw.operators_of
                .entry(key.clone())
                .or_default()
                .push(operator.clone());
        }
        cursor += 1;
    }
    raw
}

// ============================================================================
// Solution building
// ============================================================================

/// Build the structured solution from a raw assignment.
pub fn build_solution(
    problem: &SchedulingProblem,
    setups: &SetupTimes,
    raw: &RawAssignment,
    status: SolveStatus,
    stats: SolverStats,
) -> Solution {
    let mut schedule = Vec::new();
    let mut makespan = 0i64;

    for task in problem.expanded_tasks() {
        let key = task.key();
        let start = raw.starts.get(&key).copied().unwrap_or(0);
        let end = raw.ends.get(&key).copied().unwrap_or(0);
        makespan = makespan.max(end);

        let machine_id = raw.machine_of.get(&key).cloned();
        let machine_name = machine_id
            .as_deref()
            .and_then(|m| problem.get_machine(m))
            .map(|m| m.name.clone());

        let pattern_task_id = if problem.is_pattern_mode() {
            takt_core::parse_instance_task_id(&task.task_id).map(|(_, pt)| pt.to_string())
        } else {
            None
        };

        schedule.push(ScheduledTask {
            job_id: task.entity_id.clone(),
            task_id: task.task_id.clone(),
            task_name: task.name().to_string(),
            pattern_task_id,
            start_tu: start,
            end_tu: end,
            duration_minutes: units_to_minutes(end - start),
            machine_id,
            machine_name,
            operator_ids: raw.operators_of.get(&key).cloned().unwrap_or_default(),
            datetime_start: problem.grid.datetime_at(start),
            datetime_end: problem.grid.datetime_at(end),
        });
    }

    schedule.sort_by(|a, b| {
        (a.start_tu, &a.job_id, &a.task_id).cmp(&(b.start_tu, &b.job_id, &b.task_id))
    });

    let total_lateness_minutes = total_lateness_units(problem, raw) * TIME_UNIT_MINUTES;
    let setup_time_metrics = calculate_setup_metrics(&schedule, setups);
    let machine_utilization = calculate_utilization(problem, &schedule, makespan);

    Solution {
        status,
        schedule,
        makespan,
        makespan_hours: makespan as f64 * TIME_UNIT_MINUTES as f64 / 60.0,
        total_lateness_minutes,
        setup_time_metrics,
        machine_utilization,
        solver_stats: stats,
    }
}

/// Summed lateness in units against clamped due dates
fn total_lateness_units(problem: &SchedulingProblem, raw: &RawAssignment) -> i64 {
    let mut total = 0i64;
    for (entity, due) in problem.due_dates() {
        let Some(due) = due else { continue };
        let due_units = problem.grid.units_from_base(due).max(1);
        let completion = problem
            .entity_tasks(&entity)
            .iter()
            .filter_map(|t| raw.ends.get(&t.key()).copied())
            .max()
            .unwrap_or(0);
        total += (completion - due_units).max(0);
    }
    total
}

/// Group tasks by machine, sort by start, and derive incurred setups
/// between consecutive pairs.
pub fn calculate_setup_metrics(
    schedule: &[ScheduledTask],
    setups: &SetupTimes,
) -> SetupTimeMetrics {
    let mut by_machine: BTreeMap<&str, Vec<&ScheduledTask>> = BTreeMap::new();
    for task in schedule {
        if let Some(machine) = task.machine_id.as_deref() {
            by_machine.entry(machine).or_default().push(task);
        }
    }

    let mut metrics = SetupTimeMetrics::default();
    for (machine, mut tasks) in by_machine {
        tasks.sort_by_key(|t| t.start_tu);
        let mut machine_metrics = MachineSetupMetrics::default();

        for pair in tasks.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            let setup_units = setups.get_expanded(&current.task_id, &next.task_id, machine);
            if setup_units == 0 {
                continue;
            }
            metrics.setup_instances.push(SetupInstance {
                from_task: current.task_id.clone(),
                to_task: next.task_id.clone(),
                machine: machine.to_string(),
                setup_units,
                setup_minutes: units_to_minutes(setup_units),
                start_tu: current.end_tu,
                end_tu: current.end_tu + setup_units,
            });
            metrics.total_setup_units += setup_units;
            machine_metrics.total_setup_units += setup_units;
            machine_metrics.num_setups += 1;
        }

        machine_metrics.total_setup_minutes = units_to_minutes(machine_metrics.total_setup_units);
        metrics
            .machine_setup_times
            .insert(machine.to_string(), machine_metrics);
    }

    metrics.total_setup_minutes = units_to_minutes(metrics.total_setup_units);
    metrics.num_setups = metrics.setup_instances.len();
    if metrics.num_setups > 0 {
        metrics.average_setup_units =
            metrics.total_setup_units as f64 / metrics.num_setups as f64;
        metrics.average_setup_minutes =
            metrics.total_setup_minutes as f64 / metrics.num_setups as f64;
    }
    metrics
}

/// Busy percentage per machine: assigned work over makespan x capacity
pub fn calculate_utilization(
    problem: &SchedulingProblem,
    schedule: &[ScheduledTask],
    makespan: i64,
) -> BTreeMap<MachineId, f64> {
    let mut utilization = BTreeMap::new();
    if makespan <= 0 {
        return utilization;
    }
    for machine in &problem.machines {
        if machine.capacity <= 0 {
            continue;
        }
        let busy_units: i64 = schedule
            .iter()
            .filter(|t| t.machine_id.as_deref() == Some(machine.resource_id.as_str()))
            .map(|t| t.end_tu - t.start_tu)
            .sum();
        let percent = busy_units as f64 / (makespan * machine.capacity) as f64 * 100.0;
        utilization.insert(machine.resource_id.clone(), percent);
    }
    utilization
}

// ============================================================================
// Post-hoc objective values
// ============================================================================

/// Compute every objective's value from an extracted solution; used for
/// lexicographic freezing, Pareto dominance, and reporting.
pub fn objective_values_from(
    problem: &SchedulingProblem,
    solution: &Solution,
) -> ObjectiveValues {
    let mut values = ObjectiveValues::default();
    values.solve_time = solution.solver_stats.solve_time;
    values.solver_status = solution.status.to_string();
    values.objective_value = solution.solver_stats.objective_value;

    values.makespan = Some(solution.makespan);
    let lateness_units = solution.total_lateness_minutes / TIME_UNIT_MINUTES;
    values.total_lateness = Some(lateness_units);
    values.total_tardiness = Some(lateness_units);
    values.maximum_lateness = Some(max_lateness_units(problem, solution));
    values.total_setup_time = Some(solution.setup_time_metrics.total_setup_units);

    let mut completion_sum = 0i64;
    for (entity, _) in problem.due_dates() {
        let completion = solution
            .schedule
            .iter()
            .filter(|t| t.job_id == entity)
            .map(|t| t.end_tu)
            .max()
            .unwrap_or(0);
        completion_sum += completion;
    }
    values.weighted_completion_time = Some(completion_sum as f64);

    if !solution.machine_utilization.is_empty() {
        let average: f64 = solution.machine_utilization.values().sum::<f64>()
            / solution.machine_utilization.len() as f64;
        values.machine_utilization = Some(average);
    }

    values.total_cost = Some(total_cost_dollars(problem, solution));
    values
}

fn max_lateness_units(problem: &SchedulingProblem, solution: &Solution) -> i64 {
    let mut worst = 0i64;
    for (entity, due) in problem.due_dates() {
        let Some(due) = due else { continue };
        let due_units = problem.grid.units_from_base(due).max(1);
        let completion = solution
            .schedule
            .iter()
            .filter(|t| t.job_id == entity)
            .map(|t| t.end_tu)
            .max()
            .unwrap_or(0);
        worst = worst.max(completion - due_units);
    }
    worst.max(0)
}

fn total_cost_dollars(problem: &SchedulingProblem, solution: &Solution) -> f64 {
    let mut cents = 0i64;
    for task in &solution.schedule {
        let units = task.end_tu - task.start_tu;
        if let Some(machine) = task.machine_id.as_deref().and_then(|m| problem.get_machine(m))
        {
            let rate = (machine.cost_per_hour * rust_decimal::Decimal::from(25))
                .round()
                .to_i64()
                .unwrap_or(0);
            cents += units * rate;
        }
        for operator_id in &task.operator_ids {
            if let Some(operator) = problem.get_operator(operator_id) {
                let rate = (operator.hourly_rate * rust_decimal::Decimal::from(25))
                    .round()
                    .to_i64()
                    .unwrap_or(0);
                cents += units * rate;
            }
        }
    }
    cents as f64 / 100.0
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use takt_core::time::TimeGrid;

    fn task(
        job: &str,
        id: &str,
        machine: &str,
        start: i64,
        end: i64,
    ) -> ScheduledTask {
        let grid = TimeGrid::default();
        ScheduledTask {
            job_id: job.to_string(),
            task_id: id.to_string(),
            task_name: id.to_string(),
            pattern_task_id: None,
            start_tu: start,
            end_tu: end,
            duration_minutes: units_to_minutes(end - start),
            machine_id: Some(machine.to_string()),
            machine_name: Some(machine.to_string()),
            operator_ids: Vec::new(),
            datetime_start: grid.datetime_at(start),
            datetime_end: grid.datetime_at(end),
        }
    }

    #[test]
    fn setup_metrics_count_consecutive_pairs_only() {
        let mut setups = SetupTimes::new();
        setups.insert("x", "y", "m1", 2);
        setups.insert("x", "z", "m1", 9);

        // on m1: x then y then z; x->z is not consecutive
        let schedule = vec![
            task("j1", "x", "m1", 0, 2),
            task("j1", "y", "m1", 4, 6),
            task("j1", "z", "m1", 8, 10),
        ];
        let metrics = calculate_setup_metrics(&schedule, &setups);
        assert_eq!(metrics.num_setups, 1);
        assert_eq!(metrics.total_setup_units, 2);
        assert_eq!(metrics.total_setup_minutes, 30);
        assert_eq!(
            metrics.setup_instances[0],
            SetupInstance {
                from_task: "x".into(),
                to_task: "y".into(),
                machine: "m1".into(),
                setup_units: 2,
                setup_minutes: 30,
                start_tu: 2,
                end_tu: 4,
            }
        );
        assert_eq!(metrics.machine_setup_times["m1"].num_setups, 1);
        assert_eq!(metrics.average_setup_units, 2.0);
    }

    #[test]
    fn solution_status_display_matches_wire_labels() {
        assert_eq!(SolveStatus::Optimal.to_string(), "OPTIMAL");
        assert_eq!(SolveStatus::Infeasible.to_string(), "INFEASIBLE");
        assert!(SolveStatus::Feasible.has_solution());
        assert!(!SolveStatus::Unknown.has_solution());
    }

    #[test]
    fn datetime_output_uses_the_problem_grid() {
        let grid = TimeGrid::default();
        let t = task("j1", "x", "m1", 4, 6);
        assert_eq!(
            t.datetime_start,
            chrono::Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
        );
        assert_eq!(grid.units_from_base(t.datetime_end), 6);
    }
}
