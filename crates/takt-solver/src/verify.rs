//! Schedule Verifier
//!
//! Pure re-checking of a returned solution against the problem: interval
//! arithmetic, machine choice and mode durations, precedences, machine
//! and cell capacities, setup gaps, unattended windows, operator
//! staffing, shift fit, WIP ceilings, and pattern symmetry.
//!
//! The solver never consumes this module; tests feed extracted solutions
//! back through it as the round-trip check, and external callers can use
//! it to audit schedules from any source.

use std::collections::BTreeMap;

use takt_core::time::{
    minutes_to_units, BUSINESS_DAY_END_TU, BUSINESS_DAY_START_TU, UNITS_PER_DAY,
};
use takt_core::{CellId, SchedulingProblem, SetupTimes, WIP_UNLIMITED};

use crate::extract::{ScheduledTask, Solution};

/// Check a solution against the problem. Returns human-readable
/// violation messages; an empty list means the schedule is consistent.
pub fn verify_solution(
    problem: &SchedulingProblem,
    setups: &SetupTimes,
    wip_overrides: &BTreeMap<CellId, i64>,
    solution: &Solution,
) -> Vec<String> {
    let mut violations = Vec::new();
    if !solution.status.has_solution() {
        return violations;
    }

    let by_task: BTreeMap<&str, &ScheduledTask> = solution
        .schedule
        .iter()
        .map(|t| (t.task_id.as_str(), t))
        .collect();

    check_intervals(problem, &by_task, &mut violations);
    check_precedences(problem, &by_task, &mut violations);
    check_machine_capacity(problem, solution, &mut violations);
    check_cell_limits(problem, solution, wip_overrides, &mut violations);
    check_setup_gaps(solution, setups, &mut violations);
    check_unattended(problem, &by_task, &mut violations);
    check_operators(problem, &by_task, &mut violations);
    check_shifts(problem, solution, &mut violations);
    check_symmetry(problem, &by_task, &mut violations);

    violations
}

fn check_intervals(
    problem: &SchedulingProblem,
    by_task: &BTreeMap<&str, &ScheduledTask>,
    violations: &mut Vec<String>,
) {
    for task in problem.expanded_tasks() {
        let Some(entry) = by_task.get(task.task_id.as_str()) else {
            violations.push(format!("task {} missing from schedule", task.task_id));
            continue;
        };
        let duration = entry.end_tu - entry.start_tu;
        let min_units = minutes_to_units(task.min_duration_minutes());
        let max_units = minutes_to_units(task.max_duration_minutes());
        if duration < min_units || duration > max_units {
            violations.push(format!(
                "task {} duration {duration} outside [{min_units}, {max_units}]",
                task.task_id
            ));
        }

        match entry.machine_id.as_deref() {
            None => violations.push(format!("task {} has no machine", task.task_id)),
            Some(machine) => match task.duration_on_machine(machine) {
                None => violations.push(format!(
                    "task {} assigned to ineligible machine {machine}",
                    task.task_id
                )),
                Some(minutes) => {
                    if duration != minutes_to_units(minutes) {
                        violations.push(format!(
                            "task {} duration {duration} does not match mode on {machine}",
                            task.task_id
                        ));
                    }
                }
            },
        }
    }
}

fn check_precedences(
    problem: &SchedulingProblem,
    by_task: &BTreeMap<&str, &ScheduledTask>,
    violations: &mut Vec<String>,
) {
    for (pred, succ) in problem.precedence_pairs() {
        let (Some(p), Some(s)) = (by_task.get(pred.1.as_str()), by_task.get(succ.1.as_str()))
        else {
            continue;
        };
        if p.end_tu > s.start_tu {
            violations.push(format!(
                "precedence {} -> {} violated: end {} > start {}",
                pred.1, succ.1, p.end_tu, s.start_tu
            ));
        }
    }
}

/// Maximum number of simultaneously running intervals
fn peak_overlap(intervals: &[(i64, i64)]) -> i64 {
    let mut events: Vec<(i64, i64)> = Vec::new();
    for &(start, end) in intervals {
        if end > start {
            events.push((start, 1));
            events.push((end, -1));
        }
    }
    events.sort_unstable();
    let mut current = 0i64;
    let mut peak = 0i64;
    for (_, delta) in events {
        current += delta;
        peak = peak.max(current);
    }
    peak
}

fn check_machine_capacity(
    problem: &SchedulingProblem,
    solution: &Solution,
    violations: &mut Vec<String>,
) {
    for machine in &problem.machines {
        let intervals: Vec<(i64, i64)> = solution
            .schedule
            .iter()
            .filter(|t| t.machine_id.as_deref() == Some(machine.resource_id.as_str()))
            .map(|t| (t.start_tu, t.end_tu))
            .collect();
        let peak = peak_overlap(&intervals);
        if peak > machine.capacity {
            violations.push(format!(
                "machine {} peak load {peak} exceeds capacity {}",
                machine.resource_id, machine.capacity
            ));
        }
    }
}

fn check_cell_limits(
    problem: &SchedulingProblem,
    solution: &Solution,
    wip_overrides: &BTreeMap<CellId, i64>,
    violations: &mut Vec<String>,
) {
    for cell in &problem.work_cells {
        let members: Vec<String> = problem
            .machines_in_cell(&cell.cell_id)
            .into_iter()
            .map(|m| m.resource_id.clone())
            .collect();
        if members.is_empty() {
            continue;
        }
        let intervals: Vec<(i64, i64)> = solution
            .schedule
            .iter()
            .filter(|t| {
                t.machine_id
                    .as_deref()
                    .map(|m| members.iter().any(|member| member == m))
                    .unwrap_or(false)
            })
            .map(|t| (t.start_tu, t.end_tu))
            .collect();
        let peak = peak_overlap(&intervals);

        if cell.capacity < members.len() as i64 && peak > cell.capacity {
            violations.push(format!(
                "cell {} peak activity {peak} exceeds capacity {}",
                cell.cell_id, cell.capacity
            ));
        }

        let wip = wip_overrides
            .get(&cell.cell_id)
            .copied()
            .unwrap_or_else(|| cell.effective_wip_limit());
        if wip < WIP_UNLIMITED && peak > wip {
            violations.push(format!(
                "cell {} peak WIP {peak} exceeds limit {wip}",
                cell.cell_id
            ));
        }
    }
}

fn check_setup_gaps(solution: &Solution, setups: &SetupTimes, violations: &mut Vec<String>) {
    let mut by_machine: BTreeMap<&str, Vec<&ScheduledTask>> = BTreeMap::new();
    for task in &solution.schedule {
        if let Some(machine) = task.machine_id.as_deref() {
            by_machine.entry(machine).or_default().push(task);
        }
    }
    for (machine, mut tasks) in by_machine {
        tasks.sort_by_key(|t| t.start_tu);
        for pair in tasks.windows(2) {
            let gap = setups.get_expanded(&pair[0].task_id, &pair[1].task_id, machine);
            if gap > 0 && pair[1].start_tu < pair[0].end_tu + gap {
                violations.push(format!(
                    "setup gap on {machine}: {} -> {} needs {gap} units",
                    pair[0].task_id, pair[1].task_id
                ));
            }
        }
    }
}

fn check_unattended(
    problem: &SchedulingProblem,
    by_task: &BTreeMap<&str, &ScheduledTask>,
    violations: &mut Vec<String>,
) {
    for task in problem.expanded_tasks() {
        if !task.is_unattended() {
            continue;
        }
        let Some(entry) = by_task.get(task.task_id.as_str()) else { continue };

        if task.is_setup() {
            let in_window = (0..5).any(|day| {
                let day_start = day * UNITS_PER_DAY;
                entry.start_tu >= day_start + BUSINESS_DAY_START_TU
                    && entry.start_tu < day_start + UNITS_PER_DAY
                    && entry.end_tu <= day_start + BUSINESS_DAY_END_TU
            });
            if !in_window {
                violations.push(format!(
                    "unattended setup {} at [{}, {}] outside weekday business hours",
                    task.task_id, entry.start_tu, entry.end_tu
                ));
            }
        }
    }

    for (entity, _) in problem.due_dates() {
        let tasks = problem.entity_tasks(&entity);
        let setup_end = tasks
            .iter()
            .filter(|t| t.is_unattended() && t.is_setup())
            .filter_map(|t| by_task.get(t.task_id.as_str()).map(|e| e.end_tu))
            .max();
        let Some(setup_end) = setup_end else { continue };
        for exec in tasks.iter().filter(|t| t.is_unattended() && !t.is_setup()) {
            if let Some(entry) = by_task.get(exec.task_id.as_str()) {
                if entry.start_tu < setup_end {
                    violations.push(format!(
                        "unattended execution {} starts before its setup ends",
                        exec.task_id
                    ));
                }
            }
        }
    }
}

fn check_operators(
    problem: &SchedulingProblem,
    by_task: &BTreeMap<&str, &ScheduledTask>,
    violations: &mut Vec<String>,
) {
    if problem.operators.is_empty() {
        return;
    }
    for task in problem.expanded_tasks() {
        let Some(entry) = by_task.get(task.task_id.as_str()) else { continue };
        let assigned = entry.operator_ids.len() as i64;
        if assigned < task.min_operators() || assigned > task.max_operators() {
            violations.push(format!(
                "task {} staffed with {assigned} operators outside [{}, {}]",
                task.task_id,
                task.min_operators(),
                task.max_operators()
            ));
        }

        for req in problem.skill_requirements_for(task.requirement_id()) {
            if !req.is_mandatory {
                continue;
            }
            let covering = entry
                .operator_ids
                .iter()
                .filter(|op| {
                    problem
                        .get_operator(op)
                        .is_some_and(|o| o.has_skill(&req.skill_id, req.required_level))
                })
                .count() as i64;
            if covering < req.operators_needed {
                violations.push(format!(
                    "task {} covers skill {} with {covering} of {} operators",
                    task.task_id, req.skill_id, req.operators_needed
                ));
            }
        }
    }

    // one operator never works two overlapping tasks
    let mut per_operator: BTreeMap<&str, Vec<(i64, i64)>> = BTreeMap::new();
    for entry in by_task.values() {
        for op in &entry.operator_ids {
            per_operator
                .entry(op.as_str())
                .or_default()
                .push((entry.start_tu, entry.end_tu));
        }
    }
    for (op, intervals) in per_operator {
        if peak_overlap(&intervals) > 1 {
            violations.push(format!("operator {op} has overlapping assignments"));
        }
    }
}

fn check_shifts(
    problem: &SchedulingProblem,
    solution: &Solution,
    violations: &mut Vec<String>,
) {
    if problem.operator_shifts.is_empty() {
        return;
    }
    for entry in &solution.schedule {
        for op in &entry.operator_ids {
            let fits = problem.shifts_for(op).iter().any(|shift| {
                let day_offset = problem.grid.day_index(shift.shift_date) * UNITS_PER_DAY;
                entry.start_tu >= day_offset + shift.start_tu
                    && entry.end_tu <= day_offset + shift.end_tu
            });
            if !fits {
                violations.push(format!(
                    "task {} assignment to {op} fits no available shift",
                    entry.task_id
                ));
            }
        }
    }
}

fn check_symmetry(
    problem: &SchedulingProblem,
    by_task: &BTreeMap<&str, &ScheduledTask>,
    violations: &mut Vec<String>,
) {
    let Some(pattern) = &problem.pattern else { return };
    if problem.instances.len() < 2 || !problem.instances_interchangeable() {
        return;
    }
    let mut instance_ids: Vec<&str> = problem
        .instances
        .iter()
        .map(|i| i.instance_id.as_str())
        .collect();
    instance_ids.sort_unstable();

    for ptask in &pattern.pattern_tasks {
        for window in instance_ids.windows(2) {
            let first = takt_core::instance_task_id(window[0], &ptask.pattern_task_id);
            let second = takt_core::instance_task_id(window[1], &ptask.pattern_task_id);
            let (Some(a), Some(b)) =
                (by_task.get(first.as_str()), by_task.get(second.as_str()))
            else {
                continue;
            };
            if a.start_tu > b.start_tu {
                violations.push(format!(
                    "symmetry violated for pattern task {}: {} starts after {}",
                    ptask.pattern_task_id, window[0], window[1]
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{SolveStatus, SolverStats};
    use takt_core::time::units_to_minutes;
    use takt_core::{Job, Machine, Precedence, Task, TaskMode};

    fn problem() -> SchedulingProblem {
        let job = Job::new("j1", "job")
            .task(Task::new("a", "j1").mode(TaskMode::new("mo1", "a", "m1", 30)))
            .task(Task::new("b", "j1").mode(TaskMode::new("mo2", "b", "m1", 45)));
        SchedulingProblem::new(
            vec![job],
            vec![Machine::new("m1", "c1", "Machine 1")],
            vec![],
            vec![Precedence::new("a", "b")],
        )
    }

    fn entry(job: &str, id: &str, machine: &str, start: i64, end: i64) -> ScheduledTask {
        let grid = takt_core::time::TimeGrid::default();
        ScheduledTask {
            job_id: job.to_string(),
            task_id: id.to_string(),
            task_name: id.to_string(),
            pattern_task_id: None,
            start_tu: start,
            end_tu: end,
            duration_minutes: units_to_minutes(end - start),
            machine_id: Some(machine.to_string()),
            machine_name: None,
            operator_ids: Vec::new(),
            datetime_start: grid.datetime_at(start),
            datetime_end: grid.datetime_at(end),
        }
    }

    fn solution(tasks: Vec<ScheduledTask>) -> Solution {
        let makespan = tasks.iter().map(|t| t.end_tu).max().unwrap_or(0);
        Solution {
            status: SolveStatus::Optimal,
            schedule: tasks,
            makespan,
            makespan_hours: 0.0,
            total_lateness_minutes: 0,
            setup_time_metrics: Default::default(),
            machine_utilization: BTreeMap::new(),
            solver_stats: SolverStats::default(),
        }
    }

    #[test]
    fn accepts_a_consistent_schedule() {
        let sol = solution(vec![
            entry("j1", "a", "m1", 0, 2),
            entry("j1", "b", "m1", 2, 5),
        ]);
        let violations =
            verify_solution(&problem(), &SetupTimes::new(), &BTreeMap::new(), &sol);
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn detects_precedence_and_overlap_violations() {
        // b starts before a ends, and both overlap on m1
        let sol = solution(vec![
            entry("j1", "a", "m1", 0, 2),
            entry("j1", "b", "m1", 1, 4),
        ]);
        let violations =
            verify_solution(&problem(), &SetupTimes::new(), &BTreeMap::new(), &sol);
        assert!(violations.iter().any(|v| v.contains("precedence")));
        assert!(violations.iter().any(|v| v.contains("peak load")));
    }

    #[test]
    fn detects_missing_setup_gap() {
        let mut setups = SetupTimes::new();
        setups.insert("a", "b", "m1", 2);
        let sol = solution(vec![
            entry("j1", "a", "m1", 0, 2),
            entry("j1", "b", "m1", 3, 6), // needs start >= 4
        ]);
        let violations = verify_solution(&problem(), &setups, &BTreeMap::new(), &sol);
        assert!(violations.iter().any(|v| v.contains("setup gap")));
    }

    #[test]
    fn detects_wrong_mode_duration() {
        let sol = solution(vec![
            entry("j1", "a", "m1", 0, 4), // mode says 2 units
            entry("j1", "b", "m1", 4, 7),
        ]);
        let violations =
            verify_solution(&problem(), &SetupTimes::new(), &BTreeMap::new(), &sol);
        assert!(violations.iter().any(|v| v.contains("does not match mode")));
    }

    #[test]
    fn non_solution_statuses_verify_empty() {
        let mut sol = solution(vec![]);
        sol.status = SolveStatus::Infeasible;
        assert!(verify_solution(&problem(), &SetupTimes::new(), &BTreeMap::new(), &sol)
            .is_empty());
    }
}
