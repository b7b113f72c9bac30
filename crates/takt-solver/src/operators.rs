//! Constraint Compiler: Operator Families
//!
//! Skill matching with multi-operator coverage, per-operator no-overlap,
//! shift calendars with optional overtime, and the task/pattern
//! efficiency aggregates.
//!
//! These families are compiled only when the problem carries operator
//! data; an operator-free problem keeps `min_operators` dormant instead
//! of becoming trivially infeasible.

use std::collections::BTreeMap;

use takt_core::problem::TaskKey;
use takt_core::time::UNITS_PER_DAY;
use takt_core::{OperatorId, SchedulingProblem};

use crate::model::{CpModel, Var};
use crate::vars::VariableStore;

/// Auxiliary variables owned by the operator families
pub struct OperatorVars {
    /// Per-task efficiency: sum of assigned operators' efficiency
    /// multipliers scaled by 100
    pub efficiency: BTreeMap<TaskKey, Var>,
    /// Pattern-mode aggregate efficiency per pattern task
    pub pattern_efficiency: BTreeMap<String, Var>,
    /// Linearized `duration * op_assigned` per (task, operator)
    pub busy: BTreeMap<(TaskKey, OperatorId), Var>,
    /// Overtime units per operator (only with shift calendars)
    pub overtime: BTreeMap<OperatorId, Var>,
}

/// Compile every operator family. Returns `None` when the problem has no
/// operators.
pub fn add_operator_constraints(
    model: &mut CpModel,
    store: &mut VariableStore,
    problem: &SchedulingProblem,
) -> Option<OperatorVars> {
    if problem.operators.is_empty() {
        return None;
    }

    let mut vars = OperatorVars {
        efficiency: BTreeMap::new(),
        pattern_efficiency: BTreeMap::new(),
        busy: BTreeMap::new(),
        overtime: BTreeMap::new(),
    };

    add_skill_constraints(model, store, problem);
    add_operator_no_overlap(model, store);
    add_shift_constraints(model, store, problem, &mut vars);
    add_efficiency_variables(model, store, problem, &mut vars);

    Some(vars)
}

/// Get or create the linearized busy-time variable for a (task,
/// operator) assignment: equals the task duration when assigned, 0
/// otherwise (exact under minimization, bounded both ways).
pub fn busy_var(
    model: &mut CpModel,
    store: &VariableStore,
    vars: &mut OperatorVars,
    key: &TaskKey,
    operator_id: &str,
) -> Var {
    if let Some(&existing) = vars.busy.get(&(key.clone(), operator_id.to_string())) {
        return existing;
    }
    let assigned = store.op_assigned[&(key.clone(), operator_id.to_string())];
    let duration = store.tasks[key].duration;
    let big_m = store.horizon + store.duration_ub[key];

    let busy = model.int_var(0, store.horizon);
    // busy >= duration - M(1 - assigned)
    model.ge(&[(busy, 1), (duration, -1), (assigned, -big_m)], -big_m);
    // busy <= duration
    model.le(&[(busy, 1), (duration, -1)], 0);
    // busy <= M * assigned
    model.le(&[(busy, 1), (assigned, -big_m)], 0);

    vars.busy.insert((key.clone(), operator_id.to_string()), busy);
    busy
}

// ============================================================================
// Skill matching & operator counts
// ============================================================================

fn add_skill_constraints(
    model: &mut CpModel,
    store: &VariableStore,
    problem: &SchedulingProblem,
) {
    let mut emitted = 0usize;

    for task in problem.expanded_tasks() {
        let key = task.key();
        let assignments: Vec<(OperatorId, Var)> = store
            .op_assigned
            .iter()
            .filter(|((k, _), _)| *k == key)
            .map(|((_, op), &var)| (op.clone(), var))
            .collect();

        let min_ops = task.min_operators();
        let max_ops = task.max_operators();

        if assignments.is_empty() {
            if min_ops >= 1 {
                // no qualified operator exists: the task is unstaffable
                let impossible = model.int_var(0, 0);
                model.ge(&[(impossible, 1)], min_ops);
                emitted += 1;
            }
            continue;
        }

        let count_terms: Vec<(Var, i64)> =
            assignments.iter().map(|&(_, var)| (var, 1)).collect();
        model.ge(&count_terms, min_ops);
        model.le(&count_terms, max_ops);
        emitted += 2;

        // per-skill coverage for mandatory requirements
        for req in problem.skill_requirements_for(task.requirement_id()) {
            if !req.is_mandatory {
                continue;
            }
            let covering: Vec<(Var, i64)> = assignments
                .iter()
                .filter(|(op, _)| {
                    problem
                        .get_operator(op)
                        .is_some_and(|o| o.has_skill(&req.skill_id, req.required_level))
                })
                .map(|&(_, var)| (var, 1))
                .collect();
            if covering.is_empty() {
                let impossible = model.int_var(0, 0);
                model.ge(&[(impossible, 1)], req.operators_needed);
            } else {
                model.ge(&covering, req.operators_needed);
            }
            emitted += 1;
        }
    }

    tracing::debug!(constraints = emitted, "skill matching emitted");
}

// ============================================================================
// Operator no-overlap
// ============================================================================

fn add_operator_no_overlap(model: &mut CpModel, store: &mut VariableStore) {
    let candidates = store.operator_candidates.clone();
    for (operator_id, tasks) in &candidates {
        for (i, a) in tasks.iter().enumerate() {
            for b in &tasks[i + 1..] {
                let gate_a = store.op_assigned[&(a.clone(), operator_id.clone())];
                let gate_b = store.op_assigned[&(b.clone(), operator_id.clone())];
                pairwise_no_overlap(model, store, a, gate_a, b, gate_b);
            }
        }
    }
}

/// Disjunctive pair without gaps, gated on both participation booleans
fn pairwise_no_overlap(
    model: &mut CpModel,
    store: &mut VariableStore,
    a: &TaskKey,
    gate_a: Var,
    b: &TaskKey,
    gate_b: Var,
) {
    let (x, gate_x, y, gate_y) = if a <= b {
        (a, gate_a, b, gate_b)
    } else {
        (b, gate_b, a, gate_a)
    };
    let (order, _) = store.order_var(model, x, y);
    let tx = store.tasks[x];
    let ty = store.tasks[y];
    let big_m = store.horizon + 1;

    model.ge(
        &[
            (ty.start, 1),
            (tx.end, -1),
            (order, -big_m),
            (gate_x, -big_m),
            (gate_y, -big_m),
        ],
        -3 * big_m,
    );
    model.ge(
        &[
            (tx.start, 1),
            (ty.end, -1),
            (order, big_m),
            (gate_x, -big_m),
            (gate_y, -big_m),
        ],
        -2 * big_m,
    );
}

// ============================================================================
// Shift calendars & overtime
// ============================================================================

fn add_shift_constraints(
    model: &mut CpModel,
    store: &VariableStore,
    problem: &SchedulingProblem,
    vars: &mut OperatorVars,
) {
    if problem.operator_shifts.is_empty() {
        return;
    }
    let big_m = store.horizon;
    let mut emitted = 0usize;

    let op_assignments: Vec<(TaskKey, OperatorId, Var)> = store
        .op_assigned
        .iter()
        .map(|((key, op), &var)| (key.clone(), op.clone(), var))
        .collect();

    for (key, operator_id, assigned) in &op_assignments {
        let shifts = problem.shifts_for(operator_id);
        if shifts.is_empty() {
            model.fix(*assigned, 0);
            emitted += 1;
            continue;
        }

        let task = store.tasks[key];
        let mut fit_terms: Vec<(Var, i64)> = Vec::new();
        for shift in &shifts {
            let day_offset = problem.grid.day_index(shift.shift_date) * UNITS_PER_DAY;
            let window_start = day_offset + shift.start_tu;
            let window_end = day_offset + shift.end_tu;
            if window_start < 0 {
                continue;
            }

            let fits = model.bool_var();
            // fits = 1 implies the interval lies inside the window
            model.ge(&[(task.start, 1), (fits, -window_start)], 0);
            model.le(&[(task.end, 1), (fits, big_m)], window_end + big_m);
            fit_terms.push((fits, 1));
            emitted += 2;
        }

        if fit_terms.is_empty() {
            model.fix(*assigned, 0);
            emitted += 1;
            continue;
        }
        // assigned implies at least one fitting shift
        fit_terms.push((*assigned, -1));
        model.ge(&fit_terms, 0);
        emitted += 1;
    }

    // per-operator overtime against the regular shift total
    for operator in &problem.operators {
        let shifts = problem.shifts_for(&operator.operator_id);
        if shifts.is_empty() {
            continue;
        }
        let regular_units: i64 = shifts.iter().map(|s| s.end_tu - s.start_tu).sum();
        let overtime_cap: i64 = shifts
            .iter()
            .filter(|s| s.overtime_allowed)
            .map(|s| (s.max_overtime_hours * 4.0).floor() as i64)
            .sum();

        let candidate_tasks: Vec<TaskKey> = store
            .operator_candidates
            .get(&operator.operator_id)
            .cloned()
            .unwrap_or_default();
        if candidate_tasks.is_empty() {
            continue;
        }

        let overtime = model.int_var(0, overtime_cap);
        let mut terms: Vec<(Var, i64)> = vec![(overtime, 1)];
        for key in &candidate_tasks {
            let busy = busy_var(model, store, vars, key, &operator.operator_id);
            terms.push((busy, -1));
        }
        // overtime >= total assigned work - regular shift units
        model.ge(&terms, -regular_units);
        vars.overtime.insert(operator.operator_id.clone(), overtime);
        emitted += 1;
    }

    tracing::debug!(constraints = emitted, "shift calendar emitted");
}

// ============================================================================
// Efficiency aggregation
// ============================================================================

fn add_efficiency_variables(
    model: &mut CpModel,
    store: &VariableStore,
    problem: &SchedulingProblem,
    vars: &mut OperatorVars,
) {
    for task in problem.expanded_tasks() {
        let key = task.key();
        let assignments: Vec<(OperatorId, Var)> = store
            .op_assigned
            .iter()
            .filter(|((k, _), _)| *k == key)
            .map(|((_, op), &var)| (op.clone(), var))
            .collect();
        if assignments.is_empty() {
            continue;
        }

        let mut coefficients: Vec<(Var, i64)> = Vec::new();
        let mut upper = 0i64;
        for (op, var) in &assignments {
            let multiplier = problem.operator_task_efficiency(op, task.requirement_id());
            let scaled = (multiplier * 100.0).round() as i64;
            coefficients.push((*var, -scaled));
            upper += scaled;
        }

        let efficiency = model.int_var(0, upper.max(0));
        let mut terms = vec![(efficiency, 1)];
        terms.extend(coefficients);
        model.eq(&terms, 0);
        vars.efficiency.insert(key, efficiency);
    }

    // pattern-mode aggregates enable balancing across identical instances
    if let Some(pattern) = &problem.pattern {
        for ptask in &pattern.pattern_tasks {
            let members: Vec<Var> = problem
                .instances
                .iter()
                .filter_map(|instance| {
                    let key = (
                        instance.instance_id.clone(),
                        takt_core::instance_task_id(
                            &instance.instance_id,
                            &ptask.pattern_task_id,
                        ),
                    );
                    vars.efficiency.get(&key).copied()
                })
                .collect();
            if members.is_empty() {
                continue;
            }
            let upper = members.len() as i64 * 200;
            let aggregate = model.int_var(0, upper);
            let mut terms = vec![(aggregate, 1)];
            for member in members {
                terms.push((member, -1));
            }
            model.eq(&terms, 0);
            vars.pattern_efficiency
                .insert(ptask.pattern_task_id.clone(), aggregate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::build_variables;
    use takt_core::{Job, Machine, Operator, Skill, SkillLevel, Task, TaskMode,
        TaskSkillRequirement};

    fn staffed_problem() -> SchedulingProblem {
        let job = Job::new("j1", "job")
            .task(Task::new("a", "j1").mode(TaskMode::new("mo1", "a", "m1", 30)))
            .task(Task::new("b", "j1").mode(TaskMode::new("mo2", "b", "m1", 30)));
        SchedulingProblem::new(
            vec![job],
            vec![Machine::new("m1", "c1", "Machine 1")],
            vec![],
            vec![],
        )
        .with_operators(
            vec![
                Operator::new("op1", "Sam").skill("weld", SkillLevel::Proficient),
                Operator::new("op2", "Kit").skill("weld", SkillLevel::Novice),
            ],
            vec![Skill::new("weld", "Welding")],
            vec![TaskSkillRequirement::new("a", "weld", SkillLevel::Competent)],
            vec![],
        )
    }

    #[test]
    fn operator_families_skip_without_operators() {
        let problem = SchedulingProblem::new(
            vec![Job::new("j1", "job")
                .task(Task::new("a", "j1").mode(TaskMode::new("mo1", "a", "m1", 30)))],
            vec![Machine::new("m1", "c1", "Machine 1")],
            vec![],
            vec![],
        );
        let mut model = CpModel::new();
        let mut store = build_variables(&mut model, &problem, 100);
        assert!(add_operator_constraints(&mut model, &mut store, &problem).is_none());
    }

    #[test]
    fn qualified_operators_get_assignment_variables() {
        let problem = staffed_problem();
        let mut model = CpModel::new();
        let mut store = build_variables(&mut model, &problem, 100);

        // task a: only op1 qualifies (Competent needed); task b: both
        assert!(store
            .op_assigned
            .contains_key(&(("j1".into(), "a".into()), "op1".into())));
        assert!(!store
            .op_assigned
            .contains_key(&(("j1".into(), "a".into()), "op2".into())));
        assert_eq!(store.operator_candidates["op2"].len(), 1);

        let vars = add_operator_constraints(&mut model, &mut store, &problem).unwrap();
        assert_eq!(vars.efficiency.len(), 2);
        assert!(vars.overtime.is_empty()); // no shifts defined
    }

    #[test]
    fn busy_var_is_memoized() {
        let problem = staffed_problem();
        let mut model = CpModel::new();
        let mut store = build_variables(&mut model, &problem, 100);
        let mut vars = add_operator_constraints(&mut model, &mut store, &problem).unwrap();

        let key = ("j1".to_string(), "a".to_string());
        let first = busy_var(&mut model, &store, &mut vars, &key, "op1");
        let count = model.var_count();
        let second = busy_var(&mut model, &store, &mut vars, &key, "op1");
        assert_eq!(first, second);
        assert_eq!(model.var_count(), count);
    }
}
