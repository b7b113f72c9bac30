//! Variable Builder
//!
//! Creates the CP decision variables for every expanded task: start, end
//! and duration integers plus the interval they form, one assignment
//! boolean per (task, eligible machine), and one per (task, qualified
//! operator) when the problem carries operator data.
//!
//! Variables are created in entity-ID order, so two builds of the same
//! problem produce identical variable and constraint counts.

use std::collections::BTreeMap;

use takt_core::problem::TaskKey;
use takt_core::time::{self, minutes_to_units};
use takt_core::{MachineId, OperatorId, SchedulingProblem};

use crate::model::{CpModel, Var};

/// Start/end/duration variables of one task; the interval is the triple
#[derive(Clone, Copy, Debug)]
pub struct TaskVars {
    pub start: Var,
    pub end: Var,
    pub duration: Var,
}

/// All decision variables of a compiled model
pub struct VariableStore {
    pub horizon: i64,
    /// Task keys in creation order
    pub task_keys: Vec<TaskKey>,
    pub tasks: BTreeMap<TaskKey, TaskVars>,
    /// Duration domain upper bound per task, for big-M widths
    pub duration_ub: BTreeMap<TaskKey, i64>,
    /// Assignment booleans per (task, eligible machine)
    pub assigned: BTreeMap<(TaskKey, MachineId), Var>,
    /// Candidate tasks per machine, in task creation order
    pub machine_candidates: BTreeMap<MachineId, Vec<TaskKey>>,
    /// Assignment booleans per (task, qualified operator)
    pub op_assigned: BTreeMap<(TaskKey, OperatorId), Var>,
    /// Candidate tasks per operator, in task creation order
    pub operator_candidates: BTreeMap<OperatorId, Vec<TaskKey>>,
    /// Shared sequencing booleans per unordered task pair; 1 means the
    /// canonically-first task precedes the other in time
    order: BTreeMap<(TaskKey, TaskKey), Var>,
}

impl VariableStore {
    /// The sequencing boolean for an unordered pair, created on first
    /// use. Returns `(var, a_is_first)`: when `a_is_first` the variable
    /// being 1 means `a` precedes `b`, otherwise it means `b` precedes
    /// `a`.
    pub fn order_var(&mut self, model: &mut CpModel, a: &TaskKey, b: &TaskKey) -> (Var, bool) {
        let a_is_first = a <= b;
        let (first, second) = if a_is_first {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        let var = *self
            .order
            .entry((first, second))
            .or_insert_with(|| model.bool_var());
        (var, a_is_first)
    }

    /// Eligible machines of a task that have an assignment boolean, in
    /// creation order
    pub fn machines_of(&self, key: &TaskKey) -> Vec<MachineId> {
        self.assigned
            .keys()
            .filter(|(k, _)| k == key)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

/// Create every decision variable for the problem.
pub fn build_variables(
    model: &mut CpModel,
    problem: &SchedulingProblem,
    horizon: i64,
) -> VariableStore {
    let mut store = VariableStore {
        horizon,
        task_keys: Vec::new(),
        tasks: BTreeMap::new(),
        duration_ub: BTreeMap::new(),
        assigned: BTreeMap::new(),
        machine_candidates: BTreeMap::new(),
        op_assigned: BTreeMap::new(),
        operator_candidates: BTreeMap::new(),
        order: BTreeMap::new(),
    };

    // Due dates in units per entity, for latest-start pre-bounds
    let due_units: BTreeMap<String, i64> = problem
        .due_dates()
        .into_iter()
        .filter_map(|(entity, due)| due.map(|d| (entity, problem.grid.units_from_base(d))))
        .collect();

    // Suffix sums of minimum work per entity order, keyed by task
    let mut remaining_work: BTreeMap<TaskKey, i64> = BTreeMap::new();
    for (entity, _) in problem.due_dates() {
        let tasks = problem.entity_tasks(&entity);
        let mut suffix = 0i64;
        for task in tasks.iter().rev() {
            suffix += minutes_to_units(task.min_duration_minutes());
            remaining_work.insert(task.key(), suffix);
        }
    }

    let has_operators = !problem.operators.is_empty();

    for task in problem.expanded_tasks() {
        let key = task.key();
        let min_units = minutes_to_units(task.min_duration_minutes());
        let max_units = minutes_to_units(task.max_duration_minutes());

        let start_ub = due_units
            .get(&task.entity_id)
            .and_then(|&due| {
                time::calculate_latest_start(
                    due,
                    remaining_work.get(&key).copied().unwrap_or(min_units),
                    min_units,
                    horizon,
                )
            })
            .unwrap_or(horizon - min_units)
            .max(0);

        let vars = TaskVars {
            start: model.int_var(0, start_ub),
            duration: model.int_var(min_units, max_units),
            end: model.int_var(0, horizon),
        };
        store.tasks.insert(key.clone(), vars);
        store.duration_ub.insert(key.clone(), max_units);
        store.task_keys.push(key.clone());

        // One assignment boolean per distinct eligible machine
        for machine_id in task.eligible_machines() {
            let slot = (key.clone(), machine_id.clone());
            if store.assigned.contains_key(&slot) {
                continue;
            }
            store.assigned.insert(slot, model.bool_var());
            store
                .machine_candidates
                .entry(machine_id)
                .or_default()
                .push(key.clone());
        }

        if has_operators {
            for operator in problem.qualified_operators(task.requirement_id()) {
                let slot = (key.clone(), operator.operator_id.clone());
                store.op_assigned.insert(slot, model.bool_var());
                store
                    .operator_candidates
                    .entry(operator.operator_id.clone())
                    .or_default()
                    .push(key.clone());
            }
        }
    }

    tracing::debug!(
        tasks = store.tasks.len(),
        machine_assignments = store.assigned.len(),
        operator_assignments = store.op_assigned.len(),
        horizon,
        "decision variables created"
    );

    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use takt_core::{Job, Machine, Task, TaskMode};

    fn problem() -> SchedulingProblem {
        let job = Job::new("j1", "job")
            .task(
                Task::new("a", "j1")
                    .mode(TaskMode::new("mo1", "a", "m1", 30))
                    .mode(TaskMode::new("mo2", "a", "m2", 45)),
            )
            .task(Task::new("b", "j1").mode(TaskMode::new("mo3", "b", "m1", 60)));
        SchedulingProblem::new(
            vec![job],
            vec![
                Machine::new("m1", "c1", "Machine 1"),
                Machine::new("m2", "c1", "Machine 2"),
            ],
            vec![],
            vec![],
        )
    }

    #[test]
    fn builds_interval_and_assignment_variables() {
        let mut model = CpModel::new();
        let store = build_variables(&mut model, &problem(), 100);

        assert_eq!(store.tasks.len(), 2);
        assert_eq!(store.assigned.len(), 3); // a on m1/m2, b on m1
        assert!(store.op_assigned.is_empty());
        assert_eq!(
            store.machine_candidates.get("m1").map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn latest_start_bounds_follow_due_dates() {
        let mut p = problem();
        // due at unit 40; job needs 2 + 4 units of minimum work
        let due = p.grid.datetime_at(40);
        p.jobs[0].due_date = Some(due);
        p.reindex();

        let mut model = CpModel::new();
        let store = build_variables(&mut model, &p, 100);
        // bounds are applied through variable domains; the build stays
        // deterministic with or without them
        assert_eq!(store.tasks.len(), 2);
    }

    #[test]
    fn order_vars_are_shared_per_unordered_pair() {
        let mut model = CpModel::new();
        let mut store = build_variables(&mut model, &problem(), 100);

        let a = ("j1".to_string(), "a".to_string());
        let b = ("j1".to_string(), "b".to_string());
        let before = model.var_count();
        let (v1, a_first) = store.order_var(&mut model, &a, &b);
        let (v2, b_first) = store.order_var(&mut model, &b, &a);
        assert_eq!(v1, v2);
        assert!(a_first);
        assert!(!b_first);
        assert_eq!(model.var_count(), before + 1);
    }
}
