//! Objective Builder
//!
//! Constructs one expression variable per objective kind over the
//! auxiliary variables the constraint families produced, and composes
//! them for the configured strategy. Minimized expressions are tied
//! one-sidedly (`v >= expr`), which is exact at the optimum; maximized
//! expressions use the mirror (`v <= expr`). Reported objective values
//! are always recomputed from the extracted schedule, never read off
//! these variables.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use takt_core::objective::{MultiObjectiveConfig, ObjectiveKind};
use takt_core::problem::TaskKey;
use takt_core::time::minutes_to_units;
use takt_core::{MachineId, SchedulingProblem, SetupTimes};

use crate::constraints::{CellVars, DueDateVars, TimingVars, UnattendedVars};
use crate::model::{CpModel, Direction, Var};
use crate::operators::{busy_var, OperatorVars};
use crate::vars::VariableStore;

/// Auxiliary variables handed from the constraint compiler to the
/// objective builder
pub struct AuxVars {
    pub timing: TimingVars,
    pub due: DueDateVars,
    pub unattended: UnattendedVars,
    pub cells: CellVars,
    pub operators: Option<OperatorVars>,
}

/// Memoized objective expressions of one compiled model
#[derive(Default)]
pub struct ObjectiveMemo {
    built: BTreeMap<ObjectiveKind, Var>,
    machine_busy: BTreeMap<(TaskKey, MachineId), Var>,
}

/// Optimisation direction of an objective kind
pub fn direction_of(kind: ObjectiveKind) -> Direction {
    if kind.is_maximization() {
        Direction::Maximise
    } else {
        Direction::Minimise
    }
}

/// Build (or reuse) the expression variable for one objective kind.
pub fn objective_var(
    model: &mut CpModel,
    store: &mut VariableStore,
    problem: &SchedulingProblem,
    setups: &SetupTimes,
    aux: &mut AuxVars,
    memo: &mut ObjectiveMemo,
    kind: ObjectiveKind,
) -> Var {
    if let Some(&var) = memo.built.get(&kind) {
        return var;
    }
    let var = match kind {
        ObjectiveKind::MinimizeMakespan => makespan_objective(model, store, aux),
        ObjectiveKind::MinimizeTotalLateness | ObjectiveKind::MinimizeTotalTardiness => {
            aux.due.total_lateness
        }
        ObjectiveKind::MinimizeMaximumLateness => aux.due.max_lateness,
        ObjectiveKind::MinimizeWeightedCompletionTime => {
            completion_time_objective(model, store, aux)
        }
        ObjectiveKind::MinimizeTotalCost => {
            total_cost_objective(model, store, problem, aux, memo)
        }
        ObjectiveKind::MaximizeMachineUtilization => {
            utilization_objective(model, store, problem, memo)
        }
        ObjectiveKind::MinimizeSetupTime => {
            setup_time_objective(model, store, problem, setups)
        }
    };
    memo.built.insert(kind, var);
    var
}

/// Makespan, net of the weekend-start reward when long unattended
/// execution tasks exist
fn makespan_objective(model: &mut CpModel, store: &VariableStore, aux: &AuxVars) -> Var {
    let makespan = aux.timing.makespan;
    let Some(weekend) = aux.unattended.weekend_starts else {
        return makespan;
    };
    let bonus_ub = store.task_keys.len() as i64 * 2;
    let objective = model.int_var(-bonus_ub, store.horizon);
    model.eq(&[(objective, 1), (makespan, -1), (weekend, 1)], 0);
    objective
}

/// Sum of per-entity completion times (unit job weights)
fn completion_time_objective(
    model: &mut CpModel,
    store: &VariableStore,
    aux: &AuxVars,
) -> Var {
    let upper = store.horizon * aux.due.completion.len().max(1) as i64;
    let total = model.int_var(0, upper);
    let mut terms: Vec<(Var, i64)> = vec![(total, 1)];
    for &completion in aux.due.completion.values() {
        terms.push((completion, -1));
    }
    if aux.due.completion.is_empty() {
        model.fix(total, 0);
    } else {
        model.ge(&terms, 0);
    }
    total
}

/// Linearized busy time of a (task, machine) assignment
fn machine_busy_var(
    model: &mut CpModel,
    store: &VariableStore,
    memo: &mut ObjectiveMemo,
    key: &TaskKey,
    machine_id: &str,
) -> Var {
    if let Some(&existing) = memo.machine_busy.get(&(key.clone(), machine_id.to_string())) {
        return existing;
    }
    let assigned = store.assigned[&(key.clone(), machine_id.to_string())];
    let duration = store.tasks[key].duration;
    let big_m = store.horizon + store.duration_ub[key];

    let busy = model.int_var(0, store.horizon);
    model.ge(&[(busy, 1), (duration, -1), (assigned, -big_m)], -big_m);
    model.le(&[(busy, 1), (duration, -1)], 0);
    model.le(&[(busy, 1), (assigned, -big_m)], 0);

    memo.machine_busy
        .insert((key.clone(), machine_id.to_string()), busy);
    busy
}

/// Cents per time unit from an hourly rate
fn cents_per_unit(rate_per_hour: Decimal) -> i64 {
    (rate_per_hour * Decimal::from(25)).round().to_i64().unwrap_or(0)
}

/// Machine plus operator cost in cents, from linearized busy times
fn total_cost_objective(
    model: &mut CpModel,
    store: &VariableStore,
    problem: &SchedulingProblem,
    aux: &mut AuxVars,
    memo: &mut ObjectiveMemo,
) -> Var {
    let mut terms: Vec<(Var, i64)> = Vec::new();
    let mut upper = 0i64;

    let slots: Vec<(TaskKey, MachineId)> = store.assigned.keys().cloned().collect();
    for (key, machine_id) in slots {
        let Some(machine) = problem.get_machine(&machine_id) else { continue };
        let cents = cents_per_unit(machine.cost_per_hour);
        if cents == 0 {
            continue;
        }
        let busy = machine_busy_var(model, store, memo, &key, &machine_id);
        terms.push((busy, -cents));
        upper += cents * store.horizon;
    }

    if let Some(op_vars) = aux.operators.as_mut() {
        let slots: Vec<(TaskKey, String)> = store.op_assigned.keys().cloned().collect();
        for (key, operator_id) in slots {
            let Some(operator) = problem.get_operator(&operator_id) else { continue };
            let cents = cents_per_unit(operator.hourly_rate);
            if cents == 0 {
                continue;
            }
            let busy = busy_var(model, store, op_vars, &key, &operator_id);
            terms.push((busy, -cents));
            upper += cents * store.horizon;
        }
    }

    let cost = model.int_var(0, upper.max(0));
    if terms.is_empty() {
        model.fix(cost, 0);
    } else {
        let mut ge_terms = vec![(cost, 1)];
        ge_terms.extend(terms);
        model.ge(&ge_terms, 0);
    }
    cost
}

/// Total busy machine time; maximizing it maximizes utilization for a
/// given makespan (the true percentage is a post-hoc ratio)
fn utilization_objective(
    model: &mut CpModel,
    store: &VariableStore,
    problem: &SchedulingProblem,
    memo: &mut ObjectiveMemo,
) -> Var {
    let tasks = crate::constraints::task_table(problem);
    let mut terms: Vec<(Var, i64)> = Vec::new();
    let mut upper = 0i64;

    let slots: Vec<(TaskKey, MachineId)> = store.assigned.keys().cloned().collect();
    for (key, machine_id) in slots {
        let busy = machine_busy_var(model, store, memo, &key, &machine_id);
        terms.push((busy, -1));
        upper += minutes_to_units(tasks[&key].max_duration_minutes());
    }

    let total = model.int_var(0, upper.max(0));
    if terms.is_empty() {
        model.fix(total, 0);
    } else {
        // total <= sum of busy times, exact under maximization
        let mut le_terms = vec![(total, 1)];
        le_terms.extend(terms);
        model.le(&le_terms, 0);
    }
    total
}

/// Upper bound on sequence-dependent setup time: one adjacency indicator
/// per ordered candidate pair sharing a machine
fn setup_time_objective(
    model: &mut CpModel,
    store: &mut VariableStore,
    problem: &SchedulingProblem,
    setups: &SetupTimes,
) -> Var {
    let mut terms: Vec<(Var, i64)> = Vec::new();
    let mut upper = 0i64;

    let machine_candidates = store.machine_candidates.clone();
    for (machine_id, candidates) in &machine_candidates {
        if problem.get_machine(machine_id).is_none() {
            continue;
        }
        for a in candidates {
            for b in candidates {
                if a == b {
                    continue;
                }
                let gap = setups.get_expanded(&a.1, &b.1, machine_id);
                if gap == 0 {
                    continue;
                }
                let gate_a = store.assigned[&(a.clone(), machine_id.clone())];
                let gate_b = store.assigned[&(b.clone(), machine_id.clone())];
                let (order, a_first) = store.order_var(model, a, b);

                // incurred = gate_a AND gate_b AND (a precedes b)
                let incurred = model.bool_var();
                if a_first {
                    model.ge(
                        &[(incurred, 1), (gate_a, -1), (gate_b, -1), (order, -1)],
                        -2,
                    );
                } else {
                    model.ge(
                        &[(incurred, 1), (gate_a, -1), (gate_b, -1), (order, 1)],
                        -1,
                    );
                }
                terms.push((incurred, -gap));
                upper += gap;
            }
        }
    }

    let total = model.int_var(0, upper.max(0));
    if terms.is_empty() {
        model.fix(total, 0);
    } else {
        let mut ge_terms = vec![(total, 1)];
        ge_terms.extend(terms);
        model.ge(&ge_terms, 0);
    }
    total
}

// ============================================================================
// Weighted-sum composition
// ============================================================================

/// Static upper-bound estimate for normalizing one objective
fn objective_scale(kind: ObjectiveKind, store: &VariableStore, problem: &SchedulingProblem) -> i64 {
    let entities = problem.due_dates().len().max(1) as i64;
    let scale = match kind {
        ObjectiveKind::MinimizeMakespan | ObjectiveKind::MinimizeMaximumLateness => store.horizon,
        ObjectiveKind::MinimizeTotalLateness
        | ObjectiveKind::MinimizeTotalTardiness
        | ObjectiveKind::MinimizeWeightedCompletionTime => store.horizon * entities,
        ObjectiveKind::MinimizeTotalCost => {
            let machine_cents: i64 = problem
                .machines
                .iter()
                .map(|m| cents_per_unit(m.cost_per_hour))
                .sum();
            let operator_cents: i64 = problem
                .operators
                .iter()
                .map(|o| cents_per_unit(o.hourly_rate))
                .sum();
            store.horizon * (machine_cents + operator_cents)
        }
        ObjectiveKind::MaximizeMachineUtilization => problem
            .expanded_tasks()
            .iter()
            .map(|t| minutes_to_units(t.max_duration_minutes()))
            .sum(),
        ObjectiveKind::MinimizeSetupTime => store.horizon,
    };
    scale.max(1)
}

/// Integer-scaled normalized weighted sum over the configured objectives.
/// Maximization kinds enter with a negative coefficient, so the composite
/// is always minimized.
pub fn composite_objective(
    model: &mut CpModel,
    store: &mut VariableStore,
    problem: &SchedulingProblem,
    setups: &SetupTimes,
    aux: &mut AuxVars,
    memo: &mut ObjectiveMemo,
    config: &MultiObjectiveConfig,
) -> Var {
    let mut terms: Vec<(Var, i64)> = Vec::new();
    let mut bound = 0i64;

    for objective in &config.objectives {
        let var = objective_var(model, store, problem, setups, aux, memo, objective.kind);
        let scale = objective_scale(objective.kind, store, problem);
        let coefficient =
            (((objective.weight * 100_000.0) / scale as f64).round() as i64).max(1);
        if objective.kind.is_maximization() {
            terms.push((var, coefficient));
        } else {
            terms.push((var, -coefficient));
        }
        bound += coefficient * scale;
    }

    let composite = model.int_var(-bound.max(1), bound.max(1));
    let mut ge_terms = vec![(composite, 1)];
    ge_terms.extend(terms);
    model.ge(&ge_terms, 0);
    composite
}
