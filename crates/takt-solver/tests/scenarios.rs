//! End-to-End Scheduling Scenarios
//!
//! These tests exercise the full pipeline (assemble -> compile -> solve
//! -> extract) on small problems with known optima, and re-check every
//! returned schedule with the independent verifier.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use takt_core::objective::{
    MultiObjectiveConfig, ObjectiveKind, ObjectiveStrategy, ObjectiveWeight,
};
use takt_core::{
    Job, JobInstance, JobPattern, Machine, Operator, PatternTask, Precedence,
    SchedulingProblem, SetupTimes, Skill, SkillLevel, Task, TaskMode, TaskSkillRequirement,
};
use takt_solver::{
    verify_solution, CompileOptions, CpScheduler, SolveResult, SolveStatus,
};

fn solve_makespan(problem: &SchedulingProblem, setups: &SetupTimes) -> SolveResult {
    CpScheduler::new()
        .solve(problem, setups, &BTreeMap::new(), &MultiObjectiveConfig::makespan())
        .expect("solve should not error")
}

fn assert_verified(problem: &SchedulingProblem, setups: &SetupTimes, result: &SolveResult) {
    let violations = verify_solution(problem, setups, &BTreeMap::new(), &result.solution);
    assert!(violations.is_empty(), "verifier found: {violations:?}");
}

fn find<'a>(result: &'a SolveResult, task_id: &str) -> &'a takt_solver::ScheduledTask {
    result
        .solution
        .schedule
        .iter()
        .find(|t| t.task_id == task_id)
        .unwrap_or_else(|| panic!("task {task_id} missing from schedule"))
}

// ============================================================================
// S1: two-task precedence chain
// ============================================================================

#[test]
fn two_task_precedence_chain() {
    let job = Job::new("j1", "chain")
        .task(Task::new("a", "j1").mode(TaskMode::new("a-m1", "a", "m1", 30)))
        .task(Task::new("b", "j1").mode(TaskMode::new("b-m1", "b", "m1", 45)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![Precedence::new("a", "b")],
    );

    let result = solve_makespan(&problem, &SetupTimes::new());
    assert_eq!(result.solution.status, SolveStatus::Optimal);
    assert_eq!(result.solution.makespan, 5);

    let a = find(&result, "a");
    let b = find(&result, "b");
    assert_eq!((a.start_tu, a.end_tu), (0, 2));
    assert_eq!((b.start_tu, b.end_tu), (2, 5));
    assert_eq!(a.machine_id.as_deref(), Some("m1"));

    // the single machine is fully busy over the makespan
    let utilization = result.solution.machine_utilization["m1"];
    assert!((utilization - 100.0).abs() < 1e-9);

    assert_verified(&problem, &SetupTimes::new(), &result);
}

// ============================================================================
// S2: sequence-dependent setup chooses the cheaper order
// ============================================================================

#[test]
fn setup_time_switch_prefers_cheaper_order() {
    let job = Job::new("j1", "switch")
        .task(Task::new("x", "j1").mode(TaskMode::new("x-m1", "x", "m1", 30)))
        .task(Task::new("y", "j1").mode(TaskMode::new("y-m1", "y", "m1", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    );
    let mut setups = SetupTimes::new();
    setups.insert("x", "y", "m1", 1);
    setups.insert("y", "x", "m1", 2);

    let result = solve_makespan(&problem, &setups);
    assert_eq!(result.solution.status, SolveStatus::Optimal);
    assert_eq!(result.solution.makespan, 5);

    let x = find(&result, "x");
    let y = find(&result, "y");
    assert_eq!((x.start_tu, x.end_tu), (0, 2));
    assert_eq!((y.start_tu, y.end_tu), (3, 5));

    let metrics = &result.solution.setup_time_metrics;
    assert_eq!(metrics.num_setups, 1);
    assert_eq!(metrics.total_setup_units, 1);
    assert_eq!(metrics.setup_instances[0].from_task, "x");
    assert_eq!(metrics.machine_setup_times["m1"].num_setups, 1);

    assert_verified(&problem, &setups, &result);
}

// ============================================================================
// S3: pattern with three identical instances
// ============================================================================

#[test]
fn pattern_with_three_identical_instances() {
    let pattern = JobPattern::new("p1", "pair")
        .task(PatternTask::new("s1").mode(TaskMode::new("s1-m1", "s1", "m1", 30)))
        .task(PatternTask::new("s2").mode(TaskMode::new("s2-m1", "s2", "m1", 30)))
        .precedence("s1", "s2");
    let instances = vec![
        JobInstance::new("i1", "p1", "first"),
        JobInstance::new("i2", "p1", "second"),
        JobInstance::new("i3", "p1", "third"),
    ];
    let problem = SchedulingProblem::from_pattern(
        pattern,
        instances,
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
    );

    let result = solve_makespan(&problem, &SetupTimes::new());
    assert_eq!(result.solution.status, SolveStatus::Optimal);
    assert_eq!(result.solution.makespan, 12);
    assert_eq!(result.solution.schedule.len(), 6);

    // symmetry: first pattern task starts ordered by instance
    let s1_starts: Vec<i64> = ["i1", "i2", "i3"]
        .iter()
        .map(|i| find(&result, &format!("{i}_s1")).start_tu)
        .collect();
    assert!(s1_starts.windows(2).all(|w| w[0] <= w[1]), "{s1_starts:?}");

    assert_verified(&problem, &SetupTimes::new(), &result);
}

// ============================================================================
// S4: high-capacity machine runs pairs in parallel
// ============================================================================

#[test]
fn high_capacity_machine_parallelizes() {
    let mut job = Job::new("j1", "batch");
    for name in ["t1", "t2", "t3", "t4"] {
        job = job.task(
            Task::new(name, "j1").mode(TaskMode::new(format!("{name}-m1"), name, "m1", 60)),
        );
    }
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Oven").capacity(2)],
        vec![],
        vec![],
    );

    let result = solve_makespan(&problem, &SetupTimes::new());
    assert_eq!(result.solution.status, SolveStatus::Optimal);
    assert_eq!(result.solution.makespan, 8);

    assert_verified(&problem, &SetupTimes::new(), &result);
}

// ============================================================================
// S5: unattended day-long process
// ============================================================================

#[test]
fn unattended_process_setup_in_business_hours() {
    let job = Job::new("j1", "cure")
        .task(
            Task::new("prep", "j1")
                .unattended(true)
                .mode(TaskMode::new("prep-m1", "prep", "m1", 30)),
        )
        .task(
            Task::new("cure", "j1")
                .unattended(false)
                .mode(TaskMode::new("cure-m1", "cure", "m1", 24 * 60)),
        );
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Curing chamber").capacity(2)],
        vec![],
        vec![],
    );

    let result = solve_makespan(&problem, &SetupTimes::new());
    assert!(result.solution.status.has_solution());

    let prep = find(&result, "prep");
    let cure = find(&result, "cure");

    // setup fell inside a weekday 07:00-16:00 window
    let day = prep.start_tu / 96;
    assert!(day < 5);
    assert!(prep.start_tu >= day * 96 + 28);
    assert!(prep.end_tu <= day * 96 + 68);

    // execution starts only after its setup ends and runs 96 units
    assert!(cure.start_tu >= prep.end_tu);
    assert_eq!(cure.end_tu - cure.start_tu, 96);

    assert_verified(&problem, &SetupTimes::new(), &result);
}

// ============================================================================
// S6: lexicographic lateness-then-makespan
// ============================================================================

fn two_due_jobs() -> SchedulingProblem {
    let grid = takt_core::time::TimeGrid::default();
    let j1 = Job::new("j1", "urgent")
        .due(grid.datetime_at(8))
        .task(Task::new("a", "j1").mode(TaskMode::new("a-m1", "a", "m1", 60)));
    let j2 = Job::new("j2", "relaxed")
        .due(grid.datetime_at(100))
        .task(Task::new("b", "j2").mode(TaskMode::new("b-m1", "b", "m1", 60)));
    SchedulingProblem::new(
        vec![j1, j2],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    )
}

#[test]
fn lexicographic_lateness_then_makespan() {
    let problem = two_due_jobs();
    let config = MultiObjectiveConfig::new(
        ObjectiveStrategy::Lexicographic,
        vec![
            ObjectiveWeight::new(ObjectiveKind::MinimizeTotalLateness, 1.0).priority(1),
            ObjectiveWeight::new(ObjectiveKind::MinimizeMakespan, 1.0).priority(2),
        ],
    );

    let result = CpScheduler::new()
        .solve(&problem, &SetupTimes::new(), &BTreeMap::new(), &config)
        .expect("solve should not error");

    assert!(result.solution.status.has_solution());
    assert_eq!(result.solution.total_lateness_minutes, 0);
    assert_eq!(result.solution.makespan, 8);

    assert_verified(&problem, &SetupTimes::new(), &result);
}

#[test]
fn weighted_sum_on_compatible_objectives() {
    let problem = two_due_jobs();
    let config = MultiObjectiveConfig::new(
        ObjectiveStrategy::WeightedSum,
        vec![
            ObjectiveWeight::new(ObjectiveKind::MinimizeMakespan, 0.5),
            ObjectiveWeight::new(ObjectiveKind::MinimizeTotalLateness, 0.5),
        ],
    );
    let result = CpScheduler::new()
        .solve(&problem, &SetupTimes::new(), &BTreeMap::new(), &config)
        .expect("solve should not error");

    assert!(result.solution.status.has_solution());
    assert_eq!(result.solution.total_lateness_minutes, 0);
    assert_verified(&problem, &SetupTimes::new(), &result);
}

#[test]
fn epsilon_constraint_bounds_lateness() {
    let problem = two_due_jobs();
    let config = MultiObjectiveConfig::new(
        ObjectiveStrategy::EpsilonConstraint,
        vec![
            ObjectiveWeight::new(ObjectiveKind::MinimizeMakespan, 1.0),
            ObjectiveWeight::new(ObjectiveKind::MinimizeTotalLateness, 1.0).epsilon(0.0),
        ],
    );
    let result = CpScheduler::new()
        .solve(&problem, &SetupTimes::new(), &BTreeMap::new(), &config)
        .expect("solve should not error");

    assert!(result.solution.status.has_solution());
    assert_eq!(result.solution.total_lateness_minutes, 0);
    assert_eq!(result.solution.makespan, 8);
}

#[test]
fn pareto_frontier_collects_non_dominated_solutions() {
    let problem = two_due_jobs();
    let mut config = MultiObjectiveConfig::new(
        ObjectiveStrategy::ParetoOptimal,
        vec![
            ObjectiveWeight::new(ObjectiveKind::MinimizeMakespan, 1.0),
            ObjectiveWeight::new(ObjectiveKind::MinimizeTotalLateness, 1.0),
        ],
    );
    config.pareto_iterations = 4;

    let result = CpScheduler::new()
        .solve(&problem, &SetupTimes::new(), &BTreeMap::new(), &config)
        .expect("solve should not error");

    let pareto = result.pareto.expect("pareto strategy returns a frontier");
    assert!(!pareto.frontier.is_empty());
    assert!(pareto.frontier.len() <= 4);
    assert!(result.solution.status.has_solution());

    // objectives do not conflict here, so the frontier collapses
    let best = &pareto.frontier.solutions
        [pareto.frontier.extreme_solution(ObjectiveKind::MinimizeMakespan).unwrap()];
    assert_eq!(best.objectives.makespan, Some(8));
}

#[test]
fn minimize_setup_time_prefers_the_cheap_transition() {
    let job = Job::new("j1", "switch")
        .task(Task::new("x", "j1").mode(TaskMode::new("x-m1", "x", "m1", 30)))
        .task(Task::new("y", "j1").mode(TaskMode::new("y-m1", "y", "m1", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    );
    let mut setups = SetupTimes::new();
    setups.insert("x", "y", "m1", 1);
    setups.insert("y", "x", "m1", 2);

    let config = MultiObjectiveConfig::new(
        ObjectiveStrategy::Lexicographic,
        vec![ObjectiveWeight::new(ObjectiveKind::MinimizeSetupTime, 1.0)],
    );
    let result = CpScheduler::new()
        .solve(&problem, &setups, &BTreeMap::new(), &config)
        .expect("solve should not error");

    assert!(result.solution.status.has_solution());
    assert_eq!(result.solution.setup_time_metrics.total_setup_units, 1);
    assert_eq!(
        result.solution.setup_time_metrics.setup_instances[0].from_task,
        "x"
    );
    assert_verified(&problem, &setups, &result);
}

#[test]
fn minimize_total_cost_picks_the_cheaper_machine() {
    use rust_decimal_macros::dec;

    // fast but expensive vs slow but cheap
    let job = Job::new("j1", "cost").task(
        Task::new("a", "j1")
            .mode(TaskMode::new("a-m1", "a", "m1", 30))
            .mode(TaskMode::new("a-m2", "a", "m2", 45)),
    );
    let problem = SchedulingProblem::new(
        vec![job],
        vec![
            Machine::new("m1", "c1", "Fast mill").cost_per_hour(dec!(40)),
            Machine::new("m2", "c1", "Slow mill").cost_per_hour(dec!(10)),
        ],
        vec![],
        vec![],
    );

    let config = MultiObjectiveConfig::new(
        ObjectiveStrategy::Lexicographic,
        vec![ObjectiveWeight::new(ObjectiveKind::MinimizeTotalCost, 1.0)],
    );
    let result = CpScheduler::new()
        .solve(&problem, &SetupTimes::new(), &BTreeMap::new(), &config)
        .expect("solve should not error");

    assert!(result.solution.status.has_solution());
    assert_eq!(find(&result, "a").machine_id.as_deref(), Some("m2"));
    assert_verified(&problem, &SetupTimes::new(), &result);
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[test]
fn empty_problem_is_trivially_optimal() {
    let problem = SchedulingProblem::new(vec![], vec![], vec![], vec![]);
    let result = solve_makespan(&problem, &SetupTimes::new());
    assert_eq!(result.solution.status, SolveStatus::Optimal);
    assert_eq!(result.solution.makespan, 0);
    assert!(result.solution.schedule.is_empty());
}

#[test]
fn single_task_single_mode() {
    let job = Job::new("j1", "solo")
        .task(Task::new("only", "j1").mode(TaskMode::new("only-m1", "only", "m1", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    );
    let result = solve_makespan(&problem, &SetupTimes::new());
    assert_eq!(result.solution.status, SolveStatus::Optimal);
    assert_eq!(result.solution.makespan, 2);
}

#[test]
fn past_due_job_stays_feasible_with_positive_lateness() {
    let grid = takt_core::time::TimeGrid::default();
    let job = Job::new("j1", "late")
        .due(grid.datetime_at(-96))
        .task(Task::new("a", "j1").mode(TaskMode::new("a-m1", "a", "m1", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    );

    let result = solve_makespan(&problem, &SetupTimes::new());
    assert!(result.solution.status.has_solution());
    assert!(result.solution.total_lateness_minutes > 0);
}

#[test]
fn unqualified_operator_pool_is_infeasible() {
    let job = Job::new("j1", "skilled work")
        .task(Task::new("a", "j1").mode(TaskMode::new("a-m1", "a", "m1", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    )
    .with_operators(
        vec![Operator::new("op1", "Trainee").skill("weld", SkillLevel::Novice)],
        vec![Skill::new("weld", "Welding")],
        vec![TaskSkillRequirement::new("a", "weld", SkillLevel::Expert)],
        vec![],
    );

    let result = solve_makespan(&problem, &SetupTimes::new());
    assert_eq!(result.solution.status, SolveStatus::Infeasible);
}

#[test]
fn qualified_operators_are_assigned_and_verified() {
    let job = Job::new("j1", "staffed")
        .task(Task::new("a", "j1").mode(TaskMode::new("a-m1", "a", "m1", 30)))
        .task(Task::new("b", "j1").mode(TaskMode::new("b-m1", "b", "m1", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    )
    .with_operators(
        vec![
            Operator::new("op1", "Sam").skill("weld", SkillLevel::Expert),
            Operator::new("op2", "Kit").skill("weld", SkillLevel::Proficient),
        ],
        vec![Skill::new("weld", "Welding")],
        vec![
            TaskSkillRequirement::new("a", "weld", SkillLevel::Competent),
            TaskSkillRequirement::new("b", "weld", SkillLevel::Competent),
        ],
        vec![],
    );

    let result = solve_makespan(&problem, &SetupTimes::new());
    assert!(result.solution.status.has_solution());
    for entry in &result.solution.schedule {
        assert_eq!(entry.operator_ids.len(), 1, "task {} staffing", entry.task_id);
    }
    assert_verified(&problem, &SetupTimes::new(), &result);
}

#[test]
fn hard_due_dates_can_prove_infeasibility() {
    let grid = takt_core::time::TimeGrid::default();
    // one unit of allowed time, two units of work
    let job = Job::new("j1", "impossible")
        .due(grid.datetime_at(1))
        .task(Task::new("a", "j1").mode(TaskMode::new("a-m1", "a", "m1", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    );

    let result = CpScheduler::new()
        .with_options(CompileOptions {
            enforce_due_dates: true,
            ..CompileOptions::default()
        })
        .solve(
            &problem,
            &SetupTimes::new(),
            &BTreeMap::new(),
            &MultiObjectiveConfig::makespan(),
        )
        .expect("solve should not error");
    assert_eq!(result.solution.status, SolveStatus::Infeasible);
}

#[test]
fn cancelled_before_solving_reports_cancelled() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let problem = two_due_jobs();
    let flag = Arc::new(AtomicBool::new(false));
    flag.store(true, Ordering::Relaxed);

    let result = CpScheduler::new()
        .with_cancel_flag(flag)
        .solve(
            &problem,
            &SetupTimes::new(),
            &BTreeMap::new(),
            &MultiObjectiveConfig::makespan(),
        )
        .expect("solve should not error");
    assert_eq!(result.solution.status, SolveStatus::Cancelled);
}

#[test]
fn invalid_problem_surfaces_validation_errors() {
    let job = Job::new("j1", "broken")
        .task(Task::new("a", "j1").mode(TaskMode::new("a-ghost", "a", "ghost", 30)));
    let problem = SchedulingProblem::new(
        vec![job],
        vec![Machine::new("m1", "c1", "Mill")],
        vec![],
        vec![],
    );
    let err = CpScheduler::new()
        .solve(
            &problem,
            &SetupTimes::new(),
            &BTreeMap::new(),
            &MultiObjectiveConfig::makespan(),
        )
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn solving_twice_is_reproducible() {
    let problem = two_due_jobs();
    let first = solve_makespan(&problem, &SetupTimes::new());
    let second = solve_makespan(&problem, &SetupTimes::new());
    assert_eq!(first.solution.makespan, second.solution.makespan);
    assert_eq!(
        first.solution.schedule.len(),
        second.solution.schedule.len()
    );
}

#[test]
fn solve_request_round_trips_through_json() {
    let problem = two_due_jobs();
    let request = serde_json::json!({
        "problem": problem,
        "objective": MultiObjectiveConfig::makespan(),
    });
    let request: takt_solver::SolveRequest =
        serde_json::from_value(request).expect("request deserializes");
    let result = request.solve().expect("solve should not error");
    assert!(result.solution.status.has_solution());
    assert_eq!(result.solution.makespan, 8);
}
