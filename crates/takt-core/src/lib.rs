//! # takt-core
//!
//! Core domain model for the takt job-shop scheduling engine.
//!
//! This crate provides:
//! - Domain types: `Machine`, `WorkCell`, `Task`, `Job`, `JobPattern`,
//!   `JobInstance`, `Operator`, `OperatorShift`
//! - Problem assembly: [`SchedulingProblem`] with lookup indices and
//!   pattern expansion
//! - Time grid utilities (15-minute units) and horizon computation
//! - Multi-objective configuration and Pareto analysis types
//! - Error types and result aliases
//!
//! ## Example
//!
//! ```rust
//! use takt_core::{Job, Machine, SchedulingProblem, Task, TaskMode};
//!
//! let machine = Machine::new("mill-1", "cell-a", "3-axis mill");
//! let task = Task::new("cut", "order-7")
//!     .mode(TaskMode::new("cut-on-mill", "cut", "mill-1", 30));
//! let job = Job::new("order-7", "frame order").task(task);
//!
//! let problem = SchedulingProblem::new(
//!     vec![job],
//!     vec![machine],
//!     vec![],
//!     vec![],
//! );
//! assert!(problem.validate().is_empty());
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod objective;
pub mod problem;
pub mod time;

pub use objective::{
    MultiObjectiveConfig, ObjectiveKind, ObjectiveStrategy, ObjectiveValues, ObjectiveWeight,
    ParetoFrontier, ParetoSolution, TradeOffAnalysis,
};
pub use problem::{
    instance_task_id, parse_instance_task_id, SchedulingProblem, SetupTimeEntry, SetupTimes,
    TaskKey, TaskRef,
};
pub use time::{TimeGrid, BUSINESS_DAY_END_TU, BUSINESS_DAY_START_TU, UNITS_PER_DAY};

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a machine resource
pub type MachineId = String;

/// Unique identifier for a work cell
pub type CellId = String;

/// Unique identifier for a task (or an expanded instance task)
pub type TaskId = String;

/// Unique identifier for a job
pub type JobId = String;

/// Unique identifier for a job pattern
pub type PatternId = String;

/// Unique identifier for a job instance
pub type InstanceId = String;

/// Unique identifier for an operator
pub type OperatorId = String;

/// Unique identifier for a skill
pub type SkillId = String;

// ============================================================================
// Machines & Work Cells
// ============================================================================

/// A machine resource.
///
/// `capacity = k` means up to `k` tasks may run on the machine
/// concurrently; `capacity = 1` is the common exclusive case.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Machine {
    /// Unique identifier
    pub resource_id: MachineId,
    /// Work cell this machine belongs to
    pub cell_id: CellId,
    /// Human-readable name
    pub name: String,
    /// Number of tasks the machine can run concurrently
    pub capacity: i64,
    /// Operating cost per hour
    pub cost_per_hour: Decimal,
}

impl Machine {
    /// Create a machine with capacity 1 and zero cost
    pub fn new(
        resource_id: impl Into<String>,
        cell_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            cell_id: cell_id.into(),
            name: name.into(),
            capacity: 1,
            cost_per_hour: Decimal::ZERO,
        }
    }

    /// Set the concurrent capacity
    pub fn capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the hourly operating cost
    pub fn cost_per_hour(mut self, cost: Decimal) -> Self {
        self.cost_per_hour = cost;
        self
    }

    /// Check construction invariants
    pub fn check(&self) -> Result<(), EntityError> {
        if self.capacity < 0 {
            return Err(EntityError::Machine {
                id: self.resource_id.clone(),
                reason: format!("capacity must be non-negative: {}", self.capacity),
            });
        }
        if self.cost_per_hour < Decimal::ZERO {
            return Err(EntityError::Machine {
                id: self.resource_id.clone(),
                reason: format!("cost per hour cannot be negative: {}", self.cost_per_hour),
            });
        }
        Ok(())
    }
}

/// A work cell grouping machines.
///
/// Cell capacity limits how many of its machines can be simultaneously
/// active; the WIP limit (when set) caps the number of in-flight tasks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkCell {
    /// Unique identifier
    pub cell_id: CellId,
    /// Human-readable name
    pub name: String,
    /// Number of machines that can be simultaneously active
    pub capacity: i64,
    /// Optional WIP limit (defaults to capacity when unset)
    pub wip_limit: Option<i64>,
    /// Target utilization in [0, 1]
    pub target_utilization: f64,
    /// Priority for flow balancing (1 = highest)
    pub flow_priority: i64,
    /// Machines belonging to this cell
    pub machines: Vec<MachineId>,
}

/// WIP limits at or above this value mean "unlimited"
pub const WIP_UNLIMITED: i64 = 100;

impl WorkCell {
    pub fn new(cell_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cell_id: cell_id.into(),
            name: name.into(),
            capacity: 1,
            wip_limit: None,
            target_utilization: 0.85,
            flow_priority: 1,
            machines: Vec::new(),
        }
    }

    pub fn capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn wip_limit(mut self, limit: i64) -> Self {
        self.wip_limit = Some(limit);
        self
    }

    /// Add a machine to this cell
    pub fn machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machines.push(machine_id.into());
        self
    }

    /// The WIP limit in force: configured limit, or cell capacity
    pub fn effective_wip_limit(&self) -> i64 {
        self.wip_limit.unwrap_or(self.capacity)
    }

    /// Check construction invariants
    pub fn check(&self) -> Result<(), EntityError> {
        if self.capacity <= 0 {
            return Err(EntityError::WorkCell {
                id: self.cell_id.clone(),
                reason: format!("capacity must be positive: {}", self.capacity),
            });
        }
        if let Some(limit) = self.wip_limit {
            if limit <= 0 {
                return Err(EntityError::WorkCell {
                    id: self.cell_id.clone(),
                    reason: format!("WIP limit must be positive: {limit}"),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.target_utilization) {
            return Err(EntityError::WorkCell {
                id: self.cell_id.clone(),
                reason: format!(
                    "target utilization must be within [0, 1]: {}",
                    self.target_utilization
                ),
            });
        }
        if self.flow_priority < 1 {
            return Err(EntityError::WorkCell {
                id: self.cell_id.clone(),
                reason: format!("flow priority must be at least 1: {}", self.flow_priority),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tasks & Jobs
// ============================================================================

/// One way a task can be executed: a (machine, duration) pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskMode {
    /// Unique identifier
    pub mode_id: String,
    /// Task this mode belongs to
    pub task_id: TaskId,
    /// Machine the mode runs on
    pub machine_resource_id: MachineId,
    /// Processing time in minutes
    pub duration_minutes: i64,
}

impl TaskMode {
    pub fn new(
        mode_id: impl Into<String>,
        task_id: impl Into<String>,
        machine_resource_id: impl Into<String>,
        duration_minutes: i64,
    ) -> Self {
        Self {
            mode_id: mode_id.into(),
            task_id: task_id.into(),
            machine_resource_id: machine_resource_id.into(),
            duration_minutes,
        }
    }

    /// Duration in solver time units (15-minute intervals, rounded up)
    pub fn duration_units(&self) -> i64 {
        time::minutes_to_units(self.duration_minutes)
    }

    /// Check construction invariants
    pub fn check(&self) -> Result<(), EntityError> {
        if self.duration_minutes <= 0 {
            return Err(EntityError::TaskMode {
                id: self.mode_id.clone(),
                reason: format!("duration must be positive: {}", self.duration_minutes),
            });
        }
        Ok(())
    }
}

/// How task efficiency scales with operator count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyCurve {
    /// Each additional operator contributes fully
    #[default]
    Linear,
    /// Additional operators contribute with diminishing returns
    Diminishing,
    /// Extra operators beyond the first contribute nothing
    Constant,
}

/// A schedulable unit of work within a job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub task_id: TaskId,
    /// Job this task belongs to
    pub job_id: JobId,
    /// Human-readable name
    pub name: String,
    /// Department responsible for the task
    pub department_id: Option<String>,
    /// Runs without an operator present
    pub is_unattended: bool,
    /// Setup phase of an unattended process
    pub is_setup: bool,
    /// Execution modes (at least one required after assembly)
    pub modes: Vec<TaskMode>,
    /// Task IDs that must come after this one
    pub precedence_successors: Vec<TaskId>,
    /// Task IDs that must come before this one
    pub precedence_predecessors: Vec<TaskId>,
    /// Minimum operators required
    pub min_operators: i64,
    /// Maximum operators that can work the task
    pub max_operators: i64,
    /// How efficiency scales with operator count
    pub efficiency_curve: EfficiencyCurve,
    /// Optional sequence reservation group
    pub sequence_id: Option<String>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            name: task_id.clone(),
            task_id,
            job_id: job_id.into(),
            department_id: None,
            is_unattended: false,
            is_setup: false,
            modes: Vec::new(),
            precedence_successors: Vec::new(),
            precedence_predecessors: Vec::new(),
            min_operators: 1,
            max_operators: 1,
            efficiency_curve: EfficiencyCurve::Linear,
            sequence_id: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an execution mode
    pub fn mode(mut self, mode: TaskMode) -> Self {
        self.modes.push(mode);
        self
    }

    /// Mark as an unattended task; `setup` selects the setup phase
    pub fn unattended(mut self, setup: bool) -> Self {
        self.is_unattended = true;
        self.is_setup = setup;
        self
    }

    /// Set the operator count range
    pub fn operators(mut self, min: i64, max: i64) -> Self {
        self.min_operators = min;
        self.max_operators = max;
        self
    }

    pub fn efficiency_curve(mut self, curve: EfficiencyCurve) -> Self {
        self.efficiency_curve = curve;
        self
    }

    /// Machines that appear as the target of at least one mode
    pub fn eligible_machines(&self) -> Vec<MachineId> {
        self.modes
            .iter()
            .map(|m| m.machine_resource_id.clone())
            .collect()
    }

    /// Minimum duration across modes, in minutes (0 when no modes yet)
    pub fn min_duration_minutes(&self) -> i64 {
        self.modes
            .iter()
            .map(|m| m.duration_minutes)
            .min()
            .unwrap_or(0)
    }

    /// Maximum duration across modes, in minutes (0 when no modes yet)
    pub fn max_duration_minutes(&self) -> i64 {
        self.modes
            .iter()
            .map(|m| m.duration_minutes)
            .max()
            .unwrap_or(0)
    }

    /// Duration on a specific machine, in minutes
    pub fn duration_on_machine(&self, machine_id: &str) -> Option<i64> {
        self.modes
            .iter()
            .find(|m| m.machine_resource_id == machine_id)
            .map(|m| m.duration_minutes)
    }

    /// Check construction invariants (empty modes are allowed here to
    /// support builders; assembly-time validation rejects them)
    pub fn check(&self) -> Result<(), EntityError> {
        if self.min_operators <= 0 {
            return Err(EntityError::Task {
                id: self.task_id.clone(),
                reason: format!("min_operators must be positive: {}", self.min_operators),
            });
        }
        if self.max_operators < self.min_operators {
            return Err(EntityError::Task {
                id: self.task_id.clone(),
                reason: format!(
                    "min_operators ({}) cannot exceed max_operators ({})",
                    self.min_operators, self.max_operators
                ),
            });
        }
        for mode in &self.modes {
            mode.check()?;
        }
        Ok(())
    }
}

/// A job: an ordered collection of tasks with an optional due date.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub job_id: JobId,
    /// Human-readable description
    pub description: String,
    /// Due date; naive datetimes are reinterpreted as UTC at the loader
    pub due_date: Option<DateTime<Utc>>,
    /// Tasks in processing order
    pub tasks: Vec<Task>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            description: description.into(),
            due_date: None,
            tasks: Vec::new(),
        }
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Sum of minimum task durations, in minutes
    pub fn total_min_duration_minutes(&self) -> i64 {
        self.tasks.iter().map(Task::min_duration_minutes).sum()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }
}

/// A precedence constraint between two tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precedence {
    pub predecessor_task_id: TaskId,
    pub successor_task_id: TaskId,
}

impl Precedence {
    pub fn new(predecessor: impl Into<String>, successor: impl Into<String>) -> Self {
        Self {
            predecessor_task_id: predecessor.into(),
            successor_task_id: successor.into(),
        }
    }

    pub fn check(&self) -> Result<(), EntityError> {
        if self.predecessor_task_id == self.successor_task_id {
            return Err(EntityError::Precedence {
                id: self.predecessor_task_id.clone(),
                reason: "task cannot precede itself".into(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Patterns & Instances
// ============================================================================

/// A task definition inside a job pattern.
///
/// Mirrors [`Task`] but references pattern-task IDs; concrete task IDs are
/// derived per instance at expansion time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternTask {
    pub pattern_task_id: TaskId,
    pub name: String,
    pub department_id: Option<String>,
    pub is_unattended: bool,
    pub is_setup: bool,
    pub modes: Vec<TaskMode>,
    pub precedence_successors: Vec<TaskId>,
    pub precedence_predecessors: Vec<TaskId>,
    pub min_operators: i64,
    pub max_operators: i64,
    pub efficiency_curve: EfficiencyCurve,
    pub sequence_id: Option<String>,
}

impl PatternTask {
    pub fn new(pattern_task_id: impl Into<String>) -> Self {
        let pattern_task_id = pattern_task_id.into();
        Self {
            name: pattern_task_id.clone(),
            pattern_task_id,
            department_id: None,
            is_unattended: false,
            is_setup: false,
            modes: Vec::new(),
            precedence_successors: Vec::new(),
            precedence_predecessors: Vec::new(),
            min_operators: 1,
            max_operators: 1,
            efficiency_curve: EfficiencyCurve::Linear,
            sequence_id: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn mode(mut self, mode: TaskMode) -> Self {
        self.modes.push(mode);
        self
    }

    pub fn unattended(mut self, setup: bool) -> Self {
        self.is_unattended = true;
        self.is_setup = setup;
        self
    }

    pub fn operators(mut self, min: i64, max: i64) -> Self {
        self.min_operators = min;
        self.max_operators = max;
        self
    }

    pub fn eligible_machines(&self) -> Vec<MachineId> {
        self.modes
            .iter()
            .map(|m| m.machine_resource_id.clone())
            .collect()
    }

    pub fn min_duration_minutes(&self) -> i64 {
        self.modes
            .iter()
            .map(|m| m.duration_minutes)
            .min()
            .unwrap_or(0)
    }

    pub fn max_duration_minutes(&self) -> i64 {
        self.modes
            .iter()
            .map(|m| m.duration_minutes)
            .max()
            .unwrap_or(0)
    }

    pub fn duration_on_machine(&self, machine_id: &str) -> Option<i64> {
        self.modes
            .iter()
            .find(|m| m.machine_resource_id == machine_id)
            .map(|m| m.duration_minutes)
    }

    pub fn check(&self) -> Result<(), EntityError> {
        if self.min_operators <= 0 {
            return Err(EntityError::Task {
                id: self.pattern_task_id.clone(),
                reason: format!("min_operators must be positive: {}", self.min_operators),
            });
        }
        if self.max_operators < self.min_operators {
            return Err(EntityError::Task {
                id: self.pattern_task_id.clone(),
                reason: format!(
                    "min_operators ({}) cannot exceed max_operators ({})",
                    self.min_operators, self.max_operators
                ),
            });
        }
        for mode in &self.modes {
            mode.check()?;
        }
        Ok(())
    }
}

/// A precedence between two pattern tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPrecedence {
    pub predecessor_pattern_task_id: TaskId,
    pub successor_pattern_task_id: TaskId,
}

impl PatternPrecedence {
    pub fn new(predecessor: impl Into<String>, successor: impl Into<String>) -> Self {
        Self {
            predecessor_pattern_task_id: predecessor.into(),
            successor_pattern_task_id: successor.into(),
        }
    }
}

/// A canonical job blueprint: pattern tasks plus pattern precedences.
///
/// One pattern plus N lightweight instances expands into an N-by-pattern
/// scheduling problem without materializing per-instance precedences.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobPattern {
    pub pattern_id: PatternId,
    pub name: String,
    pub pattern_tasks: Vec<PatternTask>,
    pub pattern_precedences: Vec<PatternPrecedence>,
}

impl JobPattern {
    pub fn new(pattern_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            name: name.into(),
            pattern_tasks: Vec::new(),
            pattern_precedences: Vec::new(),
        }
    }

    pub fn task(mut self, task: PatternTask) -> Self {
        self.pattern_tasks.push(task);
        self
    }

    pub fn precedence(mut self, pred: impl Into<String>, succ: impl Into<String>) -> Self {
        self.pattern_precedences
            .push(PatternPrecedence::new(pred, succ));
        self
    }

    pub fn task_count(&self) -> usize {
        self.pattern_tasks.len()
    }

    pub fn get_task(&self, pattern_task_id: &str) -> Option<&PatternTask> {
        self.pattern_tasks
            .iter()
            .find(|t| t.pattern_task_id == pattern_task_id)
    }

    /// Sum of minimum task durations, in minutes
    pub fn total_min_duration_minutes(&self) -> i64 {
        self.pattern_tasks
            .iter()
            .map(PatternTask::min_duration_minutes)
            .sum()
    }

    /// Length of the longest precedence chain in time units.
    ///
    /// A lower bound on any instance's span. Returns `None` when the
    /// pattern precedences contain a cycle.
    pub fn critical_path_units(&self) -> Option<i64> {
        let n = self.pattern_tasks.len();
        let index: std::collections::HashMap<&str, usize> = self
            .pattern_tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.pattern_task_id.as_str(), i))
            .collect();

        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for prec in &self.pattern_precedences {
            let (Some(&p), Some(&s)) = (
                index.get(prec.predecessor_pattern_task_id.as_str()),
                index.get(prec.successor_pattern_task_id.as_str()),
            ) else {
                continue;
            };
            succs[p].push(s);
            indegree[s] += 1;
        }

        let dur: Vec<i64> = self
            .pattern_tasks
            .iter()
            .map(|t| time::minutes_to_units(t.min_duration_minutes()))
            .collect();

        // Longest path over the DAG in topological order
        let mut finish: Vec<i64> = dur.clone();
        let mut queue: std::collections::VecDeque<usize> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut visited = 0usize;
        while let Some(i) = queue.pop_front() {
            visited += 1;
            for &s in &succs[i] {
                finish[s] = finish[s].max(finish[i] + dur[s]);
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    queue.push_back(s);
                }
            }
        }
        if visited != n {
            return None; // cycle
        }
        Some(finish.into_iter().max().unwrap_or(0))
    }

    /// Validate the pattern definition. Returns a list of issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for task in &self.pattern_tasks {
            if task.modes.is_empty() {
                issues.push(format!("pattern task {} has no modes", task.name));
            }
        }

        for prec in &self.pattern_precedences {
            if self.get_task(&prec.predecessor_pattern_task_id).is_none() {
                issues.push(format!(
                    "pattern precedence references non-existent predecessor {}",
                    prec.predecessor_pattern_task_id
                ));
            }
            if self.get_task(&prec.successor_pattern_task_id).is_none() {
                issues.push(format!(
                    "pattern precedence references non-existent successor {}",
                    prec.successor_pattern_task_id
                ));
            }
            if prec.predecessor_pattern_task_id == prec.successor_pattern_task_id {
                issues.push(format!(
                    "circular precedence on pattern task {}",
                    prec.predecessor_pattern_task_id
                ));
            }
        }

        if self.critical_path_units().is_none() {
            issues.push(format!("pattern {} precedences contain a cycle", self.pattern_id));
        }

        issues
    }
}

/// A lightweight job referencing one pattern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobInstance {
    pub instance_id: InstanceId,
    pub pattern_id: PatternId,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
}

impl JobInstance {
    pub fn new(
        instance_id: impl Into<String>,
        pattern_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            pattern_id: pattern_id.into(),
            description: description.into(),
            due_date: None,
        }
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

// ============================================================================
// Operators & Skills
// ============================================================================

/// Skill proficiency levels for operator skill matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    /// Can perform with supervision
    Novice = 1,
    /// Can perform independently
    Competent = 2,
    /// Can perform efficiently
    Proficient = 3,
    /// Can perform optimally and train others
    Expert = 4,
}

impl SkillLevel {
    /// Efficiency multiplier at this level
    pub fn efficiency_multiplier(self) -> f64 {
        match self {
            SkillLevel::Novice => 0.5,
            SkillLevel::Competent => 0.75,
            SkillLevel::Proficient => 1.0,
            SkillLevel::Expert => 1.25,
        }
    }
}

/// A named skill required for task execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Skill {
    pub skill_id: SkillId,
    pub name: String,
}

impl Skill {
    pub fn new(skill_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            skill_id: skill_id.into(),
            name: name.into(),
        }
    }

    pub fn check(&self) -> Result<(), EntityError> {
        if self.skill_id.trim().is_empty() {
            return Err(EntityError::Skill {
                id: self.skill_id.clone(),
                reason: "skill ID cannot be empty".into(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(EntityError::Skill {
                id: self.skill_id.clone(),
                reason: "skill name cannot be empty".into(),
            });
        }
        Ok(())
    }
}

/// An operator's proficiency in one skill.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorSkill {
    pub operator_id: OperatorId,
    pub skill_id: SkillId,
    pub level: SkillLevel,
    pub years_experience: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl OperatorSkill {
    pub fn new(
        operator_id: impl Into<String>,
        skill_id: impl Into<String>,
        level: SkillLevel,
    ) -> Self {
        Self {
            operator_id: operator_id.into(),
            skill_id: skill_id.into(),
            level,
            years_experience: 0.0,
            last_used: None,
        }
    }

    pub fn check(&self) -> Result<(), EntityError> {
        if self.years_experience < 0.0 {
            return Err(EntityError::Operator {
                id: self.operator_id.clone(),
                reason: format!(
                    "years of experience cannot be negative: {}",
                    self.years_experience
                ),
            });
        }
        Ok(())
    }
}

/// A human operator resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operator {
    pub operator_id: OperatorId,
    pub name: String,
    pub skills: Vec<OperatorSkill>,
    pub hourly_rate: Decimal,
    pub max_hours_per_day: i64,
    pub is_active: bool,
    pub department_id: Option<String>,
}

impl Operator {
    pub fn new(operator_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            name: name.into(),
            skills: Vec::new(),
            hourly_rate: Decimal::ZERO,
            max_hours_per_day: 8,
            is_active: true,
            department_id: None,
        }
    }

    pub fn skill(mut self, skill_id: impl Into<String>, level: SkillLevel) -> Self {
        let skill = OperatorSkill::new(self.operator_id.clone(), skill_id, level);
        self.skills.push(skill);
        self
    }

    pub fn hourly_rate(mut self, rate: Decimal) -> Self {
        self.hourly_rate = rate;
        self
    }

    /// Check whether the operator has `skill_id` at or above `min_level`
    pub fn has_skill(&self, skill_id: &str, min_level: SkillLevel) -> bool {
        self.skills
            .iter()
            .any(|s| s.skill_id == skill_id && s.level >= min_level)
    }

    /// Efficiency multiplier for one skill (0.0 when the skill is absent)
    pub fn skill_efficiency(&self, skill_id: &str) -> f64 {
        self.skills
            .iter()
            .find(|s| s.skill_id == skill_id)
            .map(|s| s.level.efficiency_multiplier())
            .unwrap_or(0.0)
    }

    pub fn check(&self) -> Result<(), EntityError> {
        if self.operator_id.trim().is_empty() {
            return Err(EntityError::Operator {
                id: self.operator_id.clone(),
                reason: "operator ID cannot be empty".into(),
            });
        }
        if self.hourly_rate < Decimal::ZERO {
            return Err(EntityError::Operator {
                id: self.operator_id.clone(),
                reason: format!("hourly rate cannot be negative: {}", self.hourly_rate),
            });
        }
        if self.max_hours_per_day <= 0 {
            return Err(EntityError::Operator {
                id: self.operator_id.clone(),
                reason: format!(
                    "max hours per day must be positive: {}",
                    self.max_hours_per_day
                ),
            });
        }
        for skill in &self.skills {
            skill.check()?;
        }
        Ok(())
    }
}

/// A skill requirement attached to a task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSkillRequirement {
    pub task_id: TaskId,
    pub skill_id: SkillId,
    pub required_level: SkillLevel,
    pub is_mandatory: bool,
    /// Relative weight for multi-skill efficiency averaging
    pub weight: f64,
    /// Operators needed with this particular skill
    pub operators_needed: i64,
}

impl TaskSkillRequirement {
    pub fn new(
        task_id: impl Into<String>,
        skill_id: impl Into<String>,
        required_level: SkillLevel,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            skill_id: skill_id.into(),
            required_level,
            is_mandatory: true,
            weight: 1.0,
            operators_needed: 1,
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_mandatory = false;
        self
    }

    pub fn operators_needed(mut self, count: i64) -> Self {
        self.operators_needed = count;
        self
    }

    pub fn check(&self) -> Result<(), EntityError> {
        if self.weight <= 0.0 {
            return Err(EntityError::SkillRequirement {
                id: self.task_id.clone(),
                reason: format!("weight must be positive: {}", self.weight),
            });
        }
        if self.operators_needed <= 0 {
            return Err(EntityError::SkillRequirement {
                id: self.task_id.clone(),
                reason: format!("operators needed must be positive: {}", self.operators_needed),
            });
        }
        Ok(())
    }
}

/// An operator's work shift on one calendar day.
///
/// `start_tu`/`end_tu` are 15-minute units from midnight of `shift_date`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorShift {
    pub operator_id: OperatorId,
    pub shift_date: DateTime<Utc>,
    pub start_tu: i64,
    pub end_tu: i64,
    pub is_available: bool,
    pub overtime_allowed: bool,
    pub max_overtime_hours: f64,
}

impl OperatorShift {
    pub fn new(
        operator_id: impl Into<String>,
        shift_date: DateTime<Utc>,
        start_tu: i64,
        end_tu: i64,
    ) -> Self {
        Self {
            operator_id: operator_id.into(),
            shift_date,
            start_tu,
            end_tu,
            is_available: true,
            overtime_allowed: false,
            max_overtime_hours: 0.0,
        }
    }

    /// Shift length in hours
    pub fn shift_duration_hours(&self) -> f64 {
        (self.end_tu - self.start_tu) as f64 * 0.25
    }

    /// Maximum total hours including allowed overtime
    pub fn max_total_hours(&self) -> f64 {
        self.shift_duration_hours()
            + if self.overtime_allowed {
                self.max_overtime_hours
            } else {
                0.0
            }
    }

    pub fn check(&self) -> Result<(), EntityError> {
        if !(0..UNITS_PER_DAY).contains(&self.start_tu) {
            return Err(EntityError::Shift {
                id: self.operator_id.clone(),
                reason: format!("start must be within 0..96: {}", self.start_tu),
            });
        }
        if !(0..UNITS_PER_DAY).contains(&self.end_tu) {
            return Err(EntityError::Shift {
                id: self.operator_id.clone(),
                reason: format!("end must be within 0..96: {}", self.end_tu),
            });
        }
        if self.start_tu >= self.end_tu {
            return Err(EntityError::Shift {
                id: self.operator_id.clone(),
                reason: "shift start must be before shift end".into(),
            });
        }
        if self.max_overtime_hours < 0.0 {
            return Err(EntityError::Shift {
                id: self.operator_id.clone(),
                reason: format!(
                    "max overtime hours cannot be negative: {}",
                    self.max_overtime_hours
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Constructor-time invariant breach on a single entity
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("invalid machine '{id}': {reason}")]
    Machine { id: MachineId, reason: String },

    #[error("invalid work cell '{id}': {reason}")]
    WorkCell { id: CellId, reason: String },

    #[error("invalid task mode '{id}': {reason}")]
    TaskMode { id: String, reason: String },

    #[error("invalid task '{id}': {reason}")]
    Task { id: TaskId, reason: String },

    #[error("invalid precedence on '{id}': {reason}")]
    Precedence { id: TaskId, reason: String },

    #[error("invalid skill '{id}': {reason}")]
    Skill { id: SkillId, reason: String },

    #[error("invalid operator '{id}': {reason}")]
    Operator { id: OperatorId, reason: String },

    #[error("invalid skill requirement for task '{id}': {reason}")]
    SkillRequirement { id: TaskId, reason: String },

    #[error("invalid shift for operator '{id}': {reason}")]
    Shift { id: OperatorId, reason: String },
}

/// Assembly-time integrity breach on the problem as a whole
#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("invalid entity: {0}")]
    Entity(#[from] EntityError),

    #[error("problem validation failed with {} issue(s):\n{}", .0.len(), .0.join("\n"))]
    Validation(Vec<String>),

    #[error("unknown machine: {0}")]
    UnknownMachine(MachineId),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("pattern '{0}' precedences contain a cycle")]
    PatternCycle(PatternId),
}

/// Multi-objective configuration violates its own shape rules
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("multi-objective configuration must have at least one objective")]
    NoObjectives,

    #[error("objective weight cannot be negative: {0}")]
    NegativeWeight(f64),

    #[error("objective priority must be at least 1: {0}")]
    BadPriority(i64),

    #[error("epsilon bound cannot be negative: {0}")]
    NegativeEpsilon(f64),

    #[error("lexicographic tolerance must be positive: {0}")]
    BadTolerance(f64),

    #[error("pareto iterations must be positive: {0}")]
    BadParetoIterations(i64),

    #[error("lexicographic optimization requires unique priorities")]
    DuplicatePriorities,

    #[error("weighted sum requires weights to sum to 1.0, got {0}")]
    WeightsNotNormalized(f64),

    #[error("epsilon constraint requires exactly one objective without an epsilon bound")]
    EpsilonShape,

    #[error("invalid solver parameters: {0}")]
    BadParameters(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn machine_builder() {
        let m = Machine::new("m1", "c1", "Mill").capacity(2).cost_per_hour(dec!(35.50));
        assert_eq!(m.resource_id, "m1");
        assert_eq!(m.capacity, 2);
        assert!(m.check().is_ok());
    }

    #[test]
    fn machine_rejects_negative_capacity() {
        let m = Machine::new("m1", "c1", "Mill").capacity(-1);
        assert!(m.check().is_err());
    }

    #[test]
    fn work_cell_effective_wip_limit_defaults_to_capacity() {
        let cell = WorkCell::new("c1", "Cell A").capacity(3);
        assert_eq!(cell.effective_wip_limit(), 3);
        let limited = WorkCell::new("c2", "Cell B").capacity(3).wip_limit(2);
        assert_eq!(limited.effective_wip_limit(), 2);
    }

    #[test]
    fn work_cell_rejects_bad_utilization() {
        let mut cell = WorkCell::new("c1", "Cell A");
        cell.target_utilization = 1.5;
        assert!(cell.check().is_err());
    }

    #[test]
    fn task_mode_duration_rounds_up_to_units() {
        let mode = TaskMode::new("mo1", "t1", "m1", 31);
        assert_eq!(mode.duration_units(), 3);
        let exact = TaskMode::new("mo2", "t1", "m1", 30);
        assert_eq!(exact.duration_units(), 2);
    }

    #[test]
    fn task_mode_rejects_zero_duration() {
        assert!(TaskMode::new("mo1", "t1", "m1", 0).check().is_err());
    }

    #[test]
    fn task_builder_and_mode_accessors() {
        let task = Task::new("t1", "j1")
            .name("Cut stock")
            .mode(TaskMode::new("mo1", "t1", "m1", 30))
            .mode(TaskMode::new("mo2", "t1", "m2", 45));
        assert_eq!(task.eligible_machines(), vec!["m1".to_string(), "m2".to_string()]);
        assert_eq!(task.min_duration_minutes(), 30);
        assert_eq!(task.max_duration_minutes(), 45);
        assert_eq!(task.duration_on_machine("m2"), Some(45));
        assert_eq!(task.duration_on_machine("m3"), None);
    }

    #[test]
    fn task_rejects_reversed_operator_range() {
        let task = Task::new("t1", "j1").operators(3, 2);
        assert!(task.check().is_err());
    }

    #[test]
    fn precedence_rejects_self_loop() {
        assert!(Precedence::new("a", "a").check().is_err());
        assert!(Precedence::new("a", "b").check().is_ok());
    }

    #[test]
    fn skill_level_multipliers() {
        assert_eq!(SkillLevel::Novice.efficiency_multiplier(), 0.5);
        assert_eq!(SkillLevel::Competent.efficiency_multiplier(), 0.75);
        assert_eq!(SkillLevel::Proficient.efficiency_multiplier(), 1.0);
        assert_eq!(SkillLevel::Expert.efficiency_multiplier(), 1.25);
    }

    #[test]
    fn operator_skill_lookup() {
        let op = Operator::new("op1", "Dana")
            .skill("welding", SkillLevel::Proficient)
            .skill("inspection", SkillLevel::Novice);
        assert!(op.has_skill("welding", SkillLevel::Competent));
        assert!(!op.has_skill("inspection", SkillLevel::Competent));
        assert!(!op.has_skill("painting", SkillLevel::Novice));
        assert_eq!(op.skill_efficiency("welding"), 1.0);
        assert_eq!(op.skill_efficiency("painting"), 0.0);
    }

    #[test]
    fn shift_invariants() {
        let date = chrono::Utc::now();
        assert!(OperatorShift::new("op1", date, 28, 68).check().is_ok());
        assert!(OperatorShift::new("op1", date, 68, 28).check().is_err());
        assert!(OperatorShift::new("op1", date, -1, 28).check().is_err());
        assert!(OperatorShift::new("op1", date, 28, 96).check().is_err());
    }

    #[test]
    fn pattern_critical_path_linear_chain() {
        let pattern = JobPattern::new("p1", "two step")
            .task(PatternTask::new("a").mode(TaskMode::new("mo1", "a", "m1", 30)))
            .task(PatternTask::new("b").mode(TaskMode::new("mo2", "b", "m1", 45)))
            .precedence("a", "b");
        assert_eq!(pattern.critical_path_units(), Some(5));
        assert!(pattern.validate().is_empty());
    }

    #[test]
    fn pattern_detects_cycle() {
        let pattern = JobPattern::new("p1", "cyclic")
            .task(PatternTask::new("a").mode(TaskMode::new("mo1", "a", "m1", 15)))
            .task(PatternTask::new("b").mode(TaskMode::new("mo2", "b", "m1", 15)))
            .precedence("a", "b")
            .precedence("b", "a");
        assert_eq!(pattern.critical_path_units(), None);
        assert!(!pattern.validate().is_empty());
    }

    #[test]
    fn pattern_flags_dangling_precedence() {
        let pattern = JobPattern::new("p1", "dangling")
            .task(PatternTask::new("a").mode(TaskMode::new("mo1", "a", "m1", 15)))
            .precedence("a", "ghost");
        let issues = pattern.validate();
        assert!(issues.iter().any(|i| i.contains("ghost")));
    }
}
