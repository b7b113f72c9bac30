//! Problem Assembly
//!
//! [`SchedulingProblem`] owns every entity of a scheduling problem and the
//! ID-keyed lookup indices built over them. Entities are immutable after
//! assembly; the constraint compiler borrows the problem by shared
//! reference.
//!
//! Two input shapes are supported:
//! - **unique mode**: explicit `jobs` + `precedences`
//! - **pattern mode**: one [`JobPattern`](crate::JobPattern) plus N
//!   lightweight [`JobInstance`](crate::JobInstance)s
//!
//! Pattern expansion is virtual: instance task IDs are derived on the fly
//! with [`instance_task_id`] and pattern precedences are materialized
//! lazily per instance, keeping memory `O(|pattern| + |instances|)`
//! instead of `O(|pattern| * |instances|)`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::TimeGrid;
use crate::{
    EntityError, InstanceId, Job, JobId, JobInstance, JobPattern, Machine, MachineId,
    Operator, OperatorId, OperatorShift, PatternTask, Precedence, Skill, SkillId, Task,
    TaskId, TaskSkillRequirement, WorkCell,
};

/// Identifies one expanded task: `(job or instance ID, task ID)`
pub type TaskKey = (String, String);

/// Derive the concrete task ID for a pattern task within an instance.
///
/// The first underscore is the separator, so the inverse is unique as
/// long as instance IDs contain no underscores.
pub fn instance_task_id(instance_id: &str, pattern_task_id: &str) -> TaskId {
    format!("{instance_id}_{pattern_task_id}")
}

/// Split an expanded task ID back into `(instance_id, pattern_task_id)`
pub fn parse_instance_task_id(task_id: &str) -> Option<(&str, &str)> {
    task_id.split_once('_')
}

// ============================================================================
// Task references (unique / pattern variants)
// ============================================================================

#[derive(Clone, Copy, Debug)]
enum TaskBody<'a> {
    Unique(&'a Task),
    Pattern(&'a PatternTask),
}

/// A borrowed view of one expanded task.
///
/// Unifies [`Task`] and [`PatternTask`] behind the shared behavioural
/// contract the constraint compiler needs (modes, durations, operator
/// bounds), so constraint code dispatches on the variant exactly once.
#[derive(Clone, Debug)]
pub struct TaskRef<'a> {
    /// Owning job ID (unique mode) or instance ID (pattern mode)
    pub entity_id: String,
    /// Concrete task ID (derived in pattern mode)
    pub task_id: TaskId,
    body: TaskBody<'a>,
}

impl<'a> TaskRef<'a> {
    /// `(entity_id, task_id)` key for variable dictionaries
    pub fn key(&self) -> TaskKey {
        (self.entity_id.clone(), self.task_id.clone())
    }

    /// The ID skill requirements are keyed by: the pattern task ID in
    /// pattern mode, the task ID itself otherwise
    pub fn requirement_id(&self) -> &str {
        match self.body {
            TaskBody::Unique(t) => &t.task_id,
            TaskBody::Pattern(t) => &t.pattern_task_id,
        }
    }

    pub fn name(&self) -> &str {
        match self.body {
            TaskBody::Unique(t) => &t.name,
            TaskBody::Pattern(t) => &t.name,
        }
    }

    pub fn is_unattended(&self) -> bool {
        match self.body {
            TaskBody::Unique(t) => t.is_unattended,
            TaskBody::Pattern(t) => t.is_unattended,
        }
    }

    pub fn is_setup(&self) -> bool {
        match self.body {
            TaskBody::Unique(t) => t.is_setup,
            TaskBody::Pattern(t) => t.is_setup,
        }
    }

    pub fn modes(&self) -> &'a [crate::TaskMode] {
        match self.body {
            TaskBody::Unique(t) => &t.modes,
            TaskBody::Pattern(t) => &t.modes,
        }
    }

    pub fn eligible_machines(&self) -> Vec<MachineId> {
        self.modes()
            .iter()
            .map(|m| m.machine_resource_id.clone())
            .collect()
    }

    pub fn min_duration_minutes(&self) -> i64 {
        match self.body {
            TaskBody::Unique(t) => t.min_duration_minutes(),
            TaskBody::Pattern(t) => t.min_duration_minutes(),
        }
    }

    pub fn max_duration_minutes(&self) -> i64 {
        match self.body {
            TaskBody::Unique(t) => t.max_duration_minutes(),
            TaskBody::Pattern(t) => t.max_duration_minutes(),
        }
    }

    pub fn duration_on_machine(&self, machine_id: &str) -> Option<i64> {
        match self.body {
            TaskBody::Unique(t) => t.duration_on_machine(machine_id),
            TaskBody::Pattern(t) => t.duration_on_machine(machine_id),
        }
    }

    pub fn min_operators(&self) -> i64 {
        match self.body {
            TaskBody::Unique(t) => t.min_operators,
            TaskBody::Pattern(t) => t.min_operators,
        }
    }

    pub fn max_operators(&self) -> i64 {
        match self.body {
            TaskBody::Unique(t) => t.max_operators,
            TaskBody::Pattern(t) => t.max_operators,
        }
    }
}

// ============================================================================
// Setup times
// ============================================================================

/// One sequence-dependent setup entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetupTimeEntry {
    pub from_task: TaskId,
    pub to_task: TaskId,
    pub machine: MachineId,
    /// Gap in time units; 0 means no constraint
    pub units: i64,
}

/// Sequence-dependent setup times `(from, to, machine) -> TU`.
///
/// Serialized as a flat entry list; value 0 is treated as absence.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SetupTimeEntry>", into = "Vec<SetupTimeEntry>")]
pub struct SetupTimes {
    entries: BTreeMap<(TaskId, TaskId, MachineId), i64>,
}

impl SetupTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        machine: impl Into<String>,
        units: i64,
    ) {
        self.entries
            .insert((from.into(), to.into(), machine.into()), units);
    }

    /// Setup gap for an exact `(from, to, machine)` triple, 0 by default
    pub fn get(&self, from: &str, to: &str, machine: &str) -> i64 {
        self.entries
            .get(&(from.to_string(), to.to_string(), machine.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Gap for two expanded task IDs: tries the exact triple first, then
    /// the pattern-task pair obtained by stripping instance prefixes
    pub fn get_expanded(&self, from: &str, to: &str, machine: &str) -> i64 {
        let exact = self.get(from, to, machine);
        if exact > 0 {
            return exact;
        }
        match (parse_instance_task_id(from), parse_instance_task_id(to)) {
            (Some((_, f)), Some((_, t))) => self.get(f, t, machine),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl From<Vec<SetupTimeEntry>> for SetupTimes {
    fn from(entries: Vec<SetupTimeEntry>) -> Self {
        let mut map = Self::new();
        for e in entries {
            map.insert(e.from_task, e.to_task, e.machine, e.units);
        }
        map
    }
}

impl From<SetupTimes> for Vec<SetupTimeEntry> {
    fn from(map: SetupTimes) -> Self {
        map.entries
            .into_iter()
            .map(|((from_task, to_task, machine), units)| SetupTimeEntry {
                from_task,
                to_task,
                machine,
                units,
            })
            .collect()
    }
}

// ============================================================================
// Scheduling problem
// ============================================================================

/// Complete problem definition for the solver.
///
/// Owns all entities and the lookup indices over them. Call
/// [`SchedulingProblem::reindex`] after deserializing or mutating.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulingProblem {
    pub jobs: Vec<Job>,
    pub machines: Vec<Machine>,
    pub work_cells: Vec<WorkCell>,
    pub precedences: Vec<Precedence>,

    // Operator & skill data (optional; operator constraint families are
    // only compiled when operators are present)
    #[serde(default)]
    pub operators: Vec<Operator>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub task_skill_requirements: Vec<TaskSkillRequirement>,
    #[serde(default)]
    pub operator_shifts: Vec<OperatorShift>,

    // Pattern mode
    #[serde(default)]
    pub pattern: Option<JobPattern>,
    #[serde(default)]
    pub instances: Vec<JobInstance>,

    /// Wall-clock anchor for unit 0
    #[serde(default)]
    pub grid: TimeGrid,

    // Lookup indices, rebuilt by `reindex`
    #[serde(skip)]
    machine_index: BTreeMap<MachineId, usize>,
    #[serde(skip)]
    job_index: BTreeMap<JobId, usize>,
    #[serde(skip)]
    task_index: BTreeMap<TaskId, (usize, usize)>,
    #[serde(skip)]
    instance_index: BTreeMap<InstanceId, usize>,
    #[serde(skip)]
    operator_index: BTreeMap<OperatorId, usize>,
    #[serde(skip)]
    skill_index: BTreeMap<SkillId, usize>,
    #[serde(skip)]
    task_skill_index: BTreeMap<TaskId, Vec<usize>>,
}

impl SchedulingProblem {
    /// Assemble a unique-mode problem
    pub fn new(
        jobs: Vec<Job>,
        machines: Vec<Machine>,
        work_cells: Vec<WorkCell>,
        precedences: Vec<Precedence>,
    ) -> Self {
        let mut problem = Self {
            jobs,
            machines,
            work_cells,
            precedences,
            operators: Vec::new(),
            skills: Vec::new(),
            task_skill_requirements: Vec::new(),
            operator_shifts: Vec::new(),
            pattern: None,
            instances: Vec::new(),
            grid: TimeGrid::default(),
            machine_index: BTreeMap::new(),
            job_index: BTreeMap::new(),
            task_index: BTreeMap::new(),
            instance_index: BTreeMap::new(),
            operator_index: BTreeMap::new(),
            skill_index: BTreeMap::new(),
            task_skill_index: BTreeMap::new(),
        };
        problem.reindex();
        problem
    }

    /// Assemble a pattern-mode problem
    pub fn from_pattern(
        pattern: JobPattern,
        instances: Vec<JobInstance>,
        machines: Vec<Machine>,
        work_cells: Vec<WorkCell>,
    ) -> Self {
        let mut problem = Self::new(Vec::new(), machines, work_cells, Vec::new());
        problem.pattern = Some(pattern);
        problem.instances = instances;
        problem.reindex();
        problem
    }

    pub fn with_operators(
        mut self,
        operators: Vec<Operator>,
        skills: Vec<Skill>,
        requirements: Vec<TaskSkillRequirement>,
        shifts: Vec<OperatorShift>,
    ) -> Self {
        self.operators = operators;
        self.skills = skills;
        self.task_skill_requirements = requirements;
        self.operator_shifts = shifts;
        self.reindex();
        self
    }

    pub fn is_pattern_mode(&self) -> bool {
        self.pattern.is_some()
    }

    /// Rebuild every lookup index and the task precedence back-references.
    ///
    /// Must be called after deserialization or direct field mutation.
    pub fn reindex(&mut self) {
        self.machine_index = self
            .machines
            .iter()
            .enumerate()
            .map(|(i, m)| (m.resource_id.clone(), i))
            .collect();
        self.job_index = self
            .jobs
            .iter()
            .enumerate()
            .map(|(i, j)| (j.job_id.clone(), i))
            .collect();
        self.instance_index = self
            .instances
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.instance_id.clone(), i))
            .collect();
        self.operator_index = self
            .operators
            .iter()
            .enumerate()
            .map(|(i, o)| (o.operator_id.clone(), i))
            .collect();
        self.skill_index = self
            .skills
            .iter()
            .enumerate()
            .map(|(i, s)| (s.skill_id.clone(), i))
            .collect();

        self.task_index = BTreeMap::new();
        for (ji, job) in self.jobs.iter().enumerate() {
            for (ti, task) in job.tasks.iter().enumerate() {
                self.task_index.insert(task.task_id.clone(), (ji, ti));
            }
        }

        self.task_skill_index = BTreeMap::new();
        for (ri, req) in self.task_skill_requirements.iter().enumerate() {
            self.task_skill_index
                .entry(req.task_id.clone())
                .or_default()
                .push(ri);
        }

        // Rebuild precedence back-references from the canonical lists
        for job in &mut self.jobs {
            for task in &mut job.tasks {
                task.precedence_successors.clear();
                task.precedence_predecessors.clear();
            }
        }
        let pairs: Vec<(TaskId, TaskId)> = self
            .precedences
            .iter()
            .map(|p| (p.predecessor_task_id.clone(), p.successor_task_id.clone()))
            .collect();
        for (pred, succ) in pairs {
            if let Some(&(ji, ti)) = self.task_index.get(&pred) {
                self.jobs[ji].tasks[ti].precedence_successors.push(succ.clone());
            }
            if let Some(&(ji, ti)) = self.task_index.get(&succ) {
                self.jobs[ji].tasks[ti].precedence_predecessors.push(pred);
            }
        }

        if let Some(pattern) = &mut self.pattern {
            for task in &mut pattern.pattern_tasks {
                task.precedence_successors.clear();
                task.precedence_predecessors.clear();
            }
            let pairs: Vec<(TaskId, TaskId)> = pattern
                .pattern_precedences
                .iter()
                .map(|p| {
                    (
                        p.predecessor_pattern_task_id.clone(),
                        p.successor_pattern_task_id.clone(),
                    )
                })
                .collect();
            for (pred, succ) in pairs {
                if let Some(t) = pattern
                    .pattern_tasks
                    .iter_mut()
                    .find(|t| t.pattern_task_id == pred)
                {
                    t.precedence_successors.push(succ.clone());
                }
                if let Some(t) = pattern
                    .pattern_tasks
                    .iter_mut()
                    .find(|t| t.pattern_task_id == succ)
                {
                    t.precedence_predecessors.push(pred);
                }
            }
        }
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn get_machine(&self, machine_id: &str) -> Option<&Machine> {
        self.machine_index.get(machine_id).map(|&i| &self.machines[i])
    }

    pub fn get_job(&self, job_id: &str) -> Option<&Job> {
        self.job_index.get(job_id).map(|&i| &self.jobs[i])
    }

    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.task_index
            .get(task_id)
            .map(|&(ji, ti)| &self.jobs[ji].tasks[ti])
    }

    pub fn get_instance(&self, instance_id: &str) -> Option<&JobInstance> {
        self.instance_index
            .get(instance_id)
            .map(|&i| &self.instances[i])
    }

    pub fn get_operator(&self, operator_id: &str) -> Option<&Operator> {
        self.operator_index
            .get(operator_id)
            .map(|&i| &self.operators[i])
    }

    pub fn get_skill(&self, skill_id: &str) -> Option<&Skill> {
        self.skill_index.get(skill_id).map(|&i| &self.skills[i])
    }

    /// Skill requirements keyed by task ID (pattern-task ID in pattern mode)
    pub fn skill_requirements_for(&self, requirement_id: &str) -> Vec<&TaskSkillRequirement> {
        self.task_skill_index
            .get(requirement_id)
            .map(|ids| ids.iter().map(|&i| &self.task_skill_requirements[i]).collect())
            .unwrap_or_default()
    }

    /// Machines of a cell, in ID order
    pub fn machines_in_cell(&self, cell_id: &str) -> Vec<&Machine> {
        self.machine_index
            .values()
            .map(|&i| &self.machines[i])
            .filter(|m| m.cell_id == cell_id)
            .collect()
    }

    pub fn total_machine_capacity(&self) -> i64 {
        self.machines.iter().map(|m| m.capacity).sum()
    }

    pub fn total_task_count(&self) -> usize {
        if let Some(pattern) = &self.pattern {
            self.instances.len() * pattern.task_count()
        } else {
            self.jobs.iter().map(Job::task_count).sum()
        }
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    /// All expanded tasks in deterministic order: jobs by ID with their
    /// tasks in job order, then instances by ID with pattern tasks in
    /// pattern order.
    pub fn expanded_tasks(&self) -> Vec<TaskRef<'_>> {
        let mut out = Vec::with_capacity(self.total_task_count());
        for &ji in self.job_index.values() {
            let job = &self.jobs[ji];
            for task in &job.tasks {
                out.push(TaskRef {
                    entity_id: job.job_id.clone(),
                    task_id: task.task_id.clone(),
                    body: TaskBody::Unique(task),
                });
            }
        }
        if let Some(pattern) = &self.pattern {
            for &ii in self.instance_index.values() {
                let instance = &self.instances[ii];
                for ptask in &pattern.pattern_tasks {
                    out.push(TaskRef {
                        entity_id: instance.instance_id.clone(),
                        task_id: instance_task_id(
                            &instance.instance_id,
                            &ptask.pattern_task_id,
                        ),
                        body: TaskBody::Pattern(ptask),
                    });
                }
            }
        }
        out
    }

    /// Expanded tasks of one job or instance, in processing order
    pub fn entity_tasks(&self, entity_id: &str) -> Vec<TaskRef<'_>> {
        if let Some(&ji) = self.job_index.get(entity_id) {
            let job = &self.jobs[ji];
            return job
                .tasks
                .iter()
                .map(|task| TaskRef {
                    entity_id: job.job_id.clone(),
                    task_id: task.task_id.clone(),
                    body: TaskBody::Unique(task),
                })
                .collect();
        }
        if let (Some(pattern), Some(&ii)) = (&self.pattern, self.instance_index.get(entity_id))
        {
            let instance = &self.instances[ii];
            return pattern
                .pattern_tasks
                .iter()
                .map(|ptask| TaskRef {
                    entity_id: instance.instance_id.clone(),
                    task_id: instance_task_id(&instance.instance_id, &ptask.pattern_task_id),
                    body: TaskBody::Pattern(ptask),
                })
                .collect();
        }
        Vec::new()
    }

    /// Job/instance IDs with their due dates, in ID order
    pub fn due_dates(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        let mut out = Vec::new();
        for &ji in self.job_index.values() {
            out.push((self.jobs[ji].job_id.clone(), self.jobs[ji].due_date));
        }
        for &ii in self.instance_index.values() {
            out.push((
                self.instances[ii].instance_id.clone(),
                self.instances[ii].due_date,
            ));
        }
        out
    }

    /// All precedence pairs over expanded task keys.
    ///
    /// In pattern mode the pattern's precedences are materialized lazily,
    /// one pair per instance, without storing per-instance records.
    pub fn precedence_pairs(&self) -> Vec<(TaskKey, TaskKey)> {
        let mut out = Vec::new();
        for prec in &self.precedences {
            let (Some(pred), Some(succ)) = (
                self.get_task(&prec.predecessor_task_id),
                self.get_task(&prec.successor_task_id),
            ) else {
                continue;
            };
            out.push((
                (pred.job_id.clone(), pred.task_id.clone()),
                (succ.job_id.clone(), succ.task_id.clone()),
            ));
        }
        if let Some(pattern) = &self.pattern {
            for &ii in self.instance_index.values() {
                let instance = &self.instances[ii];
                for prec in &pattern.pattern_precedences {
                    out.push((
                        (
                            instance.instance_id.clone(),
                            instance_task_id(
                                &instance.instance_id,
                                &prec.predecessor_pattern_task_id,
                            ),
                        ),
                        (
                            instance.instance_id.clone(),
                            instance_task_id(
                                &instance.instance_id,
                                &prec.successor_pattern_task_id,
                            ),
                        ),
                    ));
                }
            }
        }
        out
    }

    // ========================================================================
    // Operator qualification
    // ========================================================================

    /// Operators qualified for a task: active, meeting every mandatory
    /// skill requirement at the required level. With no requirements,
    /// every active operator qualifies.
    pub fn qualified_operators(&self, requirement_id: &str) -> Vec<&Operator> {
        let requirements = self.skill_requirements_for(requirement_id);
        self.operator_index
            .values()
            .map(|&i| &self.operators[i])
            .filter(|op| {
                op.is_active
                    && requirements.iter().all(|req| {
                        !req.is_mandatory || op.has_skill(&req.skill_id, req.required_level)
                    })
            })
            .collect()
    }

    /// Weight-averaged efficiency multiplier of an operator on a task.
    ///
    /// 0.0 when any mandatory skill is unmet; 1.0 when the task has no
    /// skill requirements.
    pub fn operator_task_efficiency(&self, operator_id: &str, requirement_id: &str) -> f64 {
        let Some(operator) = self.get_operator(operator_id) else {
            return 0.0;
        };
        let requirements = self.skill_requirements_for(requirement_id);
        if requirements.is_empty() {
            return 1.0;
        }

        let mut total_weight = 0.0;
        let mut weighted = 0.0;
        for req in requirements {
            if req.is_mandatory && !operator.has_skill(&req.skill_id, req.required_level) {
                return 0.0;
            }
            weighted += operator.skill_efficiency(&req.skill_id) * req.weight;
            total_weight += req.weight;
        }
        if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        }
    }

    /// Shifts of one operator, available ones only
    pub fn shifts_for(&self, operator_id: &str) -> Vec<&OperatorShift> {
        self.operator_shifts
            .iter()
            .filter(|s| s.operator_id == operator_id && s.is_available)
            .collect()
    }

    /// True when every instance shares one due date (or none have one);
    /// instance-permutation symmetry breaking is only sound then
    pub fn instances_interchangeable(&self) -> bool {
        let mut dues = self.instances.iter().map(|i| i.due_date);
        let Some(first) = dues.next() else { return true };
        dues.all(|d| d == first)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check constructor-time invariants on every owned entity
    pub fn check_entities(&self) -> Result<(), EntityError> {
        for machine in &self.machines {
            machine.check()?;
        }
        for cell in &self.work_cells {
            cell.check()?;
        }
        for job in &self.jobs {
            for task in &job.tasks {
                task.check()?;
            }
        }
        for prec in &self.precedences {
            prec.check()?;
        }
        if let Some(pattern) = &self.pattern {
            for task in &pattern.pattern_tasks {
                task.check()?;
            }
        }
        for skill in &self.skills {
            skill.check()?;
        }
        for operator in &self.operators {
            operator.check()?;
        }
        for req in &self.task_skill_requirements {
            req.check()?;
        }
        for shift in &self.operator_shifts {
            shift.check()?;
        }
        Ok(())
    }

    /// Validate problem integrity. Returns a list of issues; empty means
    /// the problem is ready to compile.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if let Some(pattern) = &self.pattern {
            for issue in pattern.validate() {
                issues.push(format!("pattern: {issue}"));
            }

            for ptask in &pattern.pattern_tasks {
                for mode in &ptask.modes {
                    if self.get_machine(&mode.machine_resource_id).is_none() {
                        issues.push(format!(
                            "pattern task {} references non-existent machine {}",
                            ptask.name, mode.machine_resource_id
                        ));
                    }
                }
            }

            for instance in &self.instances {
                if instance.pattern_id != pattern.pattern_id {
                    issues.push(format!(
                        "instance {} references unknown pattern {}",
                        instance.instance_id, instance.pattern_id
                    ));
                }
            }
        }

        for job in &self.jobs {
            for task in &job.tasks {
                if task.modes.is_empty() {
                    issues.push(format!("task {} has no modes", task.name));
                }
                for mode in &task.modes {
                    if self.get_machine(&mode.machine_resource_id).is_none() {
                        issues.push(format!(
                            "task {} references non-existent machine {}",
                            task.name, mode.machine_resource_id
                        ));
                    }
                }
            }
        }

        for prec in &self.precedences {
            if self.get_task(&prec.predecessor_task_id).is_none() {
                issues.push(format!(
                    "precedence references non-existent predecessor {}",
                    prec.predecessor_task_id
                ));
            }
            if self.get_task(&prec.successor_task_id).is_none() {
                issues.push(format!(
                    "precedence references non-existent successor {}",
                    prec.successor_task_id
                ));
            }
            if prec.predecessor_task_id == prec.successor_task_id {
                issues.push(format!(
                    "circular precedence on task {}",
                    prec.predecessor_task_id
                ));
            }
        }

        for req in &self.task_skill_requirements {
            if self.get_skill(&req.skill_id).is_none() {
                issues.push(format!(
                    "skill requirement for task {} references unknown skill {}",
                    req.task_id, req.skill_id
                ));
            }
        }

        for shift in &self.operator_shifts {
            if self.get_operator(&shift.operator_id).is_none() {
                issues.push(format!(
                    "shift references unknown operator {}",
                    shift.operator_id
                ));
            }
        }

        issues
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TaskMode, WorkCell};
    use pretty_assertions::assert_eq;

    fn machines() -> Vec<Machine> {
        vec![
            Machine::new("m1", "c1", "Machine 1"),
            Machine::new("m2", "c1", "Machine 2"),
        ]
    }

    fn two_task_job() -> Job {
        Job::new("j1", "job one")
            .task(Task::new("a", "j1").mode(TaskMode::new("mo-a", "a", "m1", 30)))
            .task(Task::new("b", "j1").mode(TaskMode::new("mo-b", "b", "m1", 45)))
    }

    #[test]
    fn instance_task_id_round_trip() {
        let id = instance_task_id("inst1", "p1_grind");
        assert_eq!(id, "inst1_p1_grind");
        // only the first underscore separates
        assert_eq!(parse_instance_task_id(&id), Some(("inst1", "p1_grind")));
    }

    #[test]
    fn assembly_builds_precedence_back_references() {
        let problem = SchedulingProblem::new(
            vec![two_task_job()],
            machines(),
            vec![],
            vec![Precedence::new("a", "b")],
        );
        let a = problem.get_task("a").unwrap();
        assert_eq!(a.precedence_successors, vec!["b".to_string()]);
        let b = problem.get_task("b").unwrap();
        assert_eq!(b.precedence_predecessors, vec!["a".to_string()]);
    }

    #[test]
    fn reindex_is_idempotent_for_back_references() {
        let mut problem = SchedulingProblem::new(
            vec![two_task_job()],
            machines(),
            vec![],
            vec![Precedence::new("a", "b")],
        );
        problem.reindex();
        problem.reindex();
        assert_eq!(problem.get_task("a").unwrap().precedence_successors.len(), 1);
    }

    #[test]
    fn expanded_tasks_cover_pattern_instances() {
        let pattern = JobPattern::new("p1", "pair")
            .task(PatternTask::new("s1").mode(TaskMode::new("mo1", "s1", "m1", 30)))
            .task(PatternTask::new("s2").mode(TaskMode::new("mo2", "s2", "m1", 30)))
            .precedence("s1", "s2");
        let instances = vec![
            JobInstance::new("i1", "p1", "first"),
            JobInstance::new("i2", "p1", "second"),
        ];
        let problem =
            SchedulingProblem::from_pattern(pattern, instances, machines(), vec![]);

        let tasks = problem.expanded_tasks();
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].key(), ("i1".to_string(), "i1_s1".to_string()));
        assert_eq!(tasks[3].key(), ("i2".to_string(), "i2_s2".to_string()));

        // lazily materialized precedences, one pair per instance
        let pairs = problem.precedence_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(
            pairs[0],
            (
                ("i1".to_string(), "i1_s1".to_string()),
                ("i1".to_string(), "i1_s2".to_string())
            )
        );
    }

    #[test]
    fn validate_accepts_well_formed_problem() {
        let problem = SchedulingProblem::new(
            vec![two_task_job()],
            machines(),
            vec![WorkCell::new("c1", "Cell").capacity(2)],
            vec![Precedence::new("a", "b")],
        );
        assert!(problem.validate().is_empty());
        assert!(problem.check_entities().is_ok());
    }

    #[test]
    fn validate_flags_unknown_machine_and_empty_modes() {
        let job = Job::new("j1", "job")
            .task(Task::new("a", "j1").mode(TaskMode::new("mo", "a", "ghost", 30)))
            .task(Task::new("b", "j1"));
        let problem = SchedulingProblem::new(vec![job], machines(), vec![], vec![]);
        let issues = problem.validate();
        assert!(issues.iter().any(|i| i.contains("ghost")));
        assert!(issues.iter().any(|i| i.contains("no modes")));
    }

    #[test]
    fn validate_flags_dangling_precedence() {
        let problem = SchedulingProblem::new(
            vec![two_task_job()],
            machines(),
            vec![],
            vec![Precedence::new("a", "ghost")],
        );
        assert!(problem
            .validate()
            .iter()
            .any(|i| i.contains("non-existent successor ghost")));
    }

    #[test]
    fn validate_flags_foreign_pattern_instance() {
        let pattern = JobPattern::new("p1", "single")
            .task(PatternTask::new("s1").mode(TaskMode::new("mo1", "s1", "m1", 30)));
        let problem = SchedulingProblem::from_pattern(
            pattern,
            vec![JobInstance::new("i1", "other", "stray")],
            machines(),
            vec![],
        );
        assert!(problem
            .validate()
            .iter()
            .any(|i| i.contains("unknown pattern other")));
    }

    #[test]
    fn qualified_operators_respect_mandatory_levels() {
        use crate::SkillLevel;
        let problem = SchedulingProblem::new(vec![two_task_job()], machines(), vec![], vec![])
            .with_operators(
                vec![
                    Operator::new("op1", "Sam").skill("weld", SkillLevel::Expert),
                    Operator::new("op2", "Kit").skill("weld", SkillLevel::Novice),
                ],
                vec![Skill::new("weld", "Welding")],
                vec![TaskSkillRequirement::new("a", "weld", SkillLevel::Competent)],
                vec![],
            );

        let qualified = problem.qualified_operators("a");
        assert_eq!(qualified.len(), 1);
        assert_eq!(qualified[0].operator_id, "op1");

        // no requirements: everyone active qualifies
        assert_eq!(problem.qualified_operators("b").len(), 2);
    }

    #[test]
    fn efficiency_is_weight_averaged_and_gated() {
        use crate::SkillLevel;
        let mut req_weld = TaskSkillRequirement::new("a", "weld", SkillLevel::Novice);
        req_weld.weight = 3.0;
        let mut req_grind = TaskSkillRequirement::new("a", "grind", SkillLevel::Novice);
        req_grind.weight = 1.0;

        let problem = SchedulingProblem::new(vec![two_task_job()], machines(), vec![], vec![])
            .with_operators(
                vec![Operator::new("op1", "Sam")
                    .skill("weld", SkillLevel::Expert)
                    .skill("grind", SkillLevel::Novice)],
                vec![Skill::new("weld", "Welding"), Skill::new("grind", "Grinding")],
                vec![req_weld, req_grind],
                vec![],
            );

        // (1.25 * 3 + 0.5 * 1) / 4
        let eff = problem.operator_task_efficiency("op1", "a");
        assert!((eff - 1.0625).abs() < 1e-9);

        // unknown operator is 0, no-requirement task is 1
        assert_eq!(problem.operator_task_efficiency("ghost", "a"), 0.0);
        assert_eq!(problem.operator_task_efficiency("op1", "b"), 1.0);
    }

    #[test]
    fn interchangeable_instances_share_due_dates() {
        let pattern = JobPattern::new("p1", "single")
            .task(PatternTask::new("s1").mode(TaskMode::new("mo1", "s1", "m1", 30)));
        let grid = TimeGrid::default();
        let mut problem = SchedulingProblem::from_pattern(
            pattern,
            vec![
                JobInstance::new("i1", "p1", "first"),
                JobInstance::new("i2", "p1", "second"),
            ],
            machines(),
            vec![],
        );
        assert!(problem.instances_interchangeable());

        problem.instances[0].due_date = Some(grid.datetime_at(96));
        problem.reindex();
        assert!(!problem.instances_interchangeable());

        problem.instances[1].due_date = Some(grid.datetime_at(96));
        problem.reindex();
        assert!(problem.instances_interchangeable());
    }

    #[test]
    fn problem_survives_serde_round_trip() {
        let mut problem = SchedulingProblem::new(
            vec![two_task_job()],
            machines(),
            vec![],
            vec![Precedence::new("a", "b")],
        );
        let json = serde_json::to_string(&problem).unwrap();
        let mut restored: SchedulingProblem = serde_json::from_str(&json).unwrap();
        restored.reindex();
        problem.reindex();
        assert_eq!(restored.expanded_tasks().len(), problem.expanded_tasks().len());
        assert_eq!(restored.get_task("a").unwrap().precedence_successors.len(), 1);
    }

    #[test]
    fn setup_times_default_to_zero_and_fall_back_to_pattern_ids() {
        let mut setups = SetupTimes::new();
        setups.insert("x", "y", "m1", 2);
        assert_eq!(setups.get("x", "y", "m1"), 2);
        assert_eq!(setups.get("y", "x", "m1"), 0);
        // expanded IDs fall back to the pattern-task pair
        assert_eq!(setups.get_expanded("i1_x", "i1_y", "m1"), 2);
        assert_eq!(setups.get_expanded("i1_x", "i2_y", "m1"), 2);
    }
}
