//! Multi-Objective Configuration & Pareto Analysis
//!
//! The solve driver supports four composition strategies over a common
//! set of objective kinds: lexicographic, weighted sum, epsilon
//! constraint, and Pareto frontier enumeration. This module holds the
//! configuration types with their shape validation, plus the pure data
//! structures for frontier maintenance and trade-off analysis.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Optimization objectives supported by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    MinimizeMakespan,
    MinimizeTotalLateness,
    MinimizeMaximumLateness,
    MinimizeTotalCost,
    MinimizeTotalTardiness,
    MinimizeWeightedCompletionTime,
    MaximizeMachineUtilization,
    MinimizeSetupTime,
}

impl ObjectiveKind {
    /// Direction of improvement
    pub fn is_maximization(self) -> bool {
        matches!(self, ObjectiveKind::MaximizeMachineUtilization)
    }

    /// Stable label used in reports
    pub fn label(self) -> &'static str {
        match self {
            ObjectiveKind::MinimizeMakespan => "makespan",
            ObjectiveKind::MinimizeTotalLateness => "total_lateness",
            ObjectiveKind::MinimizeMaximumLateness => "maximum_lateness",
            ObjectiveKind::MinimizeTotalCost => "total_cost",
            ObjectiveKind::MinimizeTotalTardiness => "total_tardiness",
            ObjectiveKind::MinimizeWeightedCompletionTime => "weighted_completion_time",
            ObjectiveKind::MaximizeMachineUtilization => "machine_utilization",
            ObjectiveKind::MinimizeSetupTime => "total_setup_time",
        }
    }
}

/// Multi-objective composition strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStrategy {
    /// Solve objectives in priority order, freezing each at its best
    /// value plus a tolerance
    Lexicographic,
    /// Optimize a normalized weighted combination in one solve
    WeightedSum,
    /// Bound all epsilon-carrying objectives, optimize the free one
    EpsilonConstraint,
    /// Sweep epsilon bounds to enumerate a Pareto frontier
    ParetoOptimal,
}

/// One weighted objective in a multi-objective configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectiveWeight {
    pub kind: ObjectiveKind,
    pub weight: f64,
    /// Priority for lexicographic optimization (1 = highest)
    pub priority: i64,
    /// Bound for the epsilon-constraint method
    pub epsilon_bound: Option<f64>,
    /// Target/desired value, informational
    pub target: Option<f64>,
}

impl ObjectiveWeight {
    pub fn new(kind: ObjectiveKind, weight: f64) -> Self {
        Self {
            kind,
            weight,
            priority: 1,
            epsilon_bound: None,
            target: None,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn epsilon(mut self, bound: f64) -> Self {
        self.epsilon_bound = Some(bound);
        self
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.weight < 0.0 {
            return Err(ConfigError::NegativeWeight(self.weight));
        }
        if self.priority < 1 {
            return Err(ConfigError::BadPriority(self.priority));
        }
        if let Some(eps) = self.epsilon_bound {
            if eps < 0.0 {
                return Err(ConfigError::NegativeEpsilon(eps));
            }
        }
        Ok(())
    }
}

/// Configuration for multi-objective optimization
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiObjectiveConfig {
    pub strategy: ObjectiveStrategy,
    pub objectives: Vec<ObjectiveWeight>,
    /// Relative slack applied when freezing a solved objective in
    /// lexicographic mode
    pub lexicographic_tolerance: f64,
    /// Number of epsilon sweep points for Pareto enumeration
    pub pareto_iterations: i64,
}

impl MultiObjectiveConfig {
    pub fn new(strategy: ObjectiveStrategy, objectives: Vec<ObjectiveWeight>) -> Self {
        Self {
            strategy,
            objectives,
            lexicographic_tolerance: 0.01,
            pareto_iterations: 10,
        }
    }

    /// Single-objective makespan minimization
    pub fn makespan() -> Self {
        Self::new(
            ObjectiveStrategy::Lexicographic,
            vec![ObjectiveWeight::new(ObjectiveKind::MinimizeMakespan, 1.0)],
        )
    }

    /// Validate shape rules for the chosen strategy
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.objectives.is_empty() {
            return Err(ConfigError::NoObjectives);
        }
        if self.lexicographic_tolerance <= 0.0 {
            return Err(ConfigError::BadTolerance(self.lexicographic_tolerance));
        }
        if self.pareto_iterations <= 0 {
            return Err(ConfigError::BadParetoIterations(self.pareto_iterations));
        }
        for objective in &self.objectives {
            objective.check()?;
        }

        match self.strategy {
            ObjectiveStrategy::Lexicographic => {
                let mut priorities: Vec<i64> =
                    self.objectives.iter().map(|o| o.priority).collect();
                priorities.sort_unstable();
                priorities.dedup();
                if priorities.len() != self.objectives.len() {
                    return Err(ConfigError::DuplicatePriorities);
                }
            }
            ObjectiveStrategy::WeightedSum => {
                let total: f64 = self.objectives.iter().map(|o| o.weight).sum();
                if (total - 1.0).abs() > 1e-6 {
                    return Err(ConfigError::WeightsNotNormalized(total));
                }
            }
            ObjectiveStrategy::EpsilonConstraint => {
                let free = self
                    .objectives
                    .iter()
                    .filter(|o| o.epsilon_bound.is_none())
                    .count();
                if free != 1 {
                    return Err(ConfigError::EpsilonShape);
                }
            }
            ObjectiveStrategy::ParetoOptimal => {}
        }
        Ok(())
    }

    /// Objectives sorted by priority (for lexicographic optimization)
    pub fn sorted_objectives(&self) -> Vec<&ObjectiveWeight> {
        let mut sorted: Vec<&ObjectiveWeight> = self.objectives.iter().collect();
        sorted.sort_by_key(|o| o.priority);
        sorted
    }

    /// The primary objective under the configured strategy
    pub fn primary_objective(&self) -> &ObjectiveWeight {
        match self.strategy {
            ObjectiveStrategy::Lexicographic => self
                .objectives
                .iter()
                .min_by_key(|o| o.priority)
                .expect("validated config has objectives"),
            ObjectiveStrategy::WeightedSum => self
                .objectives
                .iter()
                .max_by(|a, b| a.weight.total_cmp(&b.weight))
                .expect("validated config has objectives"),
            ObjectiveStrategy::EpsilonConstraint | ObjectiveStrategy::ParetoOptimal => self
                .objectives
                .iter()
                .find(|o| o.epsilon_bound.is_none())
                .unwrap_or(&self.objectives[0]),
        }
    }

    pub fn kinds(&self) -> Vec<ObjectiveKind> {
        self.objectives.iter().map(|o| o.kind).collect()
    }
}

// ============================================================================
// Objective values
// ============================================================================

/// Solution values for every objective kind, plus solve metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveValues {
    pub makespan: Option<i64>,
    pub total_lateness: Option<i64>,
    pub maximum_lateness: Option<i64>,
    pub total_cost: Option<f64>,
    pub total_tardiness: Option<i64>,
    pub weighted_completion_time: Option<f64>,
    pub machine_utilization: Option<f64>,
    pub total_setup_time: Option<i64>,

    /// Wall-clock seconds of the producing solve
    pub solve_time: f64,
    /// Engine status string of the producing solve
    pub solver_status: String,
    /// Primary objective value as seen by the engine
    pub objective_value: Option<f64>,
}

impl ObjectiveValues {
    pub fn get(&self, kind: ObjectiveKind) -> Option<f64> {
        match kind {
            ObjectiveKind::MinimizeMakespan => self.makespan.map(|v| v as f64),
            ObjectiveKind::MinimizeTotalLateness => self.total_lateness.map(|v| v as f64),
            ObjectiveKind::MinimizeMaximumLateness => self.maximum_lateness.map(|v| v as f64),
            ObjectiveKind::MinimizeTotalCost => self.total_cost,
            ObjectiveKind::MinimizeTotalTardiness => self.total_tardiness.map(|v| v as f64),
            ObjectiveKind::MinimizeWeightedCompletionTime => self.weighted_completion_time,
            ObjectiveKind::MaximizeMachineUtilization => self.machine_utilization,
            ObjectiveKind::MinimizeSetupTime => self.total_setup_time.map(|v| v as f64),
        }
    }

    pub fn set(&mut self, kind: ObjectiveKind, value: f64) {
        match kind {
            ObjectiveKind::MinimizeMakespan => self.makespan = Some(value as i64),
            ObjectiveKind::MinimizeTotalLateness => self.total_lateness = Some(value as i64),
            ObjectiveKind::MinimizeMaximumLateness => {
                self.maximum_lateness = Some(value as i64);
            }
            ObjectiveKind::MinimizeTotalCost => self.total_cost = Some(value),
            ObjectiveKind::MinimizeTotalTardiness => self.total_tardiness = Some(value as i64),
            ObjectiveKind::MinimizeWeightedCompletionTime => {
                self.weighted_completion_time = Some(value);
            }
            ObjectiveKind::MaximizeMachineUtilization => self.machine_utilization = Some(value),
            ObjectiveKind::MinimizeSetupTime => self.total_setup_time = Some(value as i64),
        }
    }
}

// ============================================================================
// Pareto frontier
// ============================================================================

/// One point on a Pareto frontier; `S` carries the full schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParetoSolution<S> {
    pub objectives: ObjectiveValues,
    pub schedule: S,
}

impl<S> ParetoSolution<S> {
    pub fn new(objectives: ObjectiveValues, schedule: S) -> Self {
        Self { objectives, schedule }
    }

    /// Pareto dominance: at least as good in every objective and strictly
    /// better in at least one, directions taken per objective kind
    pub fn dominates(&self, other: &Self, kinds: &[ObjectiveKind]) -> bool {
        let mut strictly_better = false;
        for &kind in kinds {
            let (Some(mine), Some(theirs)) =
                (self.objectives.get(kind), other.objectives.get(kind))
            else {
                continue;
            };
            let (better, worse) = if kind.is_maximization() {
                (mine > theirs, mine < theirs)
            } else {
                (mine < theirs, mine > theirs)
            };
            if worse {
                return false;
            }
            if better {
                strictly_better = true;
            }
        }
        strictly_better
    }
}

/// Collection of mutually non-dominated solutions
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParetoFrontier<S> {
    pub solutions: Vec<ParetoSolution<S>>,
    pub objective_kinds: Vec<ObjectiveKind>,
}

impl<S> ParetoFrontier<S> {
    pub fn new(objective_kinds: Vec<ObjectiveKind>) -> Self {
        Self {
            solutions: Vec::new(),
            objective_kinds,
        }
    }

    /// Insert a candidate, maintaining mutual non-dominance. Returns
    /// whether the candidate was kept.
    pub fn add(&mut self, candidate: ParetoSolution<S>) -> bool {
        if self
            .solutions
            .iter()
            .any(|existing| existing.dominates(&candidate, &self.objective_kinds))
        {
            return false;
        }
        self.solutions
            .retain(|existing| !candidate.dominates(existing, &self.objective_kinds));
        self.solutions.push(candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    /// Index of the best solution per objective kind
    pub fn extreme_solution(&self, kind: ObjectiveKind) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, sol) in self.solutions.iter().enumerate() {
            let Some(value) = sol.objectives.get(kind) else { continue };
            let improves = match best {
                None => true,
                Some((_, incumbent)) => {
                    if kind.is_maximization() {
                        value > incumbent
                    } else {
                        value < incumbent
                    }
                }
            };
            if improves {
                best = Some((i, value));
            }
        }
        best.map(|(i, _)| i)
    }
}

// ============================================================================
// Trade-off analysis
// ============================================================================

/// Observed range of one objective across a frontier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRange {
    pub kind: ObjectiveKind,
    pub min: f64,
    pub max: f64,
}

/// Pearson correlation between two objectives across a frontier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveCorrelation {
    pub first: ObjectiveKind,
    pub second: ObjectiveKind,
    pub coefficient: f64,
}

/// Pure analysis over a Pareto frontier: per-objective ranges, pairwise
/// correlations, and a recommended solution (closest to the ideal point
/// in range-normalized space).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TradeOffAnalysis {
    pub ranges: Vec<ObjectiveRange>,
    pub correlations: Vec<ObjectiveCorrelation>,
    /// Index into the frontier's solutions
    pub recommended: Option<usize>,
}

impl TradeOffAnalysis {
    pub fn from_frontier<S>(frontier: &ParetoFrontier<S>) -> Self {
        let kinds = &frontier.objective_kinds;

        let mut ranges = Vec::new();
        for &kind in kinds {
            let values: Vec<f64> = frontier
                .solutions
                .iter()
                .filter_map(|s| s.objectives.get(kind))
                .collect();
            if let (Some(&min), Some(&max)) = (
                values.iter().min_by(|a, b| a.total_cmp(b)),
                values.iter().max_by(|a, b| a.total_cmp(b)),
            ) {
                ranges.push(ObjectiveRange { kind, min, max });
            }
        }

        let mut correlations = Vec::new();
        for (i, &first) in kinds.iter().enumerate() {
            for &second in &kinds[i + 1..] {
                let pairs: Vec<(f64, f64)> = frontier
                    .solutions
                    .iter()
                    .filter_map(|s| {
                        Some((s.objectives.get(first)?, s.objectives.get(second)?))
                    })
                    .collect();
                if pairs.len() > 1 {
                    correlations.push(ObjectiveCorrelation {
                        first,
                        second,
                        coefficient: pearson(&pairs),
                    });
                }
            }
        }

        let recommended = recommend(frontier, &ranges);

        Self {
            ranges,
            correlations,
            recommended,
        }
    }
}

/// Pearson correlation coefficient over paired samples
fn pearson(pairs: &[(f64, f64)]) -> f64 {
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return 0.0;
    }
    let sum_x: f64 = pairs.iter().map(|p| p.0).sum();
    let sum_y: f64 = pairs.iter().map(|p| p.1).sum();
    let sum_xy: f64 = pairs.iter().map(|p| p.0 * p.1).sum();
    let sum_x2: f64 = pairs.iter().map(|p| p.0 * p.0).sum();
    let sum_y2: f64 = pairs.iter().map(|p| p.1 * p.1).sum();

    let numerator = n * sum_xy - sum_x * sum_y;
    let denom_x = n * sum_x2 - sum_x * sum_x;
    let denom_y = n * sum_y2 - sum_y * sum_y;
    if denom_x * denom_y <= 0.0 {
        return 0.0;
    }
    numerator / (denom_x * denom_y).sqrt()
}

/// Closest solution to the ideal point in range-normalized space
fn recommend<S>(frontier: &ParetoFrontier<S>, ranges: &[ObjectiveRange]) -> Option<usize> {
    if frontier.solutions.is_empty() {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, sol) in frontier.solutions.iter().enumerate() {
        let mut distance = 0.0;
        for range in ranges {
            let Some(value) = sol.objectives.get(range.kind) else { continue };
            let span = range.max - range.min;
            if span <= 0.0 {
                continue;
            }
            // ideal is min for minimization, max for maximization
            let normalized = if range.kind.is_maximization() {
                (range.max - value) / span
            } else {
                (value - range.min) / span
            };
            distance += normalized * normalized;
        }
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((i, distance));
        }
    }
    best.map(|(i, _)| i)
}

// ============================================================================
// Tests
// ============================================================================
