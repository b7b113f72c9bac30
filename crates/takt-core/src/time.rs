//! Time Grid & Horizon
//!
//! The solver works on an integer grid of 15-minute time units ("TU").
//! A day is 96 TU; business hours span TU 28-68 (07:00-16:00). Durations
//! stored in minutes are converted with a ceiling division, so a 31-minute
//! operation occupies 3 units.
//!
//! All wall-clock conversions are anchored at a single base epoch so that
//! due-date bounds and extracted schedule datetimes agree.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::problem::SchedulingProblem;

/// Minutes per time unit
pub const TIME_UNIT_MINUTES: i64 = 15;

/// Time units per day
pub const UNITS_PER_DAY: i64 = 96;

/// Time units per hour
pub const UNITS_PER_HOUR: i64 = 4;

/// Business day start, units from midnight (07:00)
pub const BUSINESS_DAY_START_TU: i64 = 28;

/// Business day end, units from midnight (16:00)
pub const BUSINESS_DAY_END_TU: i64 = 68;

/// Minimum horizon in time units (25 hours)
pub const MIN_HORIZON: i64 = 100;

/// Convert minutes to time units, rounding up
pub fn minutes_to_units(minutes: i64) -> i64 {
    (minutes + TIME_UNIT_MINUTES - 1) / TIME_UNIT_MINUTES
}

/// Convert time units back to minutes
pub fn units_to_minutes(units: i64) -> i64 {
    units * TIME_UNIT_MINUTES
}

/// Anchors the unit grid to wall-clock time.
///
/// The same grid instance must be used for due-date conversion and for
/// schedule datetime output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGrid {
    /// Wall-clock time of unit 0
    pub base: DateTime<Utc>,
}

impl Default for TimeGrid {
    fn default() -> Self {
        // Midnight on a Monday, so day offsets 0-4 are weekdays
        Self {
            base: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}

impl TimeGrid {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self { base }
    }

    /// Units from the base epoch to `at` (negative for past datetimes)
    pub fn units_from_base(&self, at: DateTime<Utc>) -> i64 {
        (at - self.base).num_minutes().div_euclid(TIME_UNIT_MINUTES)
    }

    /// Wall-clock time of a unit offset
    pub fn datetime_at(&self, units: i64) -> DateTime<Utc> {
        self.base + Duration::minutes(units_to_minutes(units))
    }

    /// Day offset (0-based) of the calendar day containing `at`
    pub fn day_index(&self, at: DateTime<Utc>) -> i64 {
        self.units_from_base(at).div_euclid(UNITS_PER_DAY)
    }
}

/// Compute the scheduling horizon for a problem.
///
/// The horizon covers the span to the latest due date and twice the total
/// minimum work content (to absorb machine conflicts), plus a 20% buffer,
/// and never drops below [`MIN_HORIZON`].
pub fn calculate_horizon(problem: &SchedulingProblem) -> i64 {
    let work_units: i64 = problem
        .expanded_tasks()
        .iter()
        .map(|t| minutes_to_units(t.min_duration_minutes()))
        .sum();

    if work_units == 0 {
        return MIN_HORIZON;
    }

    let latest_due_units = problem
        .due_dates()
        .into_iter()
        .filter_map(|(_, due)| due)
        .map(|due| problem.grid.units_from_base(due))
        .max()
        .unwrap_or(0)
        .max(0);

    let core = latest_due_units.max(2 * work_units);
    // ceil(1.2 * core) in integer arithmetic
    let buffered = (12 * core + 9) / 10;
    buffered.max(MIN_HORIZON)
}

/// Latest start bound for one task derived from its job's due date.
///
/// `remaining_work_units` is the summed minimum duration of this task and
/// every task after it in the job's order. Returns `None` when the due
/// date is already past (the bound would be unsafe; callers fall back to
/// the horizon-based domain).
pub fn calculate_latest_start(
    due_units: i64,
    remaining_work_units: i64,
    task_min_duration_units: i64,
    horizon: i64,
) -> Option<i64> {
    if due_units <= 0 {
        return None;
    }
    let latest = due_units - remaining_work_units;
    let upper = horizon - task_min_duration_units;
    Some(latest.min(upper).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Job, Machine, SchedulingProblem, Task, TaskMode};
    use pretty_assertions::assert_eq;

    fn single_task_problem(duration_minutes: i64) -> SchedulingProblem {
        let task =
            Task::new("t1", "j1").mode(TaskMode::new("mo1", "t1", "m1", duration_minutes));
        SchedulingProblem::new(
            vec![Job::new("j1", "job").task(task)],
            vec![Machine::new("m1", "c1", "Machine 1")],
            vec![],
            vec![],
        )
    }

    #[test]
    fn minutes_round_up_to_units() {
        assert_eq!(minutes_to_units(1), 1);
        assert_eq!(minutes_to_units(15), 1);
        assert_eq!(minutes_to_units(16), 2);
        assert_eq!(minutes_to_units(30), 2);
        assert_eq!(minutes_to_units(1440), 96);
    }

    #[test]
    fn grid_round_trips_unit_offsets() {
        let grid = TimeGrid::default();
        let dt = grid.datetime_at(42);
        assert_eq!(grid.units_from_base(dt), 42);
    }

    #[test]
    fn grid_base_is_a_monday() {
        let grid = TimeGrid::default();
        assert_eq!(
            grid.base.format("%A").to_string(),
            "Monday",
            "weekday window offsets assume the base epoch starts a week"
        );
    }

    #[test]
    fn units_from_base_floors_past_datetimes() {
        let grid = TimeGrid::default();
        let before = grid.base - Duration::minutes(1);
        assert_eq!(grid.units_from_base(before), -1);
    }

    #[test]
    fn horizon_has_a_floor() {
        let problem = single_task_problem(30);
        // 2 units of work: 2 * 2 * 1.2 rounds far below the floor
        assert_eq!(calculate_horizon(&problem), MIN_HORIZON);
    }

    #[test]
    fn horizon_scales_with_work_content() {
        let problem = single_task_problem(24 * 60 * 10); // ten days
        let work_units = 96 * 10;
        assert_eq!(calculate_horizon(&problem), (12 * 2 * work_units + 9) / 10);
    }

    #[test]
    fn horizon_of_empty_problem() {
        let problem = SchedulingProblem::new(vec![], vec![], vec![], vec![]);
        assert_eq!(calculate_horizon(&problem), MIN_HORIZON);
    }

    #[test]
    fn horizon_follows_far_due_dates() {
        let mut problem = single_task_problem(60);
        let due = problem.grid.datetime_at(10_000);
        problem.jobs[0].due_date = Some(due);
        problem.reindex();
        // due dominates 2x work; 20% buffer on top
        assert_eq!(calculate_horizon(&problem), (12 * 10_000 + 9) / 10);
    }

    #[test]
    fn latest_start_subtracts_remaining_work() {
        // due at unit 40, 6 units of remaining work, 2-unit task
        assert_eq!(calculate_latest_start(40, 6, 2, 100), Some(34));
    }

    #[test]
    fn latest_start_clamps_to_horizon_window() {
        assert_eq!(calculate_latest_start(500, 2, 2, 100), Some(98));
        assert_eq!(calculate_latest_start(3, 20, 2, 100), Some(0));
    }

    #[test]
    fn latest_start_unsafe_for_past_due() {
        assert_eq!(calculate_latest_start(-5, 4, 2, 100), None);
        assert_eq!(calculate_latest_start(0, 4, 2, 100), None);
    }
}
