//! Read-time statistics over the task and goal stores. Nothing here is
//! stored; every view is recomputed from the current items. Calendar days
//! are UTC days.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Goal, Priority, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    Week,
    Month,
    All,
}

impl TimeWindow {
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::Week => Some(7),
            Self::Month => Some(30),
            Self::All => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::All => "all",
        }
    }
}

/// Tasks created inside the window ending at `now`.
pub fn tasks_in_window(tasks: &[Task], window: TimeWindow, now: DateTime<Utc>) -> Vec<&Task> {
    match window.days() {
        Some(days) => {
            let start = now - Duration::days(days);
            tasks.iter().filter(|t| t.created_at >= start).collect()
        }
        None => tasks.iter().collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overview {
    pub completed: usize,
    pub total: usize,
}

pub fn overview(tasks: &[Task], window: TimeWindow, now: DateTime<Utc>) -> Overview {
    let in_window = tasks_in_window(tasks, window, now);
    Overview {
        completed: in_window.iter().filter(|t| t.completed).count(),
        total: in_window.len(),
    }
}

/// Number of tasks per priority, highest first. Every priority is listed.
pub fn priority_distribution(tasks: &[Task], window: TimeWindow, now: DateTime<Utc>) -> Vec<(Priority, usize)> {
    let in_window = tasks_in_window(tasks, window, now);
    Priority::ALL
        .iter()
        .map(|p| (*p, in_window.iter().filter(|t| t.priority == *p).count()))
        .collect()
}

fn completion_day(task: &Task) -> Option<NaiveDate> {
    if !task.completed {
        return None;
    }
    task.completed_at.map(|at| at.date_naive())
}

/// Consecutive days, counting back from `today`, on which at least one task
/// was completed. A day without completions ends the streak, so nothing
/// completed today means a streak of zero.
pub fn completion_streak(tasks: &[Task], today: NaiveDate) -> u32 {
    let days: HashSet<NaiveDate> = tasks.iter().filter_map(completion_day).collect();

    let mut streak = 0;
    let mut day = today;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }
    streak
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub completed: usize,
}

/// Completions per day, oldest first, ending today. The all-time window
/// starts at the earliest completion.
pub fn completion_trend(tasks: &[Task], window: TimeWindow, today: NaiveDate) -> Vec<TrendPoint> {
    let completions: Vec<NaiveDate> = tasks.iter().filter_map(completion_day).collect();

    let start = match window.days() {
        Some(days) => today - Duration::days(days - 1),
        None => completions
            .iter()
            .copied()
            .filter(|d| *d <= today)
            .min()
            .unwrap_or(today),
    };

    let mut buckets: BTreeMap<NaiveDate, usize> = start
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|d| (d, 0))
        .collect();
    for day in completions {
        if let Some(count) = buckets.get_mut(&day) {
            *count += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(date, completed)| TrendPoint { date, completed })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalProgress {
    pub completed: usize,
    /// Linked tasks that still exist.
    pub linked: usize,
    pub percent: f64,
}

impl GoalProgress {
    pub fn rounded_percent(&self) -> u32 {
        self.percent.round() as u32
    }
}

/// Share of the goal's linked tasks that are completed. Ids of deleted tasks
/// are ignored; with no live links the goal's own flag decides.
pub fn goal_progress(goal: &Goal, tasks: &[Task]) -> GoalProgress {
    let linked: Vec<&Task> = tasks.iter().filter(|t| goal.is_linked(t.id)).collect();
    if linked.is_empty() {
        return GoalProgress {
            completed: 0,
            linked: 0,
            percent: if goal.completed { 100.0 } else { 0.0 },
        };
    }

    let completed = linked.iter().filter(|t| t.completed).count();
    GoalProgress {
        completed,
        linked: linked.len(),
        percent: completed as f64 * 100.0 / linked.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn completed_on(day: NaiveDate) -> Task {
        let mut task = Task::new("done", Priority::Medium, None);
        task.completed = true;
        task.completed_at = Some(Utc.from_utc_datetime(&day.and_hms_opt(15, 0, 0).unwrap()));
        task
    }

    #[test]
    fn gap_before_today_ends_streak() {
        let tasks = vec![
            completed_on(date(2024, 1, 1)),
            completed_on(date(2024, 1, 2)),
            completed_on(date(2024, 1, 4)),
        ];
        assert_eq!(completion_streak(&tasks, date(2024, 1, 4)), 1);
        assert_eq!(completion_streak(&tasks, date(2024, 1, 2)), 2);
        assert_eq!(completion_streak(&tasks, date(2024, 1, 3)), 0);
    }

    #[test]
    fn uncompleted_tasks_do_not_count_toward_streak() {
        let mut task = completed_on(date(2024, 1, 4));
        task.completed = false;
        assert_eq!(completion_streak(&[task], date(2024, 1, 4)), 0);
    }

    #[test]
    fn goal_progress_counts_live_links() {
        let tasks: Vec<Task> = (0..3)
            .map(|i| {
                let mut t = Task::new(format!("step {}", i), Priority::Low, None);
                t.completed = i < 2;
                t
            })
            .collect();
        let mut goal = Goal::new("Ship it", "", None);
        goal.linked_task_ids = tasks.iter().map(|t| t.id).collect();

        let progress = goal_progress(&goal, &tasks);
        assert_eq!((progress.completed, progress.linked), (2, 3));
        assert!((progress.percent - 66.67).abs() < 0.01);
        assert_eq!(progress.rounded_percent(), 67);
    }

    #[test]
    fn dangling_links_are_skipped() {
        let task = completed_on(date(2024, 1, 1));
        let mut goal = Goal::new("Tidy", "", None);
        goal.linked_task_ids = vec![task.id, Uuid::new_v4()];

        let progress = goal_progress(&goal, &[task]);
        assert_eq!(progress.linked, 1);
        assert_eq!(progress.rounded_percent(), 100);
    }

    #[test]
    fn goal_without_live_links_uses_its_flag() {
        let mut goal = Goal::new("Meditate", "", None);
        goal.linked_task_ids = vec![Uuid::new_v4()];
        assert_eq!(goal_progress(&goal, &[]).percent, 0.0);

        goal.completed = true;
        assert_eq!(goal_progress(&goal, &[]).percent, 100.0);
    }

    #[test]
    fn weekly_trend_has_seven_days_ending_today() {
        let today = date(2024, 3, 10);
        let tasks = vec![
            completed_on(today),
            completed_on(today),
            completed_on(date(2024, 3, 4)),
            completed_on(date(2024, 3, 1)),
        ];

        let trend = completion_trend(&tasks, TimeWindow::Week, today);
        assert_eq!(trend.len(), 7);
        assert_eq!(trend[0], TrendPoint { date: date(2024, 3, 4), completed: 1 });
        assert_eq!(trend[6], TrendPoint { date: today, completed: 2 });
        assert_eq!(trend.iter().map(|p| p.completed).sum::<usize>(), 3);
    }

    #[test]
    fn all_time_trend_starts_at_first_completion() {
        let today = date(2024, 3, 10);
        let tasks = vec![completed_on(date(2024, 2, 20)), completed_on(today)];

        let trend = completion_trend(&tasks, TimeWindow::All, today);
        assert_eq!(trend.first().unwrap().date, date(2024, 2, 20));
        assert_eq!(trend.len(), 20);

        let empty = completion_trend(&[], TimeWindow::All, today);
        assert_eq!(empty, vec![TrendPoint { date: today, completed: 0 }]);
    }

    #[test]
    fn window_filters_by_creation_time() {
        let now = Utc::now();
        let mut old = Task::new("old", Priority::High, None);
        old.created_at = now - Duration::days(10);
        let mut fresh = Task::new("fresh", Priority::Low, None);
        fresh.completed = true;
        let tasks = vec![old, fresh];

        assert_eq!(overview(&tasks, TimeWindow::Week, now), Overview { completed: 1, total: 1 });
        assert_eq!(overview(&tasks, TimeWindow::Month, now).total, 2);
        assert_eq!(
            priority_distribution(&tasks, TimeWindow::All, now),
            vec![(Priority::High, 1), (Priority::Medium, 0), (Priority::Low, 1)]
        );
    }
}
