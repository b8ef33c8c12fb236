use chrono::{DateTime, Days, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::models::{Priority, Task};

/// Days covered by the forward-looking due chart, starting today.
pub const UPCOMING_DAYS: u64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskStatistics {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    pub completion_rate: f64,
    pub by_category: Vec<CategoryCount>,
    pub by_priority: Vec<PriorityCount>,
    pub upcoming: Vec<DayCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityCount {
    pub priority: Priority,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

pub fn completion_rate(tasks: &[Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    let completed = tasks.iter().filter(|t| t.is_completed).count();
    completed as f64 / tasks.len() as f64
}

/// Counts per category, largest first. Equal counts keep the order of `categories`, then any
/// category only tasks know about. Empty categories are left out.
pub fn category_counts(tasks: &[Task], categories: &[String]) -> Vec<CategoryCount> {
    let mut order: Vec<&str> = categories.iter().map(String::as_str).collect();
    for task in tasks {
        if !order.contains(&task.category.as_str()) {
            order.push(task.category.as_str());
        }
    }
    let mut counts: Vec<CategoryCount> = order
        .into_iter()
        .map(|category| CategoryCount {
            category: category.to_string(),
            count: tasks.iter().filter(|t| t.category == category).count(),
        })
        .filter(|c| c.count > 0)
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Always three buckets, highest priority first.
pub fn priority_counts(tasks: &[Task]) -> Vec<PriorityCount> {
    [Priority::High, Priority::Normal, Priority::Low]
        .into_iter()
        .map(|priority| PriorityCount {
            priority,
            count: tasks.iter().filter(|t| t.priority == priority).count(),
        })
        .collect()
}

/// Incomplete tasks due on each of the next `UPCOMING_DAYS` days, starting today in `tz`.
pub fn upcoming_counts<Tz: TimeZone>(tasks: &[Task], now: DateTime<Utc>, tz: &Tz) -> Vec<DayCount> {
    let today = now.with_timezone(tz).date_naive();
    (0..UPCOMING_DAYS)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .map(|date| DayCount {
            date,
            count: tasks
                .iter()
                .filter(|t| !t.is_completed && t.due_date.with_timezone(tz).date_naive() == date)
                .count(),
        })
        .collect()
}

impl TaskStatistics {
    pub fn compute(tasks: &[Task], categories: &[String]) -> Self {
        Self::compute_in(tasks, categories, Utc::now(), &Local)
    }

    pub fn compute_in<Tz: TimeZone>(
        tasks: &[Task],
        categories: &[String],
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Self {
        let completed = tasks.iter().filter(|t| t.is_completed).count();
        Self {
            total: tasks.len(),
            completed,
            pending: tasks.len() - completed,
            overdue: tasks.iter().filter(|t| t.is_overdue(now)).count(),
            completion_rate: completion_rate(tasks),
            by_category: category_counts(tasks, categories),
            by_priority: priority_counts(tasks),
            upcoming: upcoming_counts(tasks, now, tz),
        }
    }
}
