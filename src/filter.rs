use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, TimeZone, Utc};

use crate::models::{is_reserved_category, Priority, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Named(String),
}

impl CategoryFilter {
    /// `"all"` (any case) selects every category.
    pub fn parse(value: &str) -> Self {
        if is_reserved_category(value) {
            CategoryFilter::All
        } else {
            CategoryFilter::Named(value.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Incomplete,
    Overdue,
}

impl std::str::FromStr for StatusFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "completed" | "done" => Ok(StatusFilter::Completed),
            "incomplete" | "pending" => Ok(StatusFilter::Incomplete),
            "overdue" => Ok(StatusFilter::Overdue),
            other => Err(format!("unknown status filter: {other}")),
        }
    }
}

/// Due-date window, compared on calendar days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DueWindow {
    #[default]
    All,
    Today,
    Tomorrow,
    ThisWeek,
    NextWeek,
    ThisMonth,
    Custom { from: NaiveDate, to: NaiveDate },
}

impl DueWindow {
    /// Inclusive day range for `today`, or `None` for `All`.
    fn bounds(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let plus = |days: u64| today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);
        match *self {
            DueWindow::All => None,
            DueWindow::Today => Some((today, today)),
            DueWindow::Tomorrow => Some((plus(1), plus(1))),
            // Weeks end on Sunday.
            DueWindow::ThisWeek => {
                let to_sunday = 6 - u64::from(today.weekday().num_days_from_monday());
                Some((today, plus(to_sunday)))
            }
            DueWindow::NextWeek => Some((plus(7), plus(13))),
            DueWindow::ThisMonth => Some((today, last_day_of_month(today))),
            DueWindow::Custom { from, to } => Some((from, to)),
        }
    }
}

impl std::str::FromStr for DueWindow {
    type Err = String;

    /// Named windows only; custom ranges are built from explicit dates.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "all" => Ok(DueWindow::All),
            "today" => Ok(DueWindow::Today),
            "tomorrow" => Ok(DueWindow::Tomorrow),
            "this-week" | "week" => Ok(DueWindow::ThisWeek),
            "next-week" => Ok(DueWindow::NextWeek),
            "this-month" | "month" => Ok(DueWindow::ThisMonth),
            other => Err(format!("unknown due window: {other}")),
        }
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Conjunction of every selector the list view offers.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub category: CategoryFilter,
    pub search: String,
    pub status: StatusFilter,
    pub priority: Option<Priority>,
    pub due: DueWindow,
}

impl TaskQuery {
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        self.apply_in(tasks, Utc::now(), &Local)
    }

    /// Filtered subset in original order. Day boundaries are taken in `tz`.
    pub fn apply_in<Tz: TimeZone>(&self, tasks: &[Task], now: DateTime<Utc>, tz: &Tz) -> Vec<Task> {
        let needle = self.search.trim().to_lowercase();
        let today = now.with_timezone(tz).date_naive();
        let bounds = self.due.bounds(today);
        tasks
            .iter()
            .filter(|task| self.matches_category(task))
            .filter(|task| needle.is_empty() || task.title.to_lowercase().contains(&needle))
            .filter(|task| self.matches_status(task, now))
            .filter(|task| self.priority.map_or(true, |p| task.priority == p))
            .filter(|task| match bounds {
                None => true,
                Some((from, to)) => {
                    let day = task.due_date.with_timezone(tz).date_naive();
                    day >= from && day <= to
                }
            })
            .cloned()
            .collect()
    }

    fn matches_category(&self, task: &Task) -> bool {
        match &self.category {
            CategoryFilter::All => true,
            CategoryFilter::Named(name) => task.category == *name,
        }
    }

    fn matches_status(&self, task: &Task, now: DateTime<Utc>) -> bool {
        match self.status {
            StatusFilter::All => true,
            StatusFilter::Completed => task.is_completed,
            StatusFilter::Incomplete => !task.is_completed,
            StatusFilter::Overdue => task.is_overdue(now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    DueDate,
    Priority,
    Status,
}

impl SortKey {
    /// Stable sort: title and due date ascending, priority high first, incomplete first.
    pub fn sort(&self, tasks: &mut [Task]) {
        match self {
            SortKey::Title => tasks.sort_by(|a, b| a.title.cmp(&b.title)),
            SortKey::DueDate => tasks.sort_by_key(|t| t.due_date),
            SortKey::Priority => tasks.sort_by(|a, b| b.priority.cmp(&a.priority)),
            SortKey::Status => tasks.sort_by_key(|t| t.is_completed),
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "title" => Ok(SortKey::Title),
            "due" | "due_date" => Ok(SortKey::DueDate),
            "priority" => Ok(SortKey::Priority),
            "status" => Ok(SortKey::Status),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chrono_tz::Asia::Shanghai;

    // Wednesday.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 16, 10, 0, 0).unwrap()
    }

    fn task(title: &str, category: &str, due: DateTime<Utc>) -> Task {
        let mut task = Task::new(title, due);
        task.category = category.to_string();
        task
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    fn sample() -> Vec<Task> {
        let mut done = task("Ship release", "work", now() - Duration::days(2));
        done.is_completed = true;
        done.priority = Priority::High;
        let mut late = task("Renew passport", "life", now() - Duration::hours(1));
        late.priority = Priority::Low;
        vec![
            task("Write report", "work", now() + Duration::hours(3)),
            done,
            late,
            task("read chapter 4", "study", now() + Duration::days(1)),
            task("Plan trip", "life", now() + Duration::days(8)),
        ]
    }

    #[test]
    fn default_query_returns_everything_in_order() {
        let tasks = sample();
        let out = TaskQuery::default().apply_in(&tasks, now(), &Utc);
        assert_eq!(out, tasks);
    }

    #[test]
    fn category_all_vs_named() {
        let tasks = sample();
        let all = TaskQuery {
            category: CategoryFilter::parse("All"),
            ..TaskQuery::default()
        };
        assert_eq!(all.apply_in(&tasks, now(), &Utc).len(), tasks.len());

        let work = TaskQuery {
            category: CategoryFilter::parse("work"),
            ..TaskQuery::default()
        };
        let out = work.apply_in(&tasks, now(), &Utc);
        assert_eq!(titles(&out), vec!["Write report", "Ship release"]);
        assert!(out.iter().all(|t| t.category == "work"));

        let case_sensitive = TaskQuery {
            category: CategoryFilter::Named("Work".into()),
            ..TaskQuery::default()
        };
        assert!(case_sensitive.apply_in(&tasks, now(), &Utc).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let query = TaskQuery {
            search: "REPORT".into(),
            ..TaskQuery::default()
        };
        assert_eq!(titles(&query.apply_in(&sample(), now(), &Utc)), vec!["Write report"]);
    }

    #[test]
    fn status_filters() {
        let tasks = sample();
        let by = |status| {
            let query = TaskQuery {
                status,
                ..TaskQuery::default()
            };
            query.apply_in(&tasks, now(), &Utc)
        };
        assert_eq!(titles(&by(StatusFilter::Completed)), vec!["Ship release"]);
        assert_eq!(by(StatusFilter::Incomplete).len(), 4);
        // Completed tasks are never overdue.
        assert_eq!(titles(&by(StatusFilter::Overdue)), vec!["Renew passport"]);
    }

    #[test]
    fn predicates_compose_conjunctively() {
        let query = TaskQuery {
            category: CategoryFilter::Named("life".into()),
            priority: Some(Priority::Normal),
            status: StatusFilter::Incomplete,
            ..TaskQuery::default()
        };
        assert_eq!(titles(&query.apply_in(&sample(), now(), &Utc)), vec!["Plan trip"]);
    }

    #[test]
    fn due_windows_use_calendar_days() {
        let tasks = sample();
        let by = |due| {
            let query = TaskQuery {
                due,
                ..TaskQuery::default()
            };
            let out = query.apply_in(&tasks, now(), &Utc);
            out.iter().map(|t| t.title.clone()).collect::<Vec<_>>()
        };
        assert_eq!(by(DueWindow::Today), vec!["Write report", "Renew passport"]);
        assert_eq!(by(DueWindow::Tomorrow), vec!["read chapter 4"]);
        // Wednesday through Sunday the 20th.
        assert_eq!(
            by(DueWindow::ThisWeek),
            vec!["Write report", "Renew passport", "read chapter 4"]
        );
        // 23rd through 29th.
        assert_eq!(by(DueWindow::NextWeek), vec!["Plan trip"]);
        assert_eq!(by(DueWindow::ThisMonth).len(), 4);
        let custom = DueWindow::Custom {
            from: NaiveDate::from_ymd_opt(2025, 4, 14).unwrap(),
            to: NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
        };
        assert_eq!(by(custom), vec!["Ship release"]);
    }

    #[test]
    fn day_boundaries_follow_time_zone() {
        // 17:00 UTC on the 16th is already the 17th in Shanghai.
        let tasks = vec![task("evening call", "work", now() + Duration::hours(7))];
        let query = TaskQuery {
            due: DueWindow::Today,
            ..TaskQuery::default()
        };
        assert_eq!(query.apply_in(&tasks, now(), &Utc).len(), 1);
        assert!(query.apply_in(&tasks, now(), &Shanghai).is_empty());
    }

    #[test]
    fn week_window_on_sunday_is_a_single_day() {
        let sunday = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
        assert_eq!(DueWindow::ThisWeek.bounds(sunday), Some((sunday, sunday)));
        assert_eq!(
            last_day_of_month(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn sort_keys() {
        let mut tasks = sample();
        SortKey::Title.sort(&mut tasks);
        assert_eq!(tasks[0].title, "Plan trip");

        SortKey::DueDate.sort(&mut tasks);
        assert_eq!(tasks[0].title, "Ship release");

        SortKey::Priority.sort(&mut tasks);
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks.last().unwrap().priority, Priority::Low);

        SortKey::Status.sort(&mut tasks);
        assert!(tasks.last().unwrap().is_completed);
        assert!(tasks[..4].iter().all(|t| !t.is_completed));

        assert_eq!("due-date".parse::<SortKey>(), Ok(SortKey::DueDate));
        assert_eq!("overdue".parse::<StatusFilter>(), Ok(StatusFilter::Overdue));
        assert_eq!("next_week".parse::<DueWindow>(), Ok(DueWindow::NextWeek));
        assert_eq!("Today".parse::<DueWindow>(), Ok(DueWindow::Today));
        assert!("fortnight".parse::<DueWindow>().is_err());
    }
}
