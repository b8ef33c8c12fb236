use chrono::{DateTime, Days, Duration, Local, Months, NaiveDateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{RepeatRule, Task};

/// Next due date in the local calendar. `None` for non-recurring tasks.
pub fn next_due_date(task: &Task) -> Option<DateTime<Utc>> {
    next_due_date_in(task, &Local)
}

/// Adds one calendar unit to the later of `last_completed_date` and `due_date`, doing the
/// day/month arithmetic on wall-clock time in `tz`.
pub fn next_due_date_in<Tz: TimeZone>(task: &Task, tz: &Tz) -> Option<DateTime<Utc>> {
    if !task.repeat_option.is_recurring() {
        return None;
    }
    let base = match task.last_completed_date {
        Some(last) if last > task.due_date => last,
        _ => task.due_date,
    };
    let local = base.with_timezone(tz).naive_local();
    let next = advance(local, task.repeat_option)?;
    resolve_local(tz, next).map(|dt| dt.with_timezone(&Utc))
}

/// Successor spawned when a recurring task is completed. The source is left untouched.
pub fn next_occurrence(task: &Task) -> Option<Task> {
    next_occurrence_in(task, &Local)
}

pub fn next_occurrence_in<Tz: TimeZone>(task: &Task, tz: &Tz) -> Option<Task> {
    let due_date = next_due_date_in(task, tz)?;
    let mut next = task.clone();
    next.id = Uuid::new_v4();
    next.is_completed = false;
    next.due_date = due_date;
    next.last_completed_date = None;
    Some(next)
}

fn advance(base: NaiveDateTime, rule: RepeatRule) -> Option<NaiveDateTime> {
    match rule {
        RepeatRule::None => None,
        RepeatRule::Daily => base.checked_add_days(Days::new(1)),
        RepeatRule::Weekly => base.checked_add_days(Days::new(7)),
        // Month arithmetic clamps to the last valid day (Jan 31 -> Feb 28/29).
        RepeatRule::Monthly => base.checked_add_months(Months::new(1)),
        RepeatRule::Yearly => base.checked_add_months(Months::new(12)),
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => Some(dt),
        // Wall-clock time skipped by a DST jump.
        None => tz.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
    }
}
