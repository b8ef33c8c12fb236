use chrono::{DateTime, Duration, Utc};

use crate::models::Task;

/// Reminder delivery collaborator. The store decides *when* to call it; delivery itself
/// belongs to the host platform.
pub trait Notifier: Send + Sync {
    fn schedule(&self, task: &Task);
    fn remove(&self, task: &Task);
}

/// Instant a reminder should fire: `lead` before the due date. Tasks that are completed or
/// already due get no reminder, and neither does a lead reaching past the representable range.
pub fn reminder_time(task: &Task, lead: Duration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if task.is_completed || task.due_date <= now {
        return None;
    }
    task.due_date.checked_sub_signed(lead)
}

/// Notifier for headless runs: records what would have been delivered in the log.
pub struct LogNotifier {
    lead: Duration,
}

impl LogNotifier {
    pub fn new(lead: Duration) -> Self {
        Self { lead }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

impl Notifier for LogNotifier {
    fn schedule(&self, task: &Task) {
        if let Some(at) = reminder_time(task, self.lead, Utc::now()) {
            log::info!("reminder scheduled id={} at={} title={}", task.id, at, task.title);
        }
    }

    fn remove(&self, task: &Task) {
        log::debug!("reminder removed id={}", task.id);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::models::TaskId;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Schedule(TaskId),
        Remove(TaskId),
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub calls: Mutex<Vec<Call>>,
    }

    impl RecordingNotifier {
        pub fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl Notifier for RecordingNotifier {
        fn schedule(&self, task: &Task) {
            self.calls.lock().unwrap().push(Call::Schedule(task.id));
        }

        fn remove(&self, task: &Task) {
            self.calls.lock().unwrap().push(Call::Remove(task.id));
        }
    }
}
