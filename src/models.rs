use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;

/// Category every task falls back to. It can never be removed.
pub const DEFAULT_CATEGORY: &str = "default";

/// Filter keyword meaning "every category"; never a category name itself.
pub const ALL_CATEGORIES: &str = "all";

pub fn is_reserved_category(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(ALL_CATEGORIES)
}

/// Category list used when nothing has been persisted yet.
pub const DEFAULT_CATEGORIES: [&str; 5] = [DEFAULT_CATEGORY, "work", "study", "life", "other"];

/// Version tag written into every export envelope.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepeatRule {
    #[default]
    #[serde(alias = "never")]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RepeatRule {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, RepeatRule::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatRule::None => "none",
            RepeatRule::Daily => "daily",
            RepeatRule::Weekly => "weekly",
            RepeatRule::Monthly => "monthly",
            RepeatRule::Yearly => "yearly",
        }
    }
}

impl std::str::FromStr for RepeatRule {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "none" | "never" => Ok(RepeatRule::None),
            "daily" => Ok(RepeatRule::Daily),
            "weekly" => Ok(RepeatRule::Weekly),
            "monthly" => Ok(RepeatRule::Monthly),
            "yearly" => Ok(RepeatRule::Yearly),
            other => Err(format!("unknown repeat rule: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub repeat_option: RepeatRule,
    /// Only ever set when a recurring task is completed.
    #[serde(default)]
    pub last_completed_date: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(title: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            is_completed: false,
            due_date,
            priority: Priority::Normal,
            category: default_category(),
            notes: String::new(),
            repeat_option: RepeatRule::None,
            last_completed_date: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due_date < now
    }
}

/// Field-level edit applied by `TaskStore::update`. `None` leaves a field as-is.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub repeat_option: Option<RepeatRule>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.notes.is_none()
            && self.repeat_option.is_none()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(category) = &self.category {
            task.category = category.clone();
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(repeat_option) = self.repeat_option {
            task.repeat_option = repeat_option;
        }
    }
}

/// Envelope shared by scheduled backups and manual export/import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub todo_items: Vec<Task>,
    pub categories: Vec<String>,
    #[serde(default = "Utc::now")]
    pub export_date: DateTime<Utc>,
    #[serde(default = "default_app_version")]
    pub app_version: String,
}

impl ExportData {
    pub fn new(todo_items: Vec<Task>, categories: Vec<String>) -> Self {
        Self {
            todo_items,
            categories,
            export_date: Utc::now(),
            app_version: APP_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_backup_limit")]
    pub backup_limit: usize,
    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,
    #[serde(default = "default_reminder_lead_minutes")]
    pub reminder_lead_minutes: i64,
    #[serde(default)]
    pub last_backup_at: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_limit: default_backup_limit(),
            backup_interval_secs: default_backup_interval_secs(),
            reminder_lead_minutes: default_reminder_lead_minutes(),
            last_backup_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_app_version() -> String {
    APP_VERSION.to_string()
}

fn default_backup_limit() -> usize {
    5
}

fn default_backup_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_reminder_lead_minutes() -> i64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn settings_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.backup_limit, 5);
        assert_eq!(settings.backup_interval_secs, 86_400);
        assert_eq!(settings.reminder_lead_minutes, 60);
        assert_eq!(settings.last_backup_at, None);
    }

    #[test]
    fn settings_serde_applies_defaults_for_missing_fields() {
        let settings: Settings =
            serde_json::from_str(r#"{ "backup_limit": 9 }"#).expect("settings should deserialize");
        assert_eq!(settings.backup_limit, 9);
        assert_eq!(settings.backup_interval_secs, 86_400);
        assert_eq!(settings.reminder_lead_minutes, 60);
    }

    #[test]
    fn new_task_has_fresh_id_and_defaults() {
        let due = Utc.with_ymd_and_hms(2025, 4, 20, 9, 0, 0).unwrap();
        let a = Task::new("write report", due);
        let b = Task::new("write report", due);
        assert_ne!(a.id, b.id);
        assert!(!a.is_completed);
        assert_eq!(a.priority, Priority::Normal);
        assert_eq!(a.category, DEFAULT_CATEGORY);
        assert_eq!(a.repeat_option, RepeatRule::None);
        assert!(a.last_completed_date.is_none());
    }

    #[test]
    fn task_serializes_with_camel_case_fields() {
        let due = Utc.with_ymd_and_hms(2025, 4, 20, 9, 0, 0).unwrap();
        let mut task = Task::new("pay rent", due);
        task.priority = Priority::High;
        task.repeat_option = RepeatRule::Monthly;
        let value = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(value["title"], "pay rent");
        assert_eq!(value["isCompleted"], false);
        assert_eq!(value["dueDate"], "2025-04-20T09:00:00Z");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["repeatOption"], "monthly");
        assert!(value["lastCompletedDate"].is_null());
    }

    #[test]
    fn task_deserialize_fills_defaults_and_accepts_never_alias() {
        let json = r#"
        {
          "id": "6f1c1e8e-3f0a-4d7e-9a59-1f5f8b2d7a10",
          "title": "water plants",
          "dueDate": "2025-04-20T09:00:00Z",
          "repeatOption": "never"
        }
        "#;
        let task: Task = serde_json::from_str(json).expect("task should deserialize");
        assert!(!task.is_completed);
        assert_eq!(task.priority, Priority::Normal);
        assert_eq!(task.category, DEFAULT_CATEGORY);
        assert_eq!(task.notes, "");
        assert_eq!(task.repeat_option, RepeatRule::None);
    }

    #[test]
    fn export_envelope_uses_documented_keys() {
        let data = ExportData::new(Vec::new(), default_categories());
        let value = serde_json::to_value(&data).expect("serialize envelope");
        assert!(value.get("todoItems").is_some());
        assert!(value.get("categories").is_some());
        assert!(value.get("exportDate").is_some());
        assert_eq!(value["appVersion"], APP_VERSION);

        let legacy = r#"{ "todoItems": [], "categories": ["default"] }"#;
        let back: ExportData = serde_json::from_str(legacy).expect("legacy envelope");
        assert_eq!(back.app_version, APP_VERSION);
        assert_eq!(back.categories, vec!["default".to_string()]);
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let due = Utc.with_ymd_and_hms(2025, 4, 20, 9, 0, 0).unwrap();
        let mut task = Task::new("draft", due);
        let patch = TaskPatch {
            title: Some("final".into()),
            priority: Some(Priority::Low),
            ..TaskPatch::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut task);
        assert_eq!(task.title, "final");
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.due_date, due);
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn priority_and_repeat_parse_from_strings() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!("never".parse::<RepeatRule>(), Ok(RepeatRule::None));
        assert_eq!("weekly".parse::<RepeatRule>(), Ok(RepeatRule::Weekly));
        assert!(Priority::High > Priority::Normal && Priority::Normal > Priority::Low);
    }
}
