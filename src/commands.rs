use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::backup::{suggested_export_name, BackupEntry};
use crate::filter::{SortKey, TaskQuery};
use crate::models::{Priority, RepeatRule, Task, TaskId, TaskPatch};
use crate::services::Services;
use crate::state::Toggled;
use crate::stats::TaskStatistics;

/// Hour assigned to due dates given without a time of day.
const DEFAULT_DUE_HOUR: u32 = 18;

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatePayload {
    pub tasks: Vec<Task>,
    pub categories: Vec<String>,
}

/// Fields for a new task. Anything unset takes the entity default.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub repeat_option: Option<RepeatRule>,
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM` (local time) or RFC 3339.
pub fn parse_due(input: &str) -> Result<DateTime<Utc>, String> {
    parse_due_in(input, &Local)
}

pub fn parse_due_in<Tz: TimeZone>(input: &str, tz: &Tz) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(DEFAULT_DUE_HOUR, 0, 0))
        })
        .ok_or_else(|| format!("unrecognized date: {input}"))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("date does not exist in local time: {input}"))
}

/// Full UUID or an unambiguous prefix of one.
pub fn resolve_task_id(tasks: &[Task], input: &str) -> Result<TaskId, String> {
    let input = input.trim().to_lowercase();
    if let Ok(id) = input.parse::<TaskId>() {
        return Ok(id);
    }
    if input.is_empty() {
        return Err("empty task id".to_string());
    }
    let mut matches = tasks
        .iter()
        .filter(|t| t.id.to_string().starts_with(&input));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task.id),
        (None, _) => Err(format!("task not found: {input}")),
        (Some(_), Some(_)) => Err(format!("ambiguous task id: {input}")),
    }
}

pub fn load_state_impl(services: &Services) -> CommandResult<StatePayload> {
    ok(StatePayload {
        tasks: services.store.tasks(),
        categories: services.store.categories(),
    })
}

pub fn list_tasks_impl(services: &Services, query: &TaskQuery) -> CommandResult<Vec<Task>> {
    ok(query.apply(&services.store.tasks()))
}

pub fn create_task_impl(services: &Services, input: NewTask) -> CommandResult<Task> {
    let mut task = Task::new(input.title.trim(), input.due_date.unwrap_or_else(Utc::now));
    if let Some(priority) = input.priority {
        task.priority = priority;
    }
    if let Some(category) = input.category.filter(|c| !c.trim().is_empty()) {
        task.category = category.trim().to_string();
    }
    if let Some(notes) = input.notes {
        task.notes = notes;
    }
    if let Some(repeat_option) = input.repeat_option {
        task.repeat_option = repeat_option;
    }
    match services.store.add(task) {
        Ok(task) => ok(task),
        Err(error) => err(&format!("{error}")),
    }
}

pub fn update_task_impl(services: &Services, id: &str, patch: TaskPatch) -> CommandResult<Task> {
    if patch.is_empty() {
        return err("nothing to update");
    }
    let id = match resolve_task_id(&services.store.tasks(), id) {
        Ok(id) => id,
        Err(message) => return err(&message),
    };
    match services.store.update(id, &patch) {
        Ok(task) => ok(task),
        Err(error) => err(&format!("{error}")),
    }
}

pub fn toggle_task_impl(services: &Services, id: &str) -> CommandResult<Toggled> {
    let id = match resolve_task_id(&services.store.tasks(), id) {
        Ok(id) => id,
        Err(message) => return err(&message),
    };
    match services.store.toggle_completion(id) {
        Ok(toggled) => ok(toggled),
        Err(error) => err(&format!("{error}")),
    }
}

pub fn delete_task_impl(services: &Services, id: &str) -> CommandResult<Task> {
    let id = match resolve_task_id(&services.store.tasks(), id) {
        Ok(id) => id,
        Err(message) => return err(&message),
    };
    match services.store.remove(id) {
        Ok(task) => ok(task),
        Err(error) => err(&format!("{error}")),
    }
}

pub fn sort_tasks_impl(services: &Services, key: SortKey) -> CommandResult<bool> {
    match services.store.sort_by(key) {
        Ok(()) => ok(true),
        Err(error) => err(&format!("{error}")),
    }
}

pub fn add_category_impl(services: &Services, name: &str) -> CommandResult<bool> {
    match services.store.add_category(name) {
        Ok(added) => ok(added),
        Err(error) => err(&format!("{error}")),
    }
}

pub fn remove_category_impl(services: &Services, name: &str) -> CommandResult<bool> {
    match services.store.remove_category(name) {
        Ok(removed) => ok(removed),
        Err(error) => err(&format!("{error}")),
    }
}

pub fn statistics_impl(services: &Services) -> CommandResult<TaskStatistics> {
    ok(TaskStatistics::compute(
        &services.store.tasks(),
        &services.store.categories(),
    ))
}

pub fn create_backup_impl(services: &Services) -> CommandResult<PathBuf> {
    match services.create_backup() {
        Ok(path) => ok(path),
        Err(error) => err(&format!("backup failed: {error}")),
    }
}

pub fn list_backups_impl(services: &Services) -> CommandResult<Vec<BackupEntry>> {
    match services.backups.list_backups() {
        Ok(list) => ok(list),
        Err(error) => err(&format!("backup error: {error}")),
    }
}

pub fn restore_backup_impl(services: &Services, name: &str) -> CommandResult<StatePayload> {
    if let Err(error) = services.restore_backup(name) {
        return err(&format!("restore failed: {error}"));
    }
    load_state_impl(services)
}

/// Restore with the file work on a blocking worker; the store stays locked for writes meanwhile.
pub async fn restore_backup_background_impl(
    services: &Services,
    name: &str,
) -> CommandResult<StatePayload> {
    if let Err(error) = services.restore_backup_in_background(name.to_string()).await {
        return err(&format!("restore failed: {error}"));
    }
    load_state_impl(services)
}

pub fn delete_backup_impl(services: &Services, name: &str) -> CommandResult<bool> {
    match services.backups.delete_backup(name) {
        Ok(()) => ok(true),
        Err(error) => err(&format!("backup error: {error}")),
    }
}

/// Exports to `path`, or to a suggested file name in the current directory.
pub fn export_impl(services: &Services, path: Option<&Path>) -> CommandResult<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(suggested_export_name(Local::now().date_naive())),
    };
    match services.export_to(&path) {
        Ok(()) => ok(path),
        Err(error) => err(&format!("export failed: {error}")),
    }
}

pub fn export_temp_impl(services: &Services) -> CommandResult<PathBuf> {
    match services.export_to_temp() {
        Ok(path) => ok(path),
        Err(error) => err(&format!("export failed: {error}")),
    }
}

pub fn import_impl(services: &Services, path: &Path) -> CommandResult<StatePayload> {
    if let Err(error) = services.import_from(path) {
        return err(&format!("import failed: {error}"));
    }
    load_state_impl(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CategoryFilter, StatusFilter};
    use crate::notify::testing::RecordingNotifier;
    use chrono::Duration;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn make_services(dir: &TempDir) -> Services {
        Services::open_with_notifier(
            dir.path().to_path_buf(),
            Arc::new(RecordingNotifier::default()),
        )
        .unwrap()
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            due_date: Some(Utc::now() + Duration::days(1)),
            ..NewTask::default()
        }
    }

    #[test]
    fn ok_and_err_helpers_construct_expected_shape() {
        let r = ok(123);
        assert!(r.ok);
        assert_eq!(r.data, Some(123));
        assert_eq!(r.error, None);

        let r: CommandResult<i32> = err("nope");
        assert!(!r.ok);
        assert_eq!(r.data, None);
        assert_eq!(r.error, Some("nope".to_string()));
    }

    #[test]
    fn parse_due_accepts_supported_formats() {
        let at = |y, m, d, h, min| Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap();
        assert_eq!(parse_due_in("2025-04-20", &Utc), Ok(at(2025, 4, 20, 18, 0)));
        assert_eq!(parse_due_in("2025-04-20 07:30", &Utc), Ok(at(2025, 4, 20, 7, 30)));
        assert_eq!(parse_due_in("2025-04-20T07:30", &Utc), Ok(at(2025, 4, 20, 7, 30)));
        assert_eq!(
            parse_due_in("2025-04-20T07:30:00+02:00", &Utc),
            Ok(at(2025, 4, 20, 5, 30))
        );
        assert!(parse_due_in("next tuesday", &Utc).is_err());
    }

    #[test]
    fn resolve_task_id_accepts_unique_prefix() {
        let a = Task::new("a", Utc::now());
        let b = Task::new("b", Utc::now());
        let tasks = vec![a.clone(), b.clone()];

        assert_eq!(resolve_task_id(&tasks, &a.id.to_string()), Ok(a.id));
        let prefix: String = a.id.to_string().chars().take(8).collect();
        if !b.id.to_string().starts_with(&prefix) {
            assert_eq!(resolve_task_id(&tasks, &prefix.to_uppercase()), Ok(a.id));
        }
        assert!(resolve_task_id(&tasks, "").is_err());
        assert!(resolve_task_id(&tasks, "zzzz").is_err());

        let mut same = Task::new("c", Utc::now());
        same.id = a.id;
        let dupes = vec![a.clone(), same];
        assert!(resolve_task_id(&dupes, &prefix)
            .unwrap_err()
            .starts_with("ambiguous"));
    }

    #[test]
    fn task_commands_cover_success_and_error_paths() {
        let dir = TempDir::new().unwrap();
        let services = make_services(&dir);

        let res = create_task_impl(&services, new_task("  "));
        assert!(!res.ok);

        let mut input = new_task("plan sprint");
        input.category = Some("work".into());
        input.priority = Some(Priority::High);
        input.repeat_option = Some(RepeatRule::Weekly);
        let created = create_task_impl(&services, input).data.unwrap();
        assert_eq!(created.category, "work");
        assert_eq!(created.priority, Priority::High);

        let id = created.id.to_string();
        let res = update_task_impl(&services, &id, TaskPatch::default());
        assert_eq!(res.error, Some("nothing to update".to_string()));

        let patch = TaskPatch {
            notes: Some("bring coffee".into()),
            ..TaskPatch::default()
        };
        let updated = update_task_impl(&services, &id, patch).data.unwrap();
        assert_eq!(updated.notes, "bring coffee");

        let blank = TaskPatch {
            category: Some(String::new()),
            ..TaskPatch::default()
        };
        let moved = update_task_impl(&services, &id, blank).data.unwrap();
        assert_eq!(moved.category, "default");
        assert!(!services.store.categories().contains(&String::new()));
        let restore = TaskPatch {
            category: Some(" work ".into()),
            ..TaskPatch::default()
        };
        assert_eq!(
            update_task_impl(&services, &id, restore).data.unwrap().category,
            "work"
        );

        let toggled = toggle_task_impl(&services, &id).data.unwrap();
        assert!(toggled.task.is_completed);
        assert!(toggled.spawned.is_some());
        assert_eq!(load_state_impl(&services).data.unwrap().tasks.len(), 2);

        let query = TaskQuery {
            status: StatusFilter::Incomplete,
            category: CategoryFilter::Named("work".into()),
            ..TaskQuery::default()
        };
        let pending = list_tasks_impl(&services, &query).data.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(Some(pending[0].id), toggled.spawned.map(|t| t.id));

        assert!(delete_task_impl(&services, &id).ok);
        assert!(!delete_task_impl(&services, &id).ok);
        assert!(!toggle_task_impl(&services, "not-an-id").ok);
        assert!(sort_tasks_impl(&services, SortKey::DueDate).ok);
    }

    #[test]
    fn category_and_statistics_commands() {
        let dir = TempDir::new().unwrap();
        let services = make_services(&dir);
        assert_eq!(add_category_impl(&services, "errands").data, Some(true));
        assert_eq!(add_category_impl(&services, "errands").data, Some(false));
        assert_eq!(remove_category_impl(&services, "default").data, Some(false));
        let reserved = add_category_impl(&services, "all");
        assert!(!reserved.ok);
        assert!(reserved.error.unwrap().contains("reserved"));

        let mut input = new_task("post office");
        input.category = Some("errands".into());
        create_task_impl(&services, input);
        assert_eq!(remove_category_impl(&services, "errands").data, Some(true));

        let stats = statistics_impl(&services).data.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_category[0].category, "default");
    }

    #[test]
    fn backup_and_transfer_commands() {
        let dir = TempDir::new().unwrap();
        let services = make_services(&dir);
        create_task_impl(&services, new_task("keep me"));

        let path = create_backup_impl(&services).data.unwrap();
        let listed = list_backups_impl(&services).data.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, path);

        create_task_impl(&services, new_task("discard me"));
        let restored = restore_backup_impl(&services, &listed[0].name).data.unwrap();
        assert_eq!(restored.tasks.len(), 1);

        let res = restore_backup_impl(&services, "Backup_nope.json");
        assert!(!res.ok);
        assert!(res.error.unwrap().starts_with("restore failed"));

        let export_path = dir.path().join("out").join("export.json");
        assert_eq!(
            export_impl(&services, Some(&export_path)).data,
            Some(export_path.clone())
        );
        let imported = import_impl(&services, &export_path).data.unwrap();
        assert_eq!(imported.tasks, services.store.tasks());

        fs::write(&export_path, b"{}").unwrap();
        assert!(!import_impl(&services, &export_path).ok);
        assert_eq!(services.store.tasks().len(), 1);

        assert!(delete_backup_impl(&services, &listed[0].name).ok);
        assert!(list_backups_impl(&services).data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn background_restore_reports_through_command_result() {
        let dir = TempDir::new().unwrap();
        let services = make_services(&dir);
        create_task_impl(&services, new_task("snapshot"));
        let path = create_backup_impl(&services).data.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        create_task_impl(&services, new_task("later"));

        let restored = restore_backup_background_impl(&services, &name).await;
        assert_eq!(restored.data.unwrap().tasks.len(), 1);

        let missing = restore_backup_background_impl(&services, "../escape.json").await;
        assert!(!missing.ok);
    }
}
