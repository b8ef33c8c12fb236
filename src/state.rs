use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::filter::SortKey;
use crate::models::{
    default_categories, is_reserved_category, ExportData, Task, TaskId, TaskPatch,
    DEFAULT_CATEGORY,
};
use crate::notify::Notifier;
use crate::repeat::next_occurrence;
use crate::storage::{get_json, set_json, KeyValueStore, StorageError, CATEGORIES_KEY, TODO_ITEMS_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task title must not be empty")]
    EmptyTitle,
    #[error("\"{0}\" is reserved and cannot name a category")]
    ReservedCategory(String),
    #[error("a restore is in progress")]
    Busy,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Outcome of `TaskStore::toggle_completion`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Toggled {
    pub task: Task,
    /// Successor created when a recurring task was completed.
    pub spawned: Option<Task>,
}

/// Authoritative task and category collections. Every mutation is written through to the
/// key-value store before it becomes visible in memory.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Mutex<StoreData>>,
    kv: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    restoring: Arc<AtomicBool>,
}

#[derive(Debug, Clone, PartialEq)]
struct StoreData {
    tasks: Vec<Task>,
    categories: Vec<String>,
}

impl TaskStore {
    /// Reads persisted state. Missing entries fall back to an empty task list and the default
    /// category set; unreadable entries are logged and treated as missing.
    pub fn load(kv: Arc<dyn KeyValueStore>, notifier: Arc<dyn Notifier>) -> Self {
        let tasks = match get_json::<Vec<Task>>(kv.as_ref(), TODO_ITEMS_KEY) {
            Ok(tasks) => tasks.unwrap_or_default(),
            Err(err) => {
                log::warn!("persisted tasks unreadable, starting empty: {err}");
                Vec::new()
            }
        };
        let categories = match get_json::<Vec<String>>(kv.as_ref(), CATEGORIES_KEY) {
            Ok(categories) => categories.unwrap_or_else(default_categories),
            Err(err) => {
                log::warn!("persisted categories unreadable, using defaults: {err}");
                default_categories()
            }
        };
        log::info!(
            "task store loaded tasks={} categories={}",
            tasks.len(),
            categories.len()
        );
        Self {
            inner: Arc::new(Mutex::new(StoreData {
                tasks,
                categories: normalize_categories(categories),
            })),
            kv,
            notifier,
            restoring: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("store poisoned");
        guard.tasks.clone()
    }

    pub fn categories(&self) -> Vec<String> {
        let guard = self.inner.lock().expect("store poisoned");
        guard.categories.clone()
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        let guard = self.inner.lock().expect("store poisoned");
        guard.tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn snapshot(&self) -> ExportData {
        let guard = self.inner.lock().expect("store poisoned");
        ExportData::new(guard.tasks.clone(), guard.categories.clone())
    }

    /// What is on disk right now. Another process sharing the data directory may have written
    /// since this store was loaded, so backups read from here rather than from memory.
    pub fn persisted_snapshot(&self) -> Result<ExportData, StorageError> {
        let _guard = self.inner.lock().expect("store poisoned");
        let tasks = get_json::<Vec<Task>>(self.kv.as_ref(), TODO_ITEMS_KEY)?.unwrap_or_default();
        let categories = get_json::<Vec<String>>(self.kv.as_ref(), CATEGORIES_KEY)?
            .map(normalize_categories)
            .unwrap_or_else(default_categories);
        Ok(ExportData::new(tasks, categories))
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    /// Overwrites the persisted entries with the in-memory collections.
    pub fn save(&self) -> Result<(), StoreError> {
        let guard = self.inner.lock().expect("store poisoned");
        self.write(&guard, &guard)?;
        Ok(())
    }

    pub fn add(&self, mut task: Task) -> Result<Task, StoreError> {
        if task.title.trim().is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        task.category = clean_category(&task.category)?;
        let added = task.clone();
        self.transact(move |data| {
            register_category(&mut data.categories, &task.category);
            data.tasks.push(task);
            Ok(())
        })?;
        self.schedule_if_pending(&added, Utc::now());
        Ok(added)
    }

    pub fn remove(&self, id: TaskId) -> Result<Task, StoreError> {
        let removed = self.transact(|data| {
            let index = position(&data.tasks, id)?;
            Ok(data.tasks.remove(index))
        })?;
        self.notifier.remove(&removed);
        Ok(removed)
    }

    pub fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, StoreError> {
        if patch.title.as_ref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::EmptyTitle);
        }
        let category = patch.category.as_deref().map(clean_category).transpose()?;
        let updated = self.transact(|data| {
            let index = position(&data.tasks, id)?;
            patch.apply(&mut data.tasks[index]);
            if let Some(category) = &category {
                data.tasks[index].category = category.clone();
            }
            let task = data.tasks[index].clone();
            register_category(&mut data.categories, &task.category);
            Ok(task)
        })?;
        self.notifier.remove(&updated);
        self.schedule_if_pending(&updated, Utc::now());
        Ok(updated)
    }

    pub fn toggle_completion(&self, id: TaskId) -> Result<Toggled, StoreError> {
        self.toggle_completion_at(id, Utc::now())
    }

    /// Flips completion. Completing a recurring task stamps `last_completed_date` and appends
    /// its successor; the completed original stays in place.
    pub fn toggle_completion_at(
        &self,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<Toggled, StoreError> {
        let toggled = self.transact(|data| {
            let index = position(&data.tasks, id)?;
            let task = &mut data.tasks[index];
            task.is_completed = !task.is_completed;
            let mut spawned = None;
            if task.is_completed && task.repeat_option.is_recurring() {
                task.last_completed_date = Some(now);
                spawned = next_occurrence(task);
            }
            let task = task.clone();
            if let Some(next) = &spawned {
                data.tasks.push(next.clone());
            }
            Ok(Toggled { task, spawned })
        })?;

        if toggled.task.is_completed {
            self.notifier.remove(&toggled.task);
            if let Some(next) = &toggled.spawned {
                log::info!(
                    "recurring task completed id={} next_id={} next_due={}",
                    toggled.task.id,
                    next.id,
                    next.due_date
                );
                self.schedule_if_pending(next, now);
            }
        } else {
            self.schedule_if_pending(&toggled.task, now);
        }
        Ok(toggled)
    }

    /// Appends a category unless it is blank or already present.
    pub fn add_category(&self, name: &str) -> Result<bool, StoreError> {
        let name = name.trim();
        if is_reserved_category(name) {
            return Err(StoreError::ReservedCategory(name.to_string()));
        }
        if name.is_empty() || self.categories().iter().any(|c| c == name) {
            return Ok(false);
        }
        self.transact(|data| {
            data.categories.push(name.to_string());
            Ok(())
        })?;
        Ok(true)
    }

    /// Drops a category and moves its tasks to the default one. The default category itself
    /// cannot be removed.
    pub fn remove_category(&self, name: &str) -> Result<bool, StoreError> {
        if name == DEFAULT_CATEGORY {
            return Ok(false);
        }
        let known = self.categories().iter().any(|c| c == name);
        let used = self.tasks().iter().any(|t| t.category == name);
        if !known && !used {
            return Ok(false);
        }
        self.transact(|data| {
            data.categories.retain(|c| c != name);
            for task in data.tasks.iter_mut().filter(|t| t.category == name) {
                task.category = DEFAULT_CATEGORY.to_string();
            }
            Ok(())
        })?;
        Ok(true)
    }

    /// Stable reorder of the stored list.
    pub fn sort_by(&self, key: SortKey) -> Result<(), StoreError> {
        self.transact(|data| {
            key.sort(&mut data.tasks);
            Ok(())
        })
    }

    /// Marks the store as restoring until the returned guard is dropped. Mutations fail with
    /// `StoreError::Busy` meanwhile.
    pub fn begin_restore(&self) -> Result<RestoreGuard, StoreError> {
        if self
            .restoring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StoreError::Busy);
        }
        Ok(RestoreGuard {
            store: self.clone(),
        })
    }

    fn replace_all(&self, data: ExportData) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store poisoned");
        let next = StoreData {
            categories: normalize_categories(data.categories),
            tasks: data.todo_items,
        };
        self.write(&guard, &next)?;
        let previous = std::mem::replace(&mut *guard, next);
        let current = guard.tasks.clone();
        drop(guard);

        for task in &previous.tasks {
            self.notifier.remove(task);
        }
        let now = Utc::now();
        for task in &current {
            self.schedule_if_pending(task, now);
        }
        log::info!("task store replaced tasks={}", current.len());
        Ok(())
    }

    fn transact<R>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        if self.is_restoring() {
            return Err(StoreError::Busy);
        }
        let mut guard = self.inner.lock().expect("store poisoned");
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.write(&guard, &next)?;
        *guard = next;
        Ok(out)
    }

    /// Full overwrite of both entries. A failed category write rolls the task entry back.
    fn write(&self, previous: &StoreData, next: &StoreData) -> Result<(), StorageError> {
        if let Err(err) = set_json(self.kv.as_ref(), TODO_ITEMS_KEY, &next.tasks) {
            log::error!("persist tasks failed: {err}");
            return Err(err);
        }
        if let Err(err) = set_json(self.kv.as_ref(), CATEGORIES_KEY, &next.categories) {
            log::error!("persist categories failed: {err}");
            if let Err(rollback) = set_json(self.kv.as_ref(), TODO_ITEMS_KEY, &previous.tasks) {
                log::error!("rollback of tasks failed: {rollback}");
            }
            return Err(err);
        }
        Ok(())
    }

    fn schedule_if_pending(&self, task: &Task, now: DateTime<Utc>) {
        if !task.is_completed && task.due_date > now {
            self.notifier.schedule(task);
        }
    }
}

/// Exclusive right to replace the store's contents.
pub struct RestoreGuard {
    store: TaskStore,
}

impl RestoreGuard {
    pub fn apply(&self, data: ExportData) -> Result<(), StoreError> {
        self.store.replace_all(data)
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        self.store.restoring.store(false, Ordering::SeqCst);
    }
}

fn position(tasks: &[Task], id: TaskId) -> Result<usize, StoreError> {
    tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or(StoreError::NotFound(id))
}

/// Trimmed task category; blank means the default one.
fn clean_category(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(DEFAULT_CATEGORY.to_string());
    }
    if is_reserved_category(name) {
        return Err(StoreError::ReservedCategory(name.to_string()));
    }
    Ok(name.to_string())
}

fn register_category(categories: &mut Vec<String>, name: &str) {
    if !categories.iter().any(|c| c == name) {
        categories.push(name.to_string());
    }
}

/// Deduplicates while keeping first-seen order, and makes sure the default category exists.
fn normalize_categories(categories: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(categories.len() + 1);
    for category in categories {
        let category = category.trim();
        if !category.is_empty() && !out.iter().any(|c| c == category) {
            out.push(category.to_string());
        }
    }
    if !out.iter().any(|c| c == DEFAULT_CATEGORY) {
        out.insert(0, DEFAULT_CATEGORY.to_string());
    }
    out
}
