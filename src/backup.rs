use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::models::ExportData;
use crate::storage::{encode, load_json, write_atomic, StorageError};

/// Managed backup directory, relative to the data directory.
pub const BACKUP_DIR: &str = "TodoAppBackups";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("backup not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for BackupError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Io(err) => BackupError::Io(err),
            StorageError::Encode(err) => BackupError::Encode(err),
            StorageError::Decode(err) => BackupError::Decode(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPhase {
    Idle,
    Serializing,
    Writing,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    /// `None` when the file's metadata could not be read; such entries sort as oldest.
    pub modified_at: Option<DateTime<Utc>>,
}

pub struct BackupManager {
    dir: PathBuf,
    limit: usize,
    phase: Mutex<BackupPhase>,
}

impl BackupManager {
    pub fn new(dir: PathBuf, limit: usize) -> Self {
        Self {
            dir,
            limit,
            phase: Mutex::new(BackupPhase::Idle),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn phase(&self) -> BackupPhase {
        *self.phase.lock().expect("backup phase poisoned")
    }

    pub fn create_backup(&self, data: &ExportData) -> Result<PathBuf, BackupError> {
        self.create_backup_at(data, Local::now())
    }

    /// Writes `Backup_<timestamp>.json` and trims the directory to the newest `limit` files.
    /// Two backups within the same second share a name; the later one wins.
    pub fn create_backup_at(
        &self,
        data: &ExportData,
        now: DateTime<Local>,
    ) -> Result<PathBuf, BackupError> {
        self.set_phase(BackupPhase::Serializing);
        let bytes = match encode(data) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.set_phase(BackupPhase::Failed);
                log::error!("backup encode failed: {err}");
                return Err(err.into());
            }
        };

        self.set_phase(BackupPhase::Writing);
        let path = self.dir.join(backup_file_name(now));
        let written = fs::create_dir_all(&self.dir)
            .map_err(StorageError::from)
            .and_then(|_| write_atomic(&path, &bytes));
        if let Err(err) = written {
            self.set_phase(BackupPhase::Failed);
            log::error!("backup write failed path={}: {err}", path.display());
            return Err(err.into());
        }

        self.cleanup_old_backups();
        self.set_phase(BackupPhase::Idle);
        log::info!(
            "backup created path={} tasks={}",
            path.display(),
            data.todo_items.len()
        );
        Ok(path)
    }

    /// Backups newest first. A missing directory yields an empty list.
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>, BackupError> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut entries: Vec<BackupEntry> = read
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let modified_at = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from);
                Some(BackupEntry {
                    name,
                    path: entry.path(),
                    modified_at,
                })
            })
            .collect();
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    /// Decodes a managed backup without touching any state.
    pub fn read_backup(&self, name: &str) -> Result<ExportData, BackupError> {
        let path = self.resolve(name)?;
        let data = load_json(&path).inspect_err(|err| {
            log::warn!("backup unreadable path={}: {err}", path.display());
        })?;
        Ok(data)
    }

    pub fn delete_backup(&self, name: &str) -> Result<(), BackupError> {
        let path = self.resolve(name)?;
        fs::remove_file(&path)?;
        log::info!("backup deleted path={}", path.display());
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, BackupError> {
        let invalid = name.is_empty() || name.contains(['/', '\\']) || name.contains("..");
        let path = self.dir.join(name);
        if invalid || !path.is_file() {
            return Err(BackupError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    fn cleanup_old_backups(&self) {
        let entries = match self.list_backups() {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("backup cleanup skipped: {err}");
                return;
            }
        };
        for entry in entries.into_iter().skip(self.limit) {
            if let Err(err) = fs::remove_file(&entry.path) {
                log::warn!("failed to remove old backup {}: {err}", entry.path.display());
            }
        }
    }

    fn set_phase(&self, phase: BackupPhase) {
        *self.phase.lock().expect("backup phase poisoned") = phase;
    }
}

fn sort_newest_first(entries: &mut [BackupEntry]) {
    // Ties on modification time fall back to the name, whose timestamp orders the same way.
    entries.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| b.name.cmp(&a.name))
    });
}

pub fn backup_file_name(now: DateTime<Local>) -> String {
    format!("Backup_{}.json", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// File name used for automatic exports to the temp directory.
pub fn auto_export_file_name(now: DateTime<Utc>) -> String {
    format!("TodoExport_{}.json", now.timestamp())
}

/// File name offered for a manual export.
pub fn suggested_export_name(date: NaiveDate) -> String {
    format!("TodoApp_Export_{}.json", date.format("%Y-%m-%d"))
}

pub fn export_to(path: &Path, data: &ExportData) -> Result<(), BackupError> {
    let bytes = encode(data)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_atomic(path, &bytes)?;
    log::info!(
        "exported tasks={} path={}",
        data.todo_items.len(),
        path.display()
    );
    Ok(())
}

pub fn export_to_temp(data: &ExportData) -> Result<PathBuf, BackupError> {
    let path = std::env::temp_dir().join(auto_export_file_name(Utc::now()));
    export_to(&path, data)?;
    Ok(path)
}

pub fn import_from(path: &Path) -> Result<ExportData, BackupError> {
    let data: ExportData = load_json(path).inspect_err(|err| {
        log::warn!("import failed path={}: {err}", path.display());
    })?;
    Ok(data)
}
