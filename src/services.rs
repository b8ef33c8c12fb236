use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::backup::{self, BackupError, BackupManager, BACKUP_DIR};
use crate::models::Settings;
use crate::notify::{LogNotifier, Notifier};
use crate::state::{StoreError, TaskStore};
use crate::storage::{FileStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("restore worker failed: {0}")]
    Worker(String),
}

/// Everything the entry point wires together. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Services {
    pub store: TaskStore,
    pub backups: Arc<BackupManager>,
    files: Arc<FileStore>,
    settings: Arc<Mutex<Settings>>,
}

impl Services {
    pub fn open(data_dir: PathBuf) -> Result<Self, StorageError> {
        let files = FileStore::new(data_dir);
        files.ensure_dirs()?;
        let settings = files.settings_or_default();
        let notifier = Arc::new(LogNotifier::new(reminder_lead(&settings)));
        Ok(Self::assemble(files, settings, notifier))
    }

    pub fn open_with_notifier(
        data_dir: PathBuf,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StorageError> {
        let files = FileStore::new(data_dir);
        files.ensure_dirs()?;
        let settings = files.settings_or_default();
        Ok(Self::assemble(files, settings, notifier))
    }

    fn assemble(files: FileStore, settings: Settings, notifier: Arc<dyn Notifier>) -> Self {
        let backups = BackupManager::new(files.root().join(BACKUP_DIR), settings.backup_limit);
        let files = Arc::new(files);
        let store = TaskStore::load(files.clone(), notifier);
        Self {
            store,
            backups: Arc::new(backups),
            files,
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.files.root()
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().expect("settings poisoned").clone()
    }

    /// Copies the persisted entries into the managed backup directory. Reads from disk, so a
    /// long-running process also captures changes other processes made.
    pub fn create_backup(&self) -> Result<PathBuf, BackupError> {
        let snapshot = self.store.persisted_snapshot().inspect_err(|err| {
            log::error!("backup skipped, persisted state unreadable: {err}");
        })?;
        let path = self.backups.create_backup(&snapshot)?;
        let mut settings = self.settings.lock().expect("settings poisoned");
        settings.last_backup_at = Some(Utc::now());
        if let Err(err) = self.files.save_settings(&settings) {
            log::warn!("failed to record backup time: {err}");
        }
        Ok(path)
    }

    /// Replaces the store with a managed backup. Nothing changes unless the whole file decodes
    /// and both entries are written.
    pub fn restore_backup(&self, name: &str) -> Result<(), RestoreError> {
        let guard = self.store.begin_restore()?;
        let data = self.backups.read_backup(name)?;
        guard.apply(data)?;
        log::info!("restored backup name={name}");
        Ok(())
    }

    /// Same as `restore_backup`, with the file read and decode on a blocking worker. The store
    /// rejects mutations until the result has been applied here.
    pub async fn restore_backup_in_background(&self, name: String) -> Result<(), RestoreError> {
        let guard = self.store.begin_restore()?;
        let backups = self.backups.clone();
        let data = tokio::task::spawn_blocking(move || backups.read_backup(&name))
            .await
            .map_err(|err| RestoreError::Worker(err.to_string()))??;
        guard.apply(data)?;
        log::info!("restored backup in background");
        Ok(())
    }

    pub fn export_to(&self, path: &Path) -> Result<(), BackupError> {
        backup::export_to(path, &self.store.snapshot())
    }

    pub fn export_to_temp(&self) -> Result<PathBuf, BackupError> {
        backup::export_to_temp(&self.store.snapshot())
    }

    pub fn import_from(&self, path: &Path) -> Result<(), RestoreError> {
        let guard = self.store.begin_restore()?;
        let data = backup::import_from(path)?;
        guard.apply(data)?;
        Ok(())
    }
}

/// Configured reminder lead, or one hour when the value is out of range.
fn reminder_lead(settings: &Settings) -> Duration {
    match Duration::try_minutes(settings.reminder_lead_minutes) {
        Some(lead) if lead >= Duration::zero() => lead,
        _ => {
            log::warn!(
                "reminder_lead_minutes={} out of range, using 60",
                settings.reminder_lead_minutes
            );
            Duration::hours(1)
        }
    }
}
