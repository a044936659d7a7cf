//! Configuration persistence.
//!
//! [`ConfigStore`] owns the single in-memory copy of the host application's
//! configuration document and mirrors it to disk through
//! [`backup::rotate_and_save`].

pub mod backup;
pub mod defaults;
pub mod document;

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

pub use backup::SaveReport;
pub use defaults::DefaultSettings;
pub use document::{merge_defaults, ConfigDocument, ExtensionDefaults, ModuleEntry, ModuleSettings};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),
    #[error("malformed configuration: {0}")]
    Malformed(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("no backup slot available for {}", .0.display())]
    NoBackupSlot(PathBuf),
    #[error("failed to back up config to {}: {source}", .backup.display())]
    BackupFailed {
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {}", .0.display(), .1)]
    WriteFailed(PathBuf, #[source] std::io::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StoreError {
    /// True when the live document was left untouched because no backup
    /// could be made.
    pub fn is_backup_failure(&self) -> bool {
        matches!(self, Self::NoBackupSlot(_) | Self::BackupFailed { .. })
    }
}

/// Owner of the authoritative configuration document.
pub struct ConfigStore {
    live_path: PathBuf,
    slots: u32,
    document: RwLock<ConfigDocument>,
    // Serializes saves so two requests never pick the same backup slot.
    save_lock: tokio::sync::Mutex<()>,
}

impl ConfigStore {
    /// Load the live document, or the defaults if it cannot be used.
    pub fn load_or_default(live_path: impl Into<PathBuf>, slots: u32) -> Self {
        let live_path = live_path.into();
        let document = document::load_or_default(&live_path);
        tracing::info!(
            path = %live_path.display(),
            modules = document.modules.len(),
            "configuration loaded"
        );
        Self {
            live_path,
            slots,
            document: RwLock::new(document),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    pub fn document(&self) -> ConfigDocument {
        self.document.read().clone()
    }

    /// The current document with registered extension defaults filled in.
    pub fn merged(&self, defaults: &ExtensionDefaults) -> ConfigDocument {
        merge_defaults(&self.document.read(), defaults)
    }

    /// Back up the live file, persist `doc`, and adopt it in memory.
    pub async fn rotate_and_save(&self, doc: ConfigDocument) -> Result<SaveReport, StoreError> {
        doc.validate()?;
        let _guard = self.save_lock.lock().await;
        match backup::rotate_and_save(&self.live_path, self.slots, &doc).await {
            Ok(report) => {
                *self.document.write() = doc;
                Ok(report)
            }
            Err(e) => {
                if e.is_backup_failure() {
                    tracing::error!(error = %e, "backing up config failed, not saving");
                } else {
                    tracing::error!(error = %e, "saving config failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_updates_memory_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        std::fs::write(&live, r#"var config = {"modules": [{"module": "clock"}]};"#).unwrap();

        let store = ConfigStore::load_or_default(&live, 0);
        let next: ConfigDocument =
            serde_json::from_value(json!({"modules": [{"module": "calendar"}]})).unwrap();

        assert!(store.rotate_and_save(next.clone()).await.is_err());
        assert_eq!(store.document().modules[0].module, "clock");

        let store = ConfigStore::load_or_default(&live, 2);
        store.rotate_and_save(next).await.unwrap();
        assert_eq!(store.document().modules[0].module, "calendar");
        assert_eq!(
            ConfigStore::load_or_default(&live, 2).document().modules[0].module,
            "calendar"
        );
    }

    #[tokio::test]
    async fn invalid_document_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        let store = ConfigStore::load_or_default(&live, 4);
        let bad: ConfigDocument = serde_json::from_value(json!({"modules": [{"module": " "}]})).unwrap();

        let err = store.rotate_and_save(bad).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(!live.exists());
    }

    #[test]
    fn merged_uses_registered_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        std::fs::write(&live, r#"var config = {"modules": [{"module": "clock"}]};"#).unwrap();
        let store = ConfigStore::load_or_default(&live, 4);

        let mut defaults = ExtensionDefaults::new();
        defaults.insert("clock".into(), json!({"showWeek": false}).as_object().unwrap().clone());
        let merged = store.merged(&defaults);
        assert_eq!(merged.modules[0].config.as_ref().unwrap()["showWeek"], false);
        assert!(store.document().modules[0].config.is_none());
    }
}
