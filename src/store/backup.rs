//! Backup rotation for the live configuration document.
//!
//! Slots are `<live>.backup1` ..= `<live>.backup<N>`. The next write goes to
//! the lowest-numbered slot that does not exist yet, otherwise to the slot
//! with the oldest modification time (ties: lowest number). Backups are
//! plain copies, so the live path stays valid while one is being made, and
//! the live document is only replaced after the copy completed.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::document::{render_source, ConfigDocument};
use super::StoreError;

/// Path of backup slot `slot` for the live document at `live`.
pub fn backup_path(live: &Path, slot: u32) -> PathBuf {
    let mut name = live.as_os_str().to_owned();
    name.push(format!(".backup{slot}"));
    PathBuf::from(name)
}

/// Pick the slot to overwrite next.
pub async fn select_slot(live: &Path, slots: u32) -> Result<u32, StoreError> {
    let mut best: Option<(u32, SystemTime)> = None;

    for slot in 1..=slots {
        let path = backup_path(live, slot);
        let modified = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.modified(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(slot),
            Err(e) => Err(e),
        };
        match modified {
            Ok(time) => {
                if best.map_or(true, |(_, best_time)| time < best_time) {
                    best = Some((slot, time));
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot inspect backup slot");
            }
        }
    }

    best.map(|(slot, _)| slot)
        .ok_or_else(|| StoreError::NoBackupSlot(live.to_path_buf()))
}

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Slot that received the previous document; `None` on a first save.
    pub slot: Option<u32>,
}

/// Back up the current live document, then replace it with `doc`.
///
/// If no slot can be chosen or the copy fails, the live file is left
/// exactly as it was.
pub async fn rotate_and_save(
    live: &Path,
    slots: u32,
    doc: &ConfigDocument,
) -> Result<SaveReport, StoreError> {
    let source = render_source(doc)?;

    let live_exists = tokio::fs::try_exists(live)
        .await
        .map_err(|e| StoreError::Read(live.to_path_buf(), e))?;

    let slot = if live_exists {
        let slot = select_slot(live, slots).await?;
        let backup = backup_path(live, slot);
        tokio::fs::copy(live, &backup)
            .await
            .map_err(|source| StoreError::BackupFailed {
                backup: backup.clone(),
                source,
            })?;
        tracing::debug!(backup = %backup.display(), "backed up config");
        Some(slot)
    } else {
        if let Some(parent) = live.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::WriteFailed(live.to_path_buf(), e))?;
        }
        None
    };

    write_replacing(live, source.as_bytes()).await?;
    tracing::info!(path = %live.display(), ?slot, "saved new config");
    Ok(SaveReport { slot })
}

/// Write through a sibling temp file and rename over the target.
async fn write_replacing(target: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::WriteFailed(tmp.clone(), e))?;
    if let Err(e) = tokio::fs::rename(&tmp, target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::WriteFailed(target.to_path_buf(), e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    fn minimal_doc() -> ConfigDocument {
        serde_json::from_value(json!({"modules": [{"module": "clock"}]})).unwrap()
    }

    #[test]
    fn backup_path_appends_slot_suffix() {
        assert_eq!(
            backup_path(Path::new("/cfg/config.js"), 3),
            PathBuf::from("/cfg/config.js.backup3")
        );
    }

    #[tokio::test]
    async fn missing_slot_beats_existing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        std::fs::write(backup_path(&live, 1), "one").unwrap();
        std::fs::write(backup_path(&live, 3), "three").unwrap();
        set_mtime(&backup_path(&live, 1), SystemTime::UNIX_EPOCH);

        assert_eq!(select_slot(&live, 4).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn oldest_mtime_wins() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        let now = SystemTime::now();
        let ages = [30, 10, 50, 20];
        for (i, age) in ages.iter().enumerate() {
            let path = backup_path(&live, i as u32 + 1);
            std::fs::write(&path, "x").unwrap();
            set_mtime(&path, now - Duration::from_secs(*age * 60));
        }
        assert_eq!(select_slot(&live, 4).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn ties_go_to_lowest_slot() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        let t = SystemTime::now() - Duration::from_secs(3600);
        for slot in 1..=3 {
            let path = backup_path(&live, slot);
            std::fs::write(&path, "x").unwrap();
            set_mtime(&path, t);
        }
        assert_eq!(select_slot(&live, 3).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_slots_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        let err = select_slot(&live, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::NoBackupSlot(_)));
    }

    #[tokio::test]
    async fn unreadable_storage_aborts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        std::fs::write(&live, "original").unwrap();

        let err = rotate_and_save(&live, 0, &minimal_doc()).await.unwrap_err();
        assert!(matches!(err, StoreError::NoBackupSlot(_)));
        assert_eq!(std::fs::read(&live).unwrap(), b"original");
    }

    #[tokio::test]
    async fn failed_copy_leaves_live_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        std::fs::write(&live, "original bytes").unwrap();

        // Slot 1 is a directory with the oldest timestamp: selected, but the
        // copy into it fails.
        let now = SystemTime::now();
        std::fs::create_dir(backup_path(&live, 1)).unwrap();
        for slot in 2..=4 {
            let path = backup_path(&live, slot);
            std::fs::write(&path, "older config").unwrap();
            set_mtime(&path, now + Duration::from_secs(3600 * slot as u64));
        }

        let err = rotate_and_save(&live, 4, &minimal_doc()).await.unwrap_err();
        assert!(matches!(err, StoreError::BackupFailed { .. }));
        assert_eq!(std::fs::read(&live).unwrap(), b"original bytes");
        for slot in 2..=4 {
            assert_eq!(std::fs::read(backup_path(&live, slot)).unwrap(), b"older config");
        }
    }

    #[tokio::test]
    async fn save_overwrites_only_the_oldest_slot() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        std::fs::write(&live, "previous live").unwrap();

        let now = SystemTime::now();
        let ages = [2u64, 4, 1, 3];
        for (i, age) in ages.iter().enumerate() {
            let path = backup_path(&live, i as u32 + 1);
            std::fs::write(&path, format!("backup {}", i + 1)).unwrap();
            set_mtime(&path, now - Duration::from_secs(age * 3600));
        }

        let report = rotate_and_save(&live, 4, &minimal_doc()).await.unwrap();
        assert_eq!(report.slot, Some(2));

        assert_eq!(std::fs::read_to_string(backup_path(&live, 2)).unwrap(), "previous live");
        assert_eq!(std::fs::read_to_string(backup_path(&live, 1)).unwrap(), "backup 1");
        assert_eq!(std::fs::read_to_string(backup_path(&live, 3)).unwrap(), "backup 3");
        assert_eq!(std::fs::read_to_string(backup_path(&live, 4)).unwrap(), "backup 4");

        let written = std::fs::read_to_string(&live).unwrap();
        let parsed = super::super::document::parse_source(&written).unwrap();
        assert_eq!(parsed.modules[0].module, "clock");
    }

    #[tokio::test]
    async fn first_save_needs_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config").join("config.js");

        let report = rotate_and_save(&live, 4, &minimal_doc()).await.unwrap();
        assert_eq!(report.slot, None);
        assert!(live.exists());
        assert!(!backup_path(&live, 1).exists());
    }

    #[tokio::test]
    async fn consecutive_saves_rotate_through_slots() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.js");
        std::fs::write(&live, "v0").unwrap();

        let mut used = Vec::new();
        for _ in 0..3 {
            used.push(rotate_and_save(&live, 2, &minimal_doc()).await.unwrap().slot);
            // mtime granularity on some filesystems is coarse
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(used[0], Some(1));
        assert_eq!(used[1], Some(2));
    }
}
