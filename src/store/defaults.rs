use std::path::{Path, PathBuf};

use serde_json::Value;

use super::StoreError;
use crate::snapshot::Snapshot;

/// The last snapshot the user explicitly saved as the display's defaults.
#[derive(Debug, Clone)]
pub struct DefaultSettings {
    path: PathBuf,
}

impl DefaultSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let text = serde_json::to_vec(snapshot).map_err(StoreError::Serialize)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::WriteFailed(self.path.clone(), e))?;
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| StoreError::WriteFailed(self.path.clone(), e))?;
        tracing::info!(path = %self.path.display(), "saved default settings");
        Ok(())
    }

    /// `Ok(None)` when nothing was ever saved.
    pub async fn load(&self) -> Result<Option<Value>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Read(self.path.clone(), e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Malformed(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn load_without_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DefaultSettings::new(dir.path().join("settings.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = DefaultSettings::new(dir.path().join("settings.json"));
        let snap = Snapshot::from_payload(json!({"brightness": 60, "moduleData": [{"hidden": true}]}));

        store.save(&snap).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded["brightness"], 60);
        assert_eq!(loaded["moduleData"][0]["hidden"], true);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = DefaultSettings::new(path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }
}
