//! UI strings and the remote-control page template.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::{Map, Value};

const FALLBACK_LANGUAGE: &str = "en";
const BRIGHTNESS_PLACEHOLDER: &str = "%%REPLACE:BRIGHTNESS%%";
const DEFAULT_BRIGHTNESS: i64 = 100;

/// Translation table for the current display language.
pub struct Translations {
    dir: PathBuf,
    table: RwLock<Map<String, Value>>,
}

impl Translations {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            table: RwLock::new(Map::new()),
        }
    }

    /// Load the fallback language.
    pub async fn load_fallback(&self) -> bool {
        self.load(FALLBACK_LANGUAGE).await
    }

    /// Replace the table with `<dir>/<language>.json`. A missing or broken
    /// file keeps the current table.
    pub async fn load(&self, language: &str) -> bool {
        if language.is_empty() || language.contains(|c: char| c == '/' || c == '\\') || language.contains("..") {
            tracing::warn!(language, "rejecting suspicious language code");
            return false;
        }
        let path = self.dir.join(format!("{language}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no translation file");
                return false;
            }
        };
        match serde_json::from_slice::<Map<String, Value>>(&bytes) {
            Ok(table) => {
                tracing::info!(language, keys = table.len(), "translations loaded");
                *self.table.write() = table;
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed translation file");
                false
            }
        }
    }

    pub fn table(&self) -> Map<String, Value> {
        self.table.read().clone()
    }

    /// Substitute every `%%TRANSLATE:KEY%%` with its translation.
    pub fn translate(&self, text: &str) -> String {
        let table = self.table.read();
        let mut out = text.to_string();
        for (key, value) in table.iter() {
            let pattern = format!("%%TRANSLATE:{key}%%");
            if !out.contains(&pattern) {
                continue;
            }
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&pattern, &replacement);
        }
        out
    }
}

/// The page served at `/remote.html`, read once at startup.
pub struct Template {
    contents: RwLock<Option<String>>,
}

impl Template {
    pub fn empty() -> Self {
        Self {
            contents: RwLock::new(None),
        }
    }

    pub fn from_string(contents: impl Into<String>) -> Self {
        Self {
            contents: RwLock::new(Some(contents.into())),
        }
    }

    pub async fn load(&self, path: &Path) {
        match tokio::fs::read_to_string(path).await {
            Ok(s) => *self.contents.write() = Some(s),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot read UI template"),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.contents.read().is_some()
    }

    /// Render with translations and the current brightness (100 if unknown).
    /// `None` until the template has been loaded.
    pub fn render(&self, translations: &Translations, brightness: Option<&Value>) -> Option<String> {
        let contents = self.contents.read().clone()?;
        let brightness = match brightness {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => DEFAULT_BRIGHTNESS.to_string(),
        };
        Some(translations.translate(&contents).replace(BRIGHTNESS_PLACEHOLDER, &brightness))
    }
}
