//! Extension descriptors and their registered default settings.
//!
//! Descriptors come from a JSON manifest plus the host application's
//! built-in modules; an extension counts as installed when a directory of
//! its name exists under the modules directory.

use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{ExtensionDefaults, ModuleSettings};

const BUILTIN_AUTHOR: &str = "MichMich";
const BUILTIN_REPOSITORY: &str = "MichMich/MagicMirror";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    #[serde(rename = "longname")]
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub installed: bool,
    #[serde(rename = "configDefault", default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<ModuleSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct Catalog {
    manifest: PathBuf,
    modules_dir: PathBuf,
    builtin: Vec<String>,
    core_repository: String,
    entries: RwLock<Vec<ExtensionDescriptor>>,
}

impl Catalog {
    pub fn new(
        manifest: impl Into<PathBuf>,
        modules_dir: impl Into<PathBuf>,
        builtin: Vec<String>,
        core_repository: impl Into<String>,
    ) -> Self {
        Self {
            manifest: manifest.into(),
            modules_dir: modules_dir.into(),
            builtin,
            core_repository: core_repository.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn modules_dir(&self) -> &std::path::Path {
        &self.modules_dir
    }

    pub fn is_builtin(&self, id: &str) -> bool {
        self.builtin.iter().any(|b| b == id)
    }

    /// Re-read the manifest and refresh installed flags.
    pub async fn rescan(&self) {
        let mut entries = match tokio::fs::read(&self.manifest).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<ExtensionDescriptor>>(&bytes) {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(path = %self.manifest.display(), error = %e, "malformed extension manifest");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(path = %self.manifest.display(), error = %e, "cannot read extension manifest");
                Vec::new()
            }
        };

        for id in &self.builtin {
            match entries.iter_mut().find(|d| &d.identifier == id) {
                Some(existing) => existing.installed = true,
                None => entries.push(self.builtin_descriptor(id)),
            }
        }

        for entry in entries.iter_mut() {
            if entry.installed {
                continue;
            }
            let dir = self.modules_dir.join(&entry.identifier);
            if tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
                entry.installed = true;
            }
        }

        tracing::debug!(count = entries.len(), "extension catalog refreshed");
        *self.entries.write() = entries;
    }

    fn builtin_descriptor(&self, id: &str) -> ExtensionDescriptor {
        let mut extra = Map::new();
        extra.insert("author".into(), Value::from(BUILTIN_AUTHOR));
        extra.insert("desc".into(), Value::from(""));
        extra.insert("id".into(), Value::from(BUILTIN_REPOSITORY));
        extra.insert(
            "url".into(),
            Value::from(format!(
                "{}/wiki/MagicMirror%C2%B2-Modules#default-modules",
                self.core_repository.trim_end_matches('/')
            )),
        );
        ExtensionDescriptor {
            identifier: id.to_string(),
            name: capitalize_first(id),
            installed: true,
            defaults: None,
            extra,
        }
    }

    /// All descriptors sorted by display name.
    pub fn available(&self) -> Vec<ExtensionDescriptor> {
        let mut list = self.entries.read().clone();
        list.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        list
    }

    pub fn defaults_for(&self, id: &str) -> Option<ModuleSettings> {
        self.entries
            .read()
            .iter()
            .find(|d| d.identifier == id)
            .and_then(|d| d.defaults.clone())
    }

    /// Defaults of every installed extension that registered some.
    pub fn defaults(&self) -> ExtensionDefaults {
        self.entries
            .read()
            .iter()
            .filter(|d| d.installed)
            .filter_map(|d| d.defaults.clone().map(|s| (d.identifier.clone(), s)))
            .collect()
    }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
