use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service settings, loaded from TOML.
///
/// Every section is optional; a missing file yields [`Settings::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub commands: CommandSettings,
    pub timeouts: TimeoutSettings,
    pub help: HelpSettings,
}

/// Filesystem layout of the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Live configuration document.
    pub config: PathBuf,
    /// Number of numbered backup slots kept next to the live document.
    pub backup_slots: u32,
    /// Last explicitly saved snapshot.
    pub default_settings: PathBuf,
    /// Directory holding installed extensions.
    pub modules_dir: PathBuf,
    /// Extension manifest (descriptors and their defaults).
    pub catalog: PathBuf,
    /// UI template served at `/remote.html`.
    pub template: PathBuf,
    /// Directory of `<lang>.json` translation tables.
    pub translations_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config/config.js"),
            backup_slots: 4,
            default_settings: PathBuf::from("settings.json"),
            modules_dir: PathBuf::from("modules"),
            catalog: PathBuf::from("modules.json"),
            template: PathBuf::from("remote.html"),
            translations_dir: PathBuf::from("translations"),
        }
    }
}

/// Shell command lines for host actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub shutdown: String,
    pub reboot: String,
    pub restart: String,
    pub monitor_on: String,
    pub monitor_off: String,
    pub dependency_install: String,
    /// Program used for clone/rev-parse/remote lookups.
    pub git: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            shutdown: "sudo shutdown -h now".into(),
            reboot: "sudo shutdown -r now".into(),
            restart: "pm2 restart mm".into(),
            monitor_on: "/opt/vc/bin/tvservice --preferred && sudo chvt 6 && sudo chvt 7".into(),
            monitor_off: "/opt/vc/bin/tvservice -o".into(),
            dependency_install: "npm install".into(),
            git: "git".into(),
        }
    }
}

/// Timeouts in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub refresh: u64,
    pub command: u64,
    pub install: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            refresh: 3000,
            command: 8000,
            install: 120_000,
        }
    }
}

impl TimeoutSettings {
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh)
    }

    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command)
    }

    pub fn install(&self) -> Duration {
        Duration::from_millis(self.install)
    }
}

/// Where the "help" redirect points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpSettings {
    /// Repository of the host application itself.
    pub core_repository: String,
    /// Extensions bundled with the host application.
    pub default_modules: Vec<String>,
}

impl Default for HelpSettings {
    fn default() -> Self {
        Self {
            core_repository: "https://github.com/MichMich/MagicMirror".into(),
            default_modules: [
                "alert",
                "calendar",
                "clock",
                "compliments",
                "currentweather",
                "helloworld",
                "newsfeed",
                "weatherforecast",
                "updatenotification",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. A missing file yields the defaults.
    ///
    /// Checks file permissions and warns if world-writable.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        check_settings_permissions(path);

        let contents = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| SettingsError::ParseFailed(path.to_path_buf(), e))
    }

    /// Resolve every relative path against `base`.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        let p = &mut self.paths;
        for path in [
            &mut p.config,
            &mut p.default_settings,
            &mut p.modules_dir,
            &mut p.catalog,
            &mut p.template,
            &mut p.translations_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

/// Default settings file location: `$XDG_CONFIG_HOME/mirror-remote/settings.toml`.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mirror-remote")
        .join("settings.toml")
}

/// Errors that can occur when loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {}", .0.display(), .1)]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse settings {}: {}", .0.display(), .1)]
    ParseFailed(PathBuf, toml::de::Error),
}

/// Warn if the settings file is world-writable.
///
/// The command table is executed through a shell, so anyone able to edit
/// the file can run commands as this service.
#[cfg(unix)]
pub fn check_settings_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return,
    };

    let mode = metadata.permissions().mode();
    if is_world_writable(mode) {
        tracing::warn!(
            "settings file {} is world-writable (mode {:o}); its commands run through a shell",
            path.display(),
            mode & 0o7777,
        );
    }
}

#[cfg(not(unix))]
pub fn check_settings_permissions(_path: &Path) {}

/// Returns true if the given file mode has the world-writable bit set.
#[cfg(unix)]
pub fn is_world_writable(mode: u32) -> bool {
    mode & 0o002 != 0
}
