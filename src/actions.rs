//! Remote actions: identifiers, requests and the dispatcher.
//!
//! Requests arrive either as `/remote` query strings or as `REMOTE_ACTION`
//! notifications from the display process; both are normalized into an
//! [`ActionRequest`] and run through [`Dispatcher::dispatch`].

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::catalog::Catalog;
use crate::channel::Channel;
use crate::host::{self, CommandError};
use crate::settings::{CommandSettings, TimeoutSettings};
use crate::store::DefaultSettings;
use crate::waiters::Waiters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shutdown,
    Reboot,
    Restart,
    MonitorOn,
    MonitorOff,
    Show,
    Hide,
    Brightness,
    Save,
    ModuleData,
    Install,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "SHUTDOWN" => Self::Shutdown,
            "REBOOT" => Self::Reboot,
            "RESTART" => Self::Restart,
            "MONITORON" => Self::MonitorOn,
            "MONITOROFF" => Self::MonitorOff,
            "SHOW" => Self::Show,
            "HIDE" => Self::Hide,
            "BRIGHTNESS" => Self::Brightness,
            "SAVE" => Self::Save,
            "MODULE_DATA" => Self::ModuleData,
            "INSTALL" => Self::Install,
            _ => return None,
        })
    }

    /// Identifier on the wire; also the outbound notification name for
    /// actions that are forwarded to the display.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "SHUTDOWN",
            Self::Reboot => "REBOOT",
            Self::Restart => "RESTART",
            Self::MonitorOn => "MONITORON",
            Self::MonitorOff => "MONITOROFF",
            Self::Show => "SHOW",
            Self::Hide => "HIDE",
            Self::Brightness => "BRIGHTNESS",
            Self::Save => "SAVE",
            Self::ModuleData => "MODULE_DATA",
            Self::Install => "INSTALL",
        }
    }
}

/// A parsed, immutable action request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action: Action,
    pub module: Option<String>,
    pub value: Option<String>,
    pub force: bool,
    pub use_lock_strings: Option<String>,
    pub url: Option<String>,
}

impl ActionRequest {
    /// Build a request from query pairs in received order.
    ///
    /// Repeated keys keep the last value. An absent or unrecognized
    /// `action` yields [`ActionError::UnknownCommand`] echoing the input.
    pub fn from_query(pairs: &[(String, String)]) -> Result<Self, ActionError> {
        Self::from_params(query_params(pairs))
    }

    /// Build a request from a `REMOTE_ACTION` payload object.
    pub fn from_payload(payload: Value) -> Result<Self, ActionError> {
        match payload {
            Value::Object(params) => Self::from_params(params),
            other => Err(ActionError::unknown(&other)),
        }
    }

    fn from_params(params: Map<String, Value>) -> Result<Self, ActionError> {
        let text = |key: &str| -> Option<String> {
            match params.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }
        };

        let action = text("action")
            .as_deref()
            .and_then(Action::parse)
            .ok_or_else(|| ActionError::unknown(&Value::Object(params.clone())))?;

        Ok(Self {
            action,
            module: text("module"),
            value: text("value"),
            force: text("force").as_deref() == Some("true"),
            use_lock_strings: text("useLockStrings"),
            url: text("url"),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("original input: {input}")]
    UnknownCommand { input: String },
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("install failed: {0}")]
    Install(String),
}

impl ActionError {
    fn unknown(input: &Value) -> Self {
        Self::UnknownCommand {
            input: input.to_string(),
        }
    }

    /// Unknown-command error echoing a query string.
    pub fn unknown_query(pairs: &[(String, String)]) -> Self {
        Self::unknown(&Value::Object(query_params(pairs)))
    }
}

fn query_params(pairs: &[(String, String)]) -> Map<String, Value> {
    let mut params = Map::new();
    for (k, v) in pairs {
        params.insert(k.clone(), Value::String(v.clone()));
    }
    params
}

pub fn success() -> Value {
    json!({ "status": "success" })
}

/// Runs action requests against the host and the display process.
pub struct Dispatcher {
    commands: CommandSettings,
    timeouts: TimeoutSettings,
    channel: Channel,
    waiters: Waiters,
    default_settings: Arc<DefaultSettings>,
    catalog: Arc<Catalog>,
}

impl Dispatcher {
    pub fn new(
        commands: CommandSettings,
        timeouts: TimeoutSettings,
        channel: Channel,
        waiters: Waiters,
        default_settings: Arc<DefaultSettings>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            commands,
            timeouts,
            channel,
            waiters,
            default_settings,
            catalog,
        }
    }

    /// Run one request and produce its reply body.
    pub async fn dispatch(&self, req: &ActionRequest) -> Result<Value, ActionError> {
        tracing::info!(action = req.action.as_str(), module = ?req.module, "dispatching action");
        match req.action {
            Action::Shutdown => self.host_command(&self.commands.shutdown).await,
            Action::Reboot => self.host_command(&self.commands.reboot).await,
            Action::Restart => self.host_command(&self.commands.restart).await,
            Action::MonitorOn => self.host_command(&self.commands.monitor_on).await,
            Action::MonitorOff => self.host_command(&self.commands.monitor_off).await,
            Action::Show | Action::Hide => {
                self.channel.notify(req.action.as_str(), visibility_payload(req));
                Ok(success())
            }
            Action::Brightness => {
                let value = req.value.clone().map(Value::String).unwrap_or(Value::Null);
                self.channel.notify(req.action.as_str(), value);
                Ok(success())
            }
            Action::Save => {
                self.save_when_fresh();
                Ok(success())
            }
            Action::ModuleData => {
                let snapshot = self.waiters.fresh(self.timeouts.refresh()).await;
                Ok(snapshot.map(|s| s.as_value().clone()).unwrap_or(Value::Null))
            }
            Action::Install => {
                let url = req
                    .url
                    .as_deref()
                    .ok_or_else(|| ActionError::Install("missing url".into()))?;
                self.install(url).await
            }
        }
    }

    async fn host_command(&self, line: &str) -> Result<Value, ActionError> {
        match host::run_shell(line, None, self.timeouts.command()).await {
            Ok(_) => Ok(success()),
            Err(e) => {
                tracing::warn!(error = %e, "host command failed");
                Err(e.into())
            }
        }
    }

    fn save_when_fresh(&self) {
        let store = self.default_settings.clone();
        self.waiters.await_fresh_state(
            move |snapshot| {
                let Some(snapshot) = snapshot else {
                    tracing::warn!("no status received from display, default settings not saved");
                    return;
                };
                tokio::spawn(async move {
                    if let Err(e) = store.save(&snapshot).await {
                        tracing::error!(error = %e, "saving default settings failed");
                    }
                });
            },
            self.timeouts.refresh(),
        );
    }

    async fn install(&self, url: &str) -> Result<Value, ActionError> {
        let name = checkout_name(url).ok_or_else(|| ActionError::Install(format!("cannot derive a directory name from {url}")))?;
        let modules_dir = self.catalog.modules_dir();
        let target = modules_dir.join(&name);

        tracing::info!(url, dir = %target.display(), "installing extension");
        host::run(
            &self.commands.git,
            &["clone", url, &name],
            Some(modules_dir),
            self.timeouts.install(),
        )
        .await
        .map_err(|e| install_failed("clone", &e))?;

        host::run_shell(
            &self.commands.dependency_install,
            Some(&target),
            self.timeouts.install(),
        )
        .await
        .map_err(|e| install_failed("dependency install", &e))?;

        self.catalog.rescan().await;
        tracing::info!(module = %name, "extension installed");
        Ok(success())
    }
}

fn install_failed(step: &str, e: &CommandError) -> ActionError {
    tracing::warn!(step, error = %e, "install step failed");
    ActionError::Install(format!("{step}: {e}"))
}

fn visibility_payload(req: &ActionRequest) -> Value {
    let mut payload = Map::new();
    if let Some(module) = &req.module {
        payload.insert("module".into(), Value::String(module.clone()));
    }
    if let Some(lock) = &req.use_lock_strings {
        payload.insert("useLockStrings".into(), Value::String(lock.clone()));
    }
    if req.action == Action::Show && req.force {
        payload.insert("force".into(), Value::Bool(true));
    }
    Value::Object(payload)
}

/// Directory name a clone of `url` lands in: the last path segment,
/// without a `.git` suffix.
fn checkout_name(url: &str) -> Option<String> {
    let last = url.trim_end_matches('/').rsplit(|c: char| c == '/' || c == ':').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." || Path::new(name).components().count() != 1 {
        return None;
    }
    Some(name.to_string())
}
