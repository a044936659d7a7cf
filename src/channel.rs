//! Notification channel between the control surface and the display process.
//!
//! Outbound notifications are broadcast to every connected peer (normally
//! exactly one: the display process attached through [`crate::bridge`]).
//! Inbound notifications are decoded into [`Inbound`] and routed by the
//! bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub const BROADCAST_CAPACITY: usize = 256;

/// Outbound: ask the display process for a fresh `CURRENT_STATUS`.
pub const UPDATE: &str = "UPDATE";
/// Inbound: carries the current snapshot.
pub const CURRENT_STATUS: &str = "CURRENT_STATUS";
/// Inbound: an action request, equivalent to `GET /remote`.
pub const REMOTE_ACTION: &str = "REMOTE_ACTION";
/// Inbound: the display process wants the persisted default settings.
pub const REQUEST_DEFAULT_SETTINGS: &str = "REQUEST_DEFAULT_SETTINGS";
/// Outbound: the persisted default settings.
pub const DEFAULT_SETTINGS: &str = "DEFAULT_SETTINGS";
/// Inbound: the display's locale.
pub const LANG: &str = "LANG";
/// Outbound: this host's IPv4 addresses.
pub const IP_ADDRESSES: &str = "IP_ADDRESSES";

/// A named message with an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification: String,
    #[serde(default)]
    pub payload: Value,
}

impl Notification {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            notification: name.into(),
            payload,
        }
    }

    pub fn update() -> Self {
        Self::new(UPDATE, Value::Null)
    }
}

/// Inbound notifications the control surface reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    CurrentStatus(Value),
    RemoteAction(Value),
    RequestDefaultSettings,
    Lang(String),
    Other(String),
}

impl From<Notification> for Inbound {
    fn from(n: Notification) -> Self {
        match n.notification.as_str() {
            CURRENT_STATUS => Inbound::CurrentStatus(n.payload),
            REMOTE_ACTION => Inbound::RemoteAction(n.payload),
            REQUEST_DEFAULT_SETTINGS => Inbound::RequestDefaultSettings,
            LANG => Inbound::Lang(match n.payload {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            _ => Inbound::Other(n.notification),
        }
    }
}

/// Cloneable handle for sending notifications to the display process.
#[derive(Clone)]
pub struct Channel {
    tx: broadcast::Sender<Notification>,
}

impl Channel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Send a notification. Returns `false` when no peer is attached;
    /// that is not an error, the message is simply dropped.
    pub fn send(&self, notification: Notification) -> bool {
        let name = notification.notification.clone();
        match self.tx.send(notification) {
            Ok(_) => true,
            Err(_) => {
                tracing::debug!(notification = %name, "no display process attached, dropping");
                false
            }
        }
    }

    pub fn notify(&self, name: &str, payload: Value) -> bool {
        self.send(Notification::new(name, payload))
    }

    /// Emit one `UPDATE` request.
    pub fn request_update(&self) -> bool {
        self.send(Notification::update())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn peer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}
