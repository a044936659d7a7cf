//! Unix socket bridge to the display process.
//!
//! The display process connects, receives every outbound notification as a
//! frame, and sends its own notifications back the same way. Inbound
//! notifications are routed by [`handle_inbound`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::broadcast;

use crate::actions::ActionRequest;
use crate::api::AppState;
use crate::channel::{Inbound, Notification, DEFAULT_SETTINGS, IP_ADDRESSES};
use crate::net;
use crate::protocol::{ErrorMsg, Frame, FrameType};
use crate::snapshot::Snapshot;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("another process is already listening on {}", .0.display())]
    AlreadyListening(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Listen for display process connections until `cancel` fires.
pub async fn serve(
    state: AppState,
    socket_path: &Path,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<(), ChannelError> {
    // A socket file nobody answers on is left over from a previous run.
    if socket_path.exists() {
        let path_owned = socket_path.to_path_buf();
        let is_active = tokio::time::timeout(
            Duration::from_secs(3),
            tokio::task::spawn_blocking(move || {
                std::os::unix::net::UnixStream::connect(&path_owned).is_ok()
            }),
        )
        .await;

        match is_active {
            Ok(Ok(true)) => return Err(ChannelError::AlreadyListening(socket_path.to_path_buf())),
            _ => std::fs::remove_file(socket_path)?,
        }
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(path = %socket_path.display(), "notification socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("notification socket received cancel signal, stopping accept loop");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state = state.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tracing::info!("display process connected");
                            if let Err(e) = handle_peer(stream, state, cancel).await {
                                tracing::debug!(error = %e, "display connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(?e, "failed to accept notification socket connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
    Ok(())
}

/// `$XDG_RUNTIME_DIR/mirror-remote.sock`, or a per-user directory in `/tmp`.
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/tmp/mirror-remote-{}", whoami()));
    PathBuf::from(runtime_dir).join("mirror-remote.sock")
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Serve one connected peer until it disconnects or `cancel` fires.
pub async fn handle_peer<S>(
    stream: S,
    state: AppState,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = tokio::io::BufReader::new(reader);

    let outbound = state.channel.subscribe();
    let writer_task = tokio::spawn(forward_outbound(outbound, writer));

    let result = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            frame = Frame::read_from(&mut reader) => frame,
        };
        let frame = match frame {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break Ok(()),
            Err(e) => break Err(ChannelError::Io(e)),
        };

        match frame.frame_type {
            FrameType::Notification => match frame.parse_json::<Notification>() {
                Ok(n) => handle_inbound(&state, n).await,
                Err(e) => tracing::warn!(error = %e, "dropping malformed notification"),
            },
            FrameType::Error => match frame.parse_json::<ErrorMsg>() {
                Ok(err) => tracing::warn!(code = %err.code, message = %err.message, "display reported an error"),
                Err(e) => tracing::warn!(error = %e, "unreadable error frame"),
            },
        }
    };

    writer_task.abort();
    tracing::info!("display process disconnected");
    result
}

async fn forward_outbound<W: AsyncWrite + Unpin>(
    mut rx: broadcast::Receiver<Notification>,
    mut writer: W,
) {
    loop {
        let notification = match rx.recv().await {
            Ok(n) => n,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "display connection lagging, notifications dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let frame = match Frame::notification(&notification) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "cannot encode notification");
                continue;
            }
        };
        match tokio::time::timeout(WRITE_TIMEOUT, frame.write_to(&mut writer)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "write to display failed");
                break;
            }
            Err(_) => {
                tracing::warn!("write to display timed out");
                break;
            }
        }
    }
}

/// React to one notification from the display process.
pub async fn handle_inbound(state: &AppState, notification: Notification) {
    match Inbound::from(notification) {
        Inbound::CurrentStatus(payload) => {
            state.waiters.resolve_all(Snapshot::from_payload(payload));
        }
        Inbound::RemoteAction(payload) => match ActionRequest::from_payload(payload) {
            Ok(request) => {
                let dispatcher = state.dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.dispatch(&request).await {
                        tracing::warn!(error = %e, "remote action from display failed");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unknown remote action"),
        },
        Inbound::RequestDefaultSettings => match state.default_settings.load().await {
            Ok(Some(saved)) => {
                state.channel.notify(DEFAULT_SETTINGS, saved);
            }
            Ok(None) => tracing::debug!("no saved default settings"),
            Err(e) => tracing::warn!(error = %e, "cannot load default settings"),
        },
        Inbound::Lang(language) => {
            state.translations.load(&language).await;
            let addresses: Vec<Value> = net::ipv4_addresses()
                .into_iter()
                .map(|ip| Value::String(ip.to_string()))
                .collect();
            state.channel.notify(IP_ADDRESSES, Value::Array(addresses));
        }
        Inbound::Other(name) => tracing::debug!(notification = %name, "ignoring notification"),
    }
}
