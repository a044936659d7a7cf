//! mirror-remote - remote control for a smart-mirror display
//!
//! Serves the remote-control HTTP API and a Unix socket the display process
//! attaches to. Display state is never owned here: queries request a fresh
//! status from the display and answer once it arrives or a timeout elapses.

use clap::Parser as ClapParser;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use mirror_remote::{
    api,
    bridge::{self, ChannelError},
    settings::{self, Settings, SettingsError},
};

/// mirror-remote - remote control for a smart-mirror display
#[derive(ClapParser, Debug)]
#[command(name = "mirror-remote", version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP API server
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Unix socket the display process connects to
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Service settings file (TOML)
    #[arg(long, env = "MIRROR_REMOTE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Base directory for relative paths in the settings (defaults to the
    /// current directory)
    #[arg(long)]
    root: Option<PathBuf>,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("notification socket error: {0}")]
    Channel(#[from] ChannelError),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    let cli = Cli::parse();
    init_tracing();
    run_server(cli).await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mirror_remote=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_server(cli: Cli) -> Result<(), ServiceError> {
    tracing::info!("mirror-remote starting");

    let settings_path = cli.settings.unwrap_or_else(settings::default_settings_path);
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let settings = Settings::load(&settings_path)?.rooted_at(&root);

    if !cli.bind.ip().is_loopback() {
        tracing::warn!(
            addr = %cli.bind,
            "binding to a non-loopback address; anyone on the network can run the configured host commands"
        );
    }

    let state = api::AppState::new(settings);
    state.load().await;

    let app = api::router(state.clone());
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    tracing::info!(addr = %cli.bind, "HTTP server listening");

    let (server_shutdown_tx, server_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                server_shutdown_rx.await.ok();
            })
            .await
    });

    let socket_path = cli.socket.unwrap_or_else(bridge::default_socket_path);
    let cancel = tokio_util::sync::CancellationToken::new();
    let mut socket_handle = {
        let state = state.clone();
        let socket_path = socket_path.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { bridge::serve(state, &socket_path, cancel).await })
    };

    tracing::info!("mirror-remote ready");

    let early_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("received Ctrl+C");
            None
        }
        result = &mut socket_handle => Some(result?),
    };

    cancel.cancel();
    let _ = server_shutdown_tx.send(());

    if let Err(e) = http_handle.await? {
        tracing::warn!(?e, "HTTP server stopped with error");
    }

    let socket_result = match early_exit {
        Some(result) => result,
        None => socket_handle.await?,
    };
    // Only clean up a socket this process actually bound.
    if !matches!(socket_result, Err(ChannelError::AlreadyListening(_))) && socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
        tracing::debug!(path = %socket_path.display(), "removed socket file");
    }
    socket_result?;

    tracing::info!("mirror-remote exiting");
    Ok(())
}
