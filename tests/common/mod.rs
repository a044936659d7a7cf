#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use mirror_remote::api::AppState;
use mirror_remote::bridge;
use mirror_remote::channel::{Notification, CURRENT_STATUS, UPDATE};
use mirror_remote::settings::Settings;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// A service rooted in a temp directory. Keep `dir` alive for the test.
pub struct TestEnv {
    pub dir: TempDir,
    pub state: AppState,
}

impl TestEnv {
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn live_config(&self) -> PathBuf {
        self.state.store.live_path().to_path_buf()
    }
}

/// Settings with short timeouts and harmless host commands.
pub fn test_settings(root: &Path) -> Settings {
    let mut settings = Settings::default().rooted_at(root);
    settings.timeouts.refresh = 200;
    settings.timeouts.command = 2000;
    settings.commands.shutdown = "true".into();
    settings.commands.reboot = "true".into();
    settings.commands.restart = "true".into();
    settings.commands.monitor_on = "true".into();
    settings.commands.monitor_off = "exit 2".into();
    settings
}

/// Build an environment; `prepare` runs on the root before state is built.
pub async fn test_env_with(prepare: impl FnOnce(&Path), tweak: impl FnOnce(&mut Settings)) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::create_dir_all(dir.path().join("modules")).unwrap();
    std::fs::create_dir_all(dir.path().join("translations")).unwrap();
    prepare(dir.path());

    let mut settings = test_settings(dir.path());
    tweak(&mut settings);
    let state = AppState::new(settings);
    state.load().await;
    TestEnv { dir, state }
}

pub async fn test_env() -> TestEnv {
    test_env_with(|_| {}, |_| {}).await
}

/// Starts an HTTP server and returns its address
pub async fn start_server(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Stand-in for the display process: answers every `UPDATE` with `status`.
pub fn spawn_fake_display(state: &AppState, status: Value) -> tokio::task::JoinHandle<()> {
    let mut rx = state.channel.subscribe();
    let state = state.clone();
    tokio::spawn(async move {
        while let Ok(n) = rx.recv().await {
            if n.notification == UPDATE {
                bridge::handle_inbound(&state, Notification::new(CURRENT_STATUS, status.clone())).await;
            }
        }
    })
}

/// Set a file's modification time to `hours` hours ago.
pub fn set_age(path: &Path, hours: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(hours * 3600))
        .unwrap();
}
