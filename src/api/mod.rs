pub mod error;
mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use std::sync::Arc;

use crate::actions::Dispatcher;
use crate::catalog::Catalog;
use crate::channel::Channel;
use crate::locale::{Template, Translations};
use crate::settings::Settings;
use crate::store::{ConfigStore, DefaultSettings};
use crate::waiters::Waiters;

use handlers::*;

/// Every long-lived component, constructed once at startup and shared by
/// the HTTP handlers and the notification bridge.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub channel: Channel,
    pub waiters: Waiters,
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<ConfigStore>,
    pub catalog: Arc<Catalog>,
    pub default_settings: Arc<DefaultSettings>,
    pub translations: Arc<Translations>,
    pub template: Arc<Template>,
}

impl AppState {
    /// Build the components. Reads the live configuration document
    /// synchronously; everything else is loaded by [`AppState::load`].
    pub fn new(settings: Settings) -> Self {
        let paths = &settings.paths;
        let channel = Channel::new();
        let waiters = Waiters::with_timeout(channel.clone(), settings.timeouts.refresh());
        let catalog = Arc::new(Catalog::new(
            &paths.catalog,
            &paths.modules_dir,
            settings.help.default_modules.clone(),
            settings.help.core_repository.clone(),
        ));
        let default_settings = Arc::new(DefaultSettings::new(&paths.default_settings));
        let dispatcher = Arc::new(Dispatcher::new(
            settings.commands.clone(),
            settings.timeouts.clone(),
            channel.clone(),
            waiters.clone(),
            default_settings.clone(),
            catalog.clone(),
        ));
        let store = Arc::new(ConfigStore::load_or_default(&paths.config, paths.backup_slots));
        let translations = Arc::new(Translations::new(&paths.translations_dir));

        Self {
            settings: Arc::new(settings),
            channel,
            waiters,
            dispatcher,
            store,
            catalog,
            default_settings,
            translations,
            template: Arc::new(Template::empty()),
        }
    }

    /// Read the extension manifest, fallback translations and UI template.
    pub async fn load(&self) {
        self.catalog.rescan().await;
        self.translations.load_fallback().await;
        self.template.load(&self.settings.paths.template).await;
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/remote.html", get(remote_page))
        .route("/get", get(get_data))
        .route("/post", post(post_data))
        .route("/config-help.html", get(config_help))
        .route("/remote", get(remote_action))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("no-referrer"),
        ))
}
