use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::actions::{self, ActionError, ActionRequest};
use crate::help;
use crate::store::ConfigDocument;

use super::error::ApiError;
use super::AppState;

type Params = Query<Vec<(String, String)>>;

fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// The remote-control page, filled with the current brightness.
pub(super) async fn remote_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    if !state.template.is_loaded() {
        return Err(ApiError::TemplateUnavailable);
    }
    let snapshot = state.waiters.fresh(state.waiters.default_timeout()).await;
    let brightness = snapshot.as_ref().and_then(|s| s.brightness());
    state
        .template
        .render(&state.translations, brightness)
        .map(Html)
        .ok_or(ApiError::TemplateUnavailable)
}

pub(super) async fn get_data(
    State(state): State<AppState>,
    Query(pairs): Params,
) -> Result<Json<Value>, ApiError> {
    let body = match param(&pairs, "data") {
        Some("modulesAvailable") => serde_json::to_value(state.catalog.available())
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
        Some("translations") => Value::Object(state.translations.table()),
        Some("config") => {
            let merged = state.store.merged(&state.catalog.defaults());
            serde_json::to_value(merged).map_err(|e| ApiError::InvalidRequest(e.to_string()))?
        }
        Some("defaultConfig") => {
            let module = param(&pairs, "module").unwrap_or_default();
            state
                .catalog
                .defaults_for(module)
                .map(Value::Object)
                .unwrap_or(Value::Null)
        }
        Some("modules") => {
            let snapshot = state.waiters.fresh(state.waiters.default_timeout()).await;
            snapshot.map(|s| s.module_data_json()).unwrap_or(Value::Null)
        }
        Some("brightness") => {
            let snapshot = state.waiters.fresh(state.waiters.default_timeout()).await;
            snapshot.map(|s| s.brightness_json()).unwrap_or(Value::Null)
        }
        _ => return Err(ActionError::unknown_query(&pairs).into()),
    };
    Ok(Json(body))
}

/// Replace the configuration document.
pub(super) async fn post_data(
    State(state): State<AppState>,
    Query(pairs): Params,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if param(&pairs, "data") != Some("config") {
        return Err(ActionError::unknown_query(&pairs).into());
    }
    let doc: ConfigDocument = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidConfig(format!("invalid configuration body: {e}")))?;

    let report = state.store.rotate_and_save(doc).await?;
    tracing::info!(backup_slot = ?report.slot, "configuration saved");
    Ok(Json(actions::success()))
}

pub(super) async fn config_help(
    State(state): State<AppState>,
    Query(pairs): Params,
) -> Result<Response, ApiError> {
    let module = param(&pairs, "module")
        .ok_or_else(|| ApiError::InvalidRequest("missing module".into()))?;
    let url = help::help_url(
        &state.settings.help,
        &state.settings.commands.git,
        state.catalog.modules_dir(),
        module,
    )
    .await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

pub(super) async fn remote_action(
    State(state): State<AppState>,
    Query(pairs): Params,
) -> Result<Json<Value>, ApiError> {
    let request = ActionRequest::from_query(&pairs)?;
    let reply = state.dispatcher.dispatch(&request).await?;
    Ok(Json(reply))
}
