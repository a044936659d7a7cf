use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::actions::ActionError;
use crate::help::HelpError;
use crate::store::StoreError;

/// Structured error type for all API handlers.
///
/// Each variant maps to an HTTP status code, a machine-readable `reason`
/// string and a human-readable `info` string. Rendered as
/// `{"status": "error", "reason": ..., "info": ...}`, the same shape the
/// remote UI already understands for action failures.
///
/// Action outcomes (unknown command, failed host command, failed install)
/// are answered with 200: the UI only runs its reply callback on success
/// and reads `status` from the body.
#[derive(Debug)]
pub enum ApiError {
    /// 200 - Unrecognized action or query; `info` echoes the input.
    UnknownCommand(String),
    /// 400 - Malformed request.
    InvalidRequest(String),
    /// 400 - Submitted configuration failed validation.
    InvalidConfig(String),
    /// 200 - A host command failed or timed out.
    CommandFailed(String),
    /// 200 - Cloning or setting up an extension failed.
    InstallFailed(String),
    /// 500 - No backup could be made; the live config is untouched.
    BackupFailed(String),
    /// 500 - Writing the new config failed after the backup succeeded.
    SaveFailed(String),
    /// 502 - Repository lookup for the help redirect failed.
    HelpUnavailable(String),
    /// 503 - The UI template has not been loaded.
    TemplateUnavailable,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnknownCommand(_) => StatusCode::OK,
            ApiError::CommandFailed(_) => StatusCode::OK,
            ApiError::InstallFailed(_) => StatusCode::OK,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ApiError::BackupFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::SaveFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::HelpUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::TemplateUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::UnknownCommand(_) => "unknown_command",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::InvalidConfig(_) => "invalid_config",
            ApiError::CommandFailed(_) => "unknown",
            ApiError::InstallFailed(_) => "install_failed",
            ApiError::BackupFailed(_) => "backup_failed",
            ApiError::SaveFailed(_) => "save_failed",
            ApiError::HelpUnavailable(_) => "help_unavailable",
            ApiError::TemplateUnavailable => "template_unavailable",
        }
    }

    pub fn info(&self) -> String {
        match self {
            ApiError::UnknownCommand(info) => info.clone(),
            ApiError::InvalidRequest(detail) => format!("Invalid request: {}.", detail),
            ApiError::InvalidConfig(detail) => detail.clone(),
            ApiError::CommandFailed(detail) => detail.clone(),
            ApiError::InstallFailed(detail) => detail.clone(),
            ApiError::BackupFailed(detail) => detail.clone(),
            ApiError::SaveFailed(detail) => detail.clone(),
            ApiError::HelpUnavailable(detail) => detail.clone(),
            ApiError::TemplateUnavailable => "The UI template is not loaded yet.".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "reason": self.reason(),
            "info": self.info(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<ActionError> for ApiError {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::UnknownCommand { .. } => ApiError::UnknownCommand(e.to_string()),
            ActionError::Command(inner) => ApiError::CommandFailed(inner.to_string()),
            ActionError::Install(detail) => ApiError::InstallFailed(detail),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        if e.is_backup_failure() {
            return ApiError::BackupFailed(e.to_string());
        }
        match e {
            StoreError::Invalid(_) | StoreError::Malformed(_) => ApiError::InvalidConfig(e.to_string()),
            other => ApiError::SaveFailed(other.to_string()),
        }
    }
}

impl From<HelpError> for ApiError {
    fn from(e: HelpError) -> Self {
        match e {
            HelpError::InvalidModule(_) => ApiError::InvalidRequest(e.to_string()),
            other => ApiError::HelpUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use std::path::PathBuf;

    async fn response_parts(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = Body::new(response.into_body())
            .collect()
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn unknown_command_body() {
        let err: ApiError = ActionError::UnknownCommand {
            input: r#"{"action":"NOT_A_REAL_ACTION"}"#.into(),
        }
        .into();
        let (status, json) = response_parts(err).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({
                "status": "error",
                "reason": "unknown_command",
                "info": "original input: {\"action\":\"NOT_A_REAL_ACTION\"}",
            })
        );
    }

    #[tokio::test]
    async fn command_failure_reason_is_unknown() {
        let (status, json) = response_parts(ApiError::CommandFailed("`x` timed out after 8000ms".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reason"], "unknown");
        assert_eq!(json["info"], "`x` timed out after 8000ms");
    }

    #[tokio::test]
    async fn install_failure_is_reported_in_the_body() {
        let err: ApiError = ActionError::Install("dependency install: `npm install` exited".into()).into();
        let (status, json) = response_parts(err).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "error");
        assert_eq!(json["reason"], "install_failed");
    }

    #[tokio::test]
    async fn backup_failure_maps_to_backup_failed() {
        let err: ApiError = StoreError::NoBackupSlot(PathBuf::from("/cfg/config.js")).into();
        let (status, json) = response_parts(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["status"], "error");
        assert_eq!(json["reason"], "backup_failed");
    }

    #[tokio::test]
    async fn invalid_config_is_client_error() {
        let err: ApiError = StoreError::Invalid("module name is empty".into()).into();
        let (status, json) = response_parts(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["reason"], "invalid_config");
    }

    #[tokio::test]
    async fn help_failure_is_bad_gateway() {
        let err: ApiError = HelpError::NoRemote("MMM-X".into()).into();
        let (status, _) = response_parts(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let err: ApiError = HelpError::InvalidModule("..".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn template_unavailable_status() {
        let (status, json) = response_parts(ApiError::TemplateUnavailable).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["reason"], "template_unavailable");
    }
}
