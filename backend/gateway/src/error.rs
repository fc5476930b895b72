use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use boxinstall_core::InstallError;
use boxinstall_logging::redact_sensitive_data;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned to the browser as `{"status": "error", "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("{0} not found")]
    NotFound(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Install(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Install(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = redact_sensitive_data(&self.to_string());
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status() {
        let bad = ApiError::from(InstallError::InvalidRequest("bad".into()));
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
        let spawn = ApiError::from(InstallError::Spawn("python: not found".into()));
        assert_eq!(spawn.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::NotFound("locale".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
