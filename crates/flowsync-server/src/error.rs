//! Mapping of library errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use flowsync_core::Error;

/// Handler error. Every failure renders as `{ "success": false, "error": ... }`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::UnknownPlatform(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::PlatformNotEnabled(_) | Error::Config(_) | Error::Unsupported(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::ConnectionFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = json!({
            "success": false,
            "error": self.0.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
