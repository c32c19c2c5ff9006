use agency_framework::{AgencyError, ErrorKind};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

/// An [`AgencyError`] rendered as `{detail, kind}` with the matching status code
#[derive(Debug)]
pub struct ApiError(pub AgencyError);

impl From<AgencyError> for ApiError {
    fn from(err: AgencyError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status =
            StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = if kind == ErrorKind::Internal {
            error!("Internal error: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.detail()
        };
        (status, Json(json!({ "detail": detail, "kind": kind.as_str() }))).into_response()
    }
}
