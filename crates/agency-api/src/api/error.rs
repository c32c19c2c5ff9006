//! Mapping of Agency errors onto HTTP responses

use agency_framework::{AgencyError, ErrorKind};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

/// An [`AgencyError`] on its way to becoming an HTTP response
#[derive(Debug)]
pub struct ApiError(pub AgencyError);

impl ApiError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ApiError(AgencyError::InvalidInput(message.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.kind().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<AgencyError> for ApiError {
    fn from(err: AgencyError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.0.kind();
        // Internal details stay in the log
        let detail = if kind == ErrorKind::Internal {
            error!("Internal error: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.detail()
        };

        (
            status,
            Json(json!({ "detail": detail, "kind": kind.as_str() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AgencyError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (AgencyError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AgencyError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                AgencyError::UpstreamUnreachable("x".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AgencyError::UnsupportedOperation("x".into()),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                AgencyError::Storage("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status_code(), expected);
        }
    }
}
