//! HTTP error mapping

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::DialrError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(DialrError),
    Unauthorized,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Domain(DialrError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Domain(DialrError::ParticipantNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Domain(DialrError::InvalidState(_)) => StatusCode::CONFLICT,
            // 500 makes the provider redeliver webhooks
            ApiError::Domain(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DialrError> for ApiError {
    fn from(error: DialrError) -> Self {
        ApiError::Domain(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::Domain(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "Request failed");
                }
                e.to_string()
            }
            ApiError::Unauthorized => "missing or invalid admin token".to_string(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DialrError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DialrError::ParticipantNotFound("x".into()), StatusCode::NOT_FOUND),
            (DialrError::InvalidState("x".into()), StatusCode::CONFLICT),
            (DialrError::Telephony("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (DialrError::Pipeline("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
