//! # Web API Error Types
//!
//! Maps the orchestrator's error taxonomy onto webhook status codes. Every
//! error response has the same JSON shape so callers never see an empty or
//! HTML body.

use crate::error::OrchestratorError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Signature verification failed: {reason}")]
    Unauthorized { reason: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Details stay in the logs and the dead-letter entry
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error must be paired with a dead-letter write
    pub fn is_internal(&self) -> bool {
        matches!(self, ApiError::Internal)
    }
}

impl From<&OrchestratorError> for ApiError {
    fn from(error: &OrchestratorError) -> Self {
        match error {
            OrchestratorError::ValidationError(message) => ApiError::BadRequest {
                message: message.clone(),
            },
            OrchestratorError::VerificationError(reason) => ApiError::Unauthorized {
                reason: reason.clone(),
            },
            OrchestratorError::NotFound(message) => ApiError::NotFound {
                message: message.clone(),
            },
            _ => ApiError::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error_code, message) = match &self {
            ApiError::BadRequest { message } => ("BAD_REQUEST", message.as_str()),
            ApiError::Unauthorized { reason } => ("UNAUTHORIZED", reason.as_str()),
            ApiError::NotFound { message } => ("NOT_FOUND", message.as_str()),
            ApiError::Internal => ("INTERNAL_ERROR", "Internal server error"),
        };

        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        let cases = [
            (OrchestratorError::validation("Missing video_id"), StatusCode::BAD_REQUEST),
            (OrchestratorError::VerificationError("bad".into()), StatusCode::UNAUTHORIZED),
            (OrchestratorError::not_found("wf1"), StatusCode::NOT_FOUND),
            (OrchestratorError::upstream("caption", "500"), StatusCode::INTERNAL_SERVER_ERROR),
            (OrchestratorError::store("down"), StatusCode::INTERNAL_SERVER_ERROR),
            (OrchestratorError::Timeout("25s".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(&error).status_code(), expected, "{error}");
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = ApiError::from(&OrchestratorError::store("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::Internal.to_string(), "Internal server error");
    }
}
