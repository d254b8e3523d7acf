use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::attempt::AttemptStatus;

/// Failures of attempt operations. All of them are detected before the
/// stored record is touched.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("Attempt not found: {0}")]
    NotFound(String),

    #[error("Attempt {id} is {status} and can no longer be modified")]
    InvalidState { id: String, status: AttemptStatus },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Attempt {0} was modified concurrently")]
    Conflict(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl AttemptError {
    /// Stable machine-readable kind, used in response bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::NotFound(_) => "not_found",
            AttemptError::InvalidState { .. } => "invalid_state",
            AttemptError::Validation(_) => "validation_error",
            AttemptError::Conflict(_) => "conflict",
            AttemptError::Forbidden(_) => "forbidden",
            AttemptError::Storage(_) => "storage_failure",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AttemptError::NotFound(_) => StatusCode::NOT_FOUND,
            AttemptError::InvalidState { .. } | AttemptError::Conflict(_) => StatusCode::CONFLICT,
            AttemptError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AttemptError::Forbidden(_) => StatusCode::FORBIDDEN,
            AttemptError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AttemptError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AttemptError::Validation(errors.to_string())
    }
}

impl From<mongodb::error::Error> for AttemptError {
    fn from(err: mongodb::error::Error) -> Self {
        AttemptError::Storage(err.to_string())
    }
}

impl IntoResponse for AttemptError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Attempt operation failed: {}", self);
        } else {
            tracing::warn!("Attempt operation rejected: {}", self);
        }

        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_distinguish_error_kinds() {
        let invalid = AttemptError::InvalidState {
            id: "a1".to_string(),
            status: AttemptStatus::Submitted,
        };
        assert_eq!(invalid.status_code(), StatusCode::CONFLICT);
        assert_eq!(invalid.kind(), "invalid_state");
        assert_eq!(
            invalid.to_string(),
            "Attempt a1 is submitted and can no longer be modified"
        );

        assert_eq!(
            AttemptError::NotFound("a1".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AttemptError::Validation("bad".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AttemptError::Storage("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
