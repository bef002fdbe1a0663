//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use database::DatabaseError;
use thiserror::Error;

/// Errors surfaced by HTTP and WebSocket handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Store failure; not-found and validation map to their own statuses.
    #[error("{0}")]
    Database(#[from] DatabaseError),

    /// Orchestration failure.
    #[error("{0}")]
    Orchestrator(#[from] orchestrator::OrchestratorError),

    /// Malformed input from the caller.
    #[error("{0}")]
    Validation(String),

    /// Signature or token rejection.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Status code for the REST facade (and the `code` field on WS errors).
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Database(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Database(DatabaseError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Database(DatabaseError::ConstraintViolation(_)) => StatusCode::CONFLICT,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Orchestrator(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
        }
        let body = serde_json::json!({ "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
