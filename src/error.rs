//! Error type shared by every command and HTTP handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// A request field is missing, has the wrong type or is out of range.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or state violation (duplicate open order, taken username, ...).
    #[error("{0}")]
    Conflict(String),

    /// Authenticated, but the role is not allowed on this route.
    #[error("{0}")]
    Forbidden(String),

    /// Missing, malformed, expired or revoked credential.
    #[error("{0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a unique-constraint violation to `Conflict`, anything else stays a storage error.
    pub fn unique_or(err: rusqlite::Error, message: &str) -> Self {
        if is_constraint(&err, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) {
            AppError::Conflict(message.to_string())
        } else {
            AppError::Storage(err)
        }
    }

    /// Maps a foreign-key violation to `Conflict`, anything else stays a storage error.
    pub fn foreign_key_or(err: rusqlite::Error, message: &str) -> Self {
        if is_constraint(&err, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) {
            AppError::Conflict(message.to_string())
        } else {
            AppError::Storage(err)
        }
    }
}

fn is_constraint(err: &rusqlite::Error, extended_code: i32) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == extended_code
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                "Internal server error".to_string()
            }
            AppError::Storage(err) => {
                tracing::error!(error = %err, "storage failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
