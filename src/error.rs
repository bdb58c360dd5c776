//! Application error types returned to HTTP callers.
//!
//! Authentication-sensitive causes are collapsed into generic variants so the
//! API does not act as an account-enumeration or token-validity oracle; the
//! precise cause stays in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing Authorization header")]
    MissingCredential,

    #[error("Invalid or expired token")]
    Unauthorized,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Only text or pdf files are supported")]
    UnsupportedMedia,

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps a unique-constraint violation on users.email to `EmailTaken`,
    /// so a registration race still produces the right error.
    pub fn email_conflict(e: sqlx::Error) -> AppError {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::EmailTaken,
            _ => AppError::Db(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::EmailTaken => (StatusCode::CONFLICT, self.to_string()),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::MissingCredential => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::InvalidResetToken => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::UnsupportedMedia => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string()),
            AppError::Db(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            AppError::Upstream(msg) => {
                error!(error = %msg, "upstream service error");
                (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
            }
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
