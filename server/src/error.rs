use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

/// Error kinds per the propagation policy: `Transient` and `Validation`
/// failures are handled locally by the pipeline/orchestrator and never
/// reach the HTTP surface; `Fatal` aborts the current execution;
/// `Concurrency` is logged, not raised. This enum also carries the plain
/// HTTP-facing variants for the thin status/replay surface.
#[derive(Debug)]
pub enum AppError {
    /// Retryable, not fatal: connection timeout, LLM I/O timeout, upstream 5xx.
    Transient(String),
    /// Non-retryable within this run: invalid credentials, unknown account, invalid cron.
    Permanent(String),
    /// Malformed input that was already recovered via safe defaults; surfaced
    /// only when a caller chose not to tolerate it.
    Validation(String),
    /// Repository connectivity loss or other unrecoverable failure.
    Fatal(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DbError(sea_orm::error::DbErr),
    Internal(anyhow::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Transient(m) => write!(f, "transient error: {m}"),
            AppError::Permanent(m) => write!(f, "permanent error: {m}"),
            AppError::Validation(m) => write!(f, "validation error: {m}"),
            AppError::Fatal(m) => write!(f, "fatal error: {m}"),
            AppError::NotFound(m) => write!(f, "not found: {m}"),
            AppError::BadRequest(m) => write!(f, "bad request: {m}"),
            AppError::Conflict(m) => write!(f, "conflict: {m}"),
            AppError::DbError(e) => write!(f, "database error: {e}"),
            AppError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<sea_orm::error::DbErr> for AppError {
    fn from(error: sea_orm::error::DbErr) -> Self {
        AppError::DbError(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("reqwest error: {:?}", error);
        if error.is_timeout() {
            AppError::Transient(error.to_string())
        } else if let Some(status) = error.status() {
            if status.is_server_error() {
                AppError::Transient(error.to_string())
            } else {
                AppError::Permanent(error.to_string())
            }
        } else {
            AppError::Internal(error.into())
        }
    }
}

impl From<lib_mail::MailError> for AppError {
    fn from(error: lib_mail::MailError) -> Self {
        match error {
            lib_mail::MailError::Connection(m) => AppError::Transient(m),
            lib_mail::MailError::Timeout(m) => AppError::Transient(m),
            lib_mail::MailError::Authentication(m) => AppError::Permanent(m),
            lib_mail::MailError::Parse(m) => AppError::Validation(m),
            lib_mail::MailError::Protocol(m) => AppError::Transient(m),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Permanent(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            AppError::Transient(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            AppError::Fatal(m) => {
                tracing::error!("fatal error: {m}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            AppError::DbError(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({"error": {"code": status.as_u16(), "message": message}})),
        )
            .into_response()
    }
}
