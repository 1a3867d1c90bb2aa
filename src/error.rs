use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to start server: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("edit window expired (max_edit_minutes: {max_edit_minutes})")]
    EditWindowExpired { max_edit_minutes: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Retryable errors are transient infrastructure failures; everything
    /// else is terminal and must be surfaced to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            AppError::Redis(e) => e.is_connection_dropped() || e.is_timeout(),
            AppError::Internal => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound => 404,
            AppError::Unsupported(_) => 422,
            AppError::EditWindowExpired { .. } => 403,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Internal => 500,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "validation_error",
            AppError::Unauthorized => "authentication_error",
            AppError::Forbidden => "authorization_error",
            AppError::NotFound => "not_found_error",
            AppError::Unsupported(_) => "unsupported_error",
            AppError::EditWindowExpired { .. } => "authorization_error",
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Internal => "server_error",
        }
    }
}

pub fn map_error(err: &AppError) -> (StatusCode, serde_json::Value) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": err.error_type(),
        "message": err.to_string(),
        "status": status.as_u16(),
        "retryable": err.is_retryable(),
    });
    (status, body)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = map_error(&self);
        (status, Json(body)).into_response()
    }
}
