use serde::Serialize;
use telemetry_core::ValidationError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("db error: {0}")]
    Db(#[from] telemetry_db::DbError),
    #[error("ingest error: {0}")]
    Ingest(#[from] ingest::IngestError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip)]
    pub retry_after: Option<u64>,
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let (status, code) = match &err {
            AppError::Validation(ValidationError::OutsideBase) | AppError::Forbidden(_) => {
                (403, "forbidden")
            }
            AppError::Validation(_) | AppError::InvalidInput(_) => (400, "invalid_input"),
            AppError::NotFound(_) => (404, "not_found"),
            AppError::Unauthorized(_) => (401, "unauthorized"),
            AppError::RateLimited { .. } => (429, "rate_limited"),
            AppError::Db(_)
            | AppError::Ingest(_)
            | AppError::Io(_)
            | AppError::Serde(_)
            | AppError::Message(_) => {
                error!(error = %err, "request failed");
                return Self {
                    status: 500,
                    message: INTERNAL_ERROR_MESSAGE.to_string(),
                    code: None,
                    retry_after: None,
                };
            }
        };
        let retry_after = match &err {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        Self {
            status,
            message: err.to_string(),
            code: Some(code.to_string()),
            retry_after,
        }
    }
}
