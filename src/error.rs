use axum::{http::StatusCode, response::IntoResponse};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Derived metrics were requested for an (item, date) that has no snapshot row.
    #[error("No base snapshot for item {item_id} on {date}")]
    NoBaseSnapshot { item_id: String, date: NaiveDate },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed pagination, sort or date-range parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A persisted value could not be decoded into its domain type.
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NoBaseSnapshot { .. } | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
