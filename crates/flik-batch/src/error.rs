//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::IngestError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UnknownContentType(_) | IngestError::InvalidParameter(_) => {
                AppError::Validation(err.to_string())
            },
            IngestError::AlreadyRunning(_) => AppError::Conflict(err.to_string()),
            IngestError::RunNotFound(_) => AppError::NotFound(err.to_string()),
            IngestError::Persistence(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
            },
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Validation(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Conflict(ref message) => (StatusCode::CONFLICT, message.clone()),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: IngestError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_ingest_error_status_mapping() {
        assert_eq!(status_of(IngestError::invalid("page_size")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(IngestError::UnknownContentType("25".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(IngestError::AlreadyRunning("enrichment".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(IngestError::RunNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(IngestError::Persistence(sqlx::Error::PoolTimedOut)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(IngestError::TransientFetch("timeout".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_missing_places_key_is_a_bad_request() {
        let err = AppError::from(IngestError::invalid("GOOGLE_PLACES_API_KEY is not configured"));
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("GOOGLE_PLACES_API_KEY")));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
