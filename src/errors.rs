use crate::services::{asset_service::AssetError, ingest_service::IngestError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for a 401 Unauthorized
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    /// Shortcut for a 403 Forbidden
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(msg) => AppError::bad_request(msg),
            err @ IngestError::NotFound(_) => AppError::not_found(err.to_string()),
            err @ IngestError::Forbidden(_) => AppError::forbidden(err.to_string()),
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        match err {
            err @ (AssetError::UnsupportedMediaType(_) | AssetError::InvalidName) => {
                AppError::bad_request(err.to_string())
            }
            err @ AssetError::NotFound(_) => AppError::not_found(err.to_string()),
            AssetError::Io(inner) => AppError::internal(inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{media_service::MediaError, storage_service::StorageError};
    use uuid::Uuid;

    #[test]
    fn ingest_errors_map_to_their_status_codes() {
        let cases = [
            (
                AppError::from(IngestError::Validation("too big".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(IngestError::NotFound(Uuid::new_v4())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(IngestError::Forbidden(Uuid::new_v4())),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::from(IngestError::Media(MediaError::Probe {
                    path: "x.mp4".into(),
                    reason: "exit code 1".into(),
                })),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::from(IngestError::Storage(StorageError::Upload {
                    key: "landscape/x.mp4".into(),
                    reason: "network".into(),
                })),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status, status, "{}", err.message);
        }
    }

    #[test]
    fn asset_errors_map_to_their_status_codes() {
        assert_eq!(
            AppError::from(AssetError::UnsupportedMediaType("image/gif".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(AssetError::NotFound("x.png".into())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(AssetError::InvalidName).status,
            StatusCode::BAD_REQUEST
        );
    }
}
