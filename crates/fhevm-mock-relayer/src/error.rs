//! Relayer error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures a request can hit. The status mapping is part of the wire
/// contract: clients translate 403 to access denial, other 4xx to protocol
/// errors and 5xx to retryable network errors.
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RelayerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RelayerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            RelayerError::AccessDenied(_) => (StatusCode::FORBIDDEN, self.to_string()),
            RelayerError::UnknownHandle(_) => (StatusCode::NOT_FOUND, self.to_string()),
            RelayerError::Json(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            RelayerError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            RelayerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RelayerError>;
