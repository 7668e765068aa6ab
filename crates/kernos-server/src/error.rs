//! Error types for Kernos server.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernos_core::ErrorKind;

use crate::protocol::ErrorBody;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Kernos core error.
    #[error("{0}")]
    Core(#[from] kernos_core::Error),

    /// Request body missing, not JSON, or missing fields.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Blocking task panicked or was cancelled.
    #[error("request task failed: {0}")]
    Task(String),

    /// Bad listen address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Classify using the core taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::BadRequest(_) | Self::InvalidAddress(_) => ErrorKind::Validation,
            Self::Task(_) => ErrorKind::Process,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Range | ErrorKind::Type => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::Io | ErrorKind::Process => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind().as_str().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                ServerError::BadRequest("missing field".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                kernos_core::Error::KernelNotFound(PathBuf::from("/nb.ipynb")).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                kernos_core::Error::CellIndexOutOfRange { index: 3, len: 1 }.into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                kernos_core::Error::InvalidState {
                    operation: "submit code",
                    state: kernos_core::WorkerState::Executing,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                kernos_core::Error::Process("spawn failed".to_string()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                kernos_core::Error::MessageTimeout(Duration::from_secs(1)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{}", error);
        }
    }
}
