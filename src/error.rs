//! Server error types with HTTP status code mapping

use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Node error type that wraps store errors and provides HTTP status mapping
#[derive(Error, Debug)]
pub enum NodeError {
    /// Malformed or out-of-range request parameter
    #[error("{0}")]
    Validation(String),

    /// Referenced session name does not exist
    #[error("Cannot find session")]
    SessionNotFound,

    /// Session creation attempted on a node that does not mint sessions
    #[error("This node is not a session maker")]
    NotSessionMaker,

    /// Storage layer error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Any other internal fault
    #[error("{0}")]
    Internal(String),
}

impl NodeError {
    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            NodeError::Validation(_) => StatusCode::BAD_REQUEST,
            NodeError::SessionNotFound => StatusCode::NOT_FOUND,
            NodeError::NotSessionMaker => StatusCode::FORBIDDEN,
            NodeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        NodeError::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        NodeError::Internal(msg.into())
    }
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub status: u16,
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal detail goes to the log, not to the caller.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request handler failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: message,
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
