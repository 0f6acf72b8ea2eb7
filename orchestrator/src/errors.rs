//! Error types for the orchestrator

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The target host rejected the supplied credentials
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The target host could not be reached or the channel broke
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A remote call exceeded its bounded timeout
    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    /// A remote command exited non-zero
    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: u32,
        stderr: String,
    },

    /// A prerequisite of the requested unit is not satisfied
    #[error("{0}")]
    PreconditionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("DNS provider error: {0}")]
    DnsError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for OrchestratorError {
    fn from(rejection: JsonRejection) -> Self {
        OrchestratorError::ValidationError(rejection.body_text())
    }
}

impl From<russh::Error> for OrchestratorError {
    fn from(err: russh::Error) -> Self {
        OrchestratorError::ConnectionError(err.to_string())
    }
}

impl OrchestratorError {
    /// HTTP status used when the error is returned to a client
    pub fn status_code(&self) -> StatusCode {
        match self {
            OrchestratorError::AuthError(_) => StatusCode::UNAUTHORIZED,
            OrchestratorError::ValidationError(_) | OrchestratorError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::PreconditionError(_) => StatusCode::PRECONDITION_FAILED,
            OrchestratorError::Conflict(_) => StatusCode::CONFLICT,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::ConnectionError(_)
            | OrchestratorError::DnsError(_)
            | OrchestratorError::HttpError(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
