//! Error types for the relay core and its HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced by the message store gateway and the chat service
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Malformed or missing input, rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// The targeted conversation does not exist
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// The storage collaborator failed
    #[error("Storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "VALIDATION_ERROR",
            ChatError::NotFound(_) => "NOT_FOUND",
            ChatError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Message safe to show to a client. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Storage(_) => "Failed to access conversation storage".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Storage(e) => {
                tracing::error!(error = ?e, "Storage error while handling request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        }));

        (status, body).into_response()
    }
}

/// Failures of the automated-reply generator. Never leaves the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Reply generator is not configured")]
    Unavailable,
    #[error("Reply generation timed out")]
    Timeout,
    #[error("Reply generator returned no content")]
    EmptyResponse,
    #[error("Reply generator failed: {0:#}")]
    Upstream(#[source] anyhow::Error),
}

/// Result type alias for core operations
pub type ChatResult<T> = Result<T, ChatError>;
