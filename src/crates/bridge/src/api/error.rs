//! API error types and HTTP conversion
//!
//! Handlers never let errors escape: every failure maps to an `{error}`
//! body with the right status. Upstream LLM failures keep their original
//! status and body so the UI sees exactly what the provider said.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// API result type.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// LLM-bound endpoint called without an Authorization header.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream provider failure, status and body preserved.
    #[error("Upstream error {status}")]
    Upstream { status: u16, body: String },

    /// Everything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upstream { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"ok": false, "error": message}))).into_response()
    }
}

impl From<crate::BridgeError> for ApiError {
    fn from(err: crate::BridgeError) -> Self {
        match err {
            crate::BridgeError::InvalidInput(msg) => ApiError::BadRequest(msg),
            crate::BridgeError::Llm(llm::LlmError::MissingApiKey) => ApiError::Unauthorized(
                "Add your API key so I can reach the model.".to_string(),
            ),
            crate::BridgeError::Llm(llm::LlmError::Provider { status, body }) => {
                ApiError::Upstream { status, body }
            }
            crate::BridgeError::Llm(e) => ApiError::Upstream {
                status: e.status(),
                body: e.to_string(),
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}
