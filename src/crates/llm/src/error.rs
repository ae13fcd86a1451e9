//! Error types for LLM provider adapters.

use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when talking to an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The HTTP request itself failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status. Status and body are
    /// preserved so the HTTP surface can propagate them to the caller.
    #[error("Provider error {status}: {body}")]
    Provider { status: u16, body: String },

    /// The provider answered 2xx but the body did not match the expected
    /// response shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No API key was supplied for a call that requires one.
    #[error("Missing API key")]
    MissingApiKey,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// HTTP status to surface for this error, when proxying provider
    /// failures back to the UI.
    pub fn status(&self) -> u16 {
        match self {
            LlmError::Provider { status, .. } => *status,
            LlmError::MissingApiKey => 401,
            LlmError::Http(_) => 502,
            _ => 500,
        }
    }
}
