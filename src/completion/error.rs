//! Error types for completion calls.

use thiserror::Error;

/// Errors produced by a completion backend.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP client error.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    /// Completion API returned a non-success status.
    #[error("completion API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// Response did not contain a usable choice.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

/// Convenience result alias for completion operations.
pub type CompletionResult<T> = Result<T, CompletionError>;
