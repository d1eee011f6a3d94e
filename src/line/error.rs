//! Error types for the LINE transport.

use thiserror::Error;

/// Errors raised while receiving or answering LINE webhooks.
#[derive(Debug, Error)]
pub enum LineError {
    /// `X-Line-Signature` missing or not matching the body.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Webhook body is not a valid event envelope.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Messaging API returned a non-success status.
    #[error("messaging API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },
}

/// Convenience result alias for LINE operations.
pub type LineResult<T> = Result<T, LineError>;
