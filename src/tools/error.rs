//! Error types for tool dispatch.

use thiserror::Error;

/// Errors raised while validating or running a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a tool that is not declared.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the declared parameter schema.
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// What was wrong.
        reason: String,
    },

    /// The weather service does not know the location.
    #[error("location not found: {0}")]
    LocationNotFound(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-success status.
    #[error("tool API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// Upstream response lacked required fields.
    #[error("malformed tool response: {0}")]
    MalformedResponse(String),

    /// URL construction failed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
