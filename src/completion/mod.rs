//! Chat-completion backends.

pub mod error;
pub mod openai;

pub use error::{CompletionError, CompletionResult};
pub use openai::OpenAiClient;

use std::future::Future;
use std::pin::Pin;

use crate::conversation::ConversationEntry;
use crate::tools::{ToolCallRequest, ToolDefinition};

/// Boxed future type for completion calls.
pub type CompletionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the model answered.
#[derive(Clone, Debug, PartialEq)]
pub enum CompletionReply {
    /// Plain assistant text.
    Message(String),
    /// Request to run a tool before answering.
    ToolCall(ToolCallRequest),
}

/// Trait abstraction over completion APIs.
pub trait CompletionClient: Send + Sync {
    /// Complete the conversation, optionally offering tools.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response is malformed.
    fn complete<'a>(
        &'a self,
        messages: &'a [ConversationEntry],
        tools: &'a [ToolDefinition],
    ) -> CompletionFuture<'a, CompletionResult<CompletionReply>>;
}
