//! OpenAI chat-completions client with function calling.
//!
//! Behaviour:
//! - `POST {base_url}/chat/completions` with a bearer API key.
//! - Tool declarations are sent as `functions` with `function_call: "auto"`.
//! - Tool entries are replayed to the model as `function` role messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::completion::error::{CompletionError, CompletionResult};
use crate::completion::{CompletionClient, CompletionFuture, CompletionReply};
use crate::conversation::{ConversationEntry, Role};
use crate::tools::{ToolCallRequest, ToolDefinition};

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-0613";

/// Connection timeout for completion requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl<'a> From<&'a ConversationEntry> for WireMessage<'a> {
    fn from(entry: &'a ConversationEntry) -> Self {
        let role = match entry.role() {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "function",
        };
        Self {
            role,
            content: entry.content(),
            name: entry.tool_name(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

/// OpenAI-compatible completion client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Create a client for the given endpoint and model.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> CompletionResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn post_chat(
        &self,
        messages: &[ConversationEntry],
        tools: &[ToolDefinition],
    ) -> CompletionResult<CompletionReply> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            functions: (!tools.is_empty()).then_some(tools),
            function_call: (!tools.is_empty()).then_some("auto"),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json().await?;
        parse_response(body)
    }
}

fn parse_response(body: ChatResponse) -> CompletionResult<CompletionReply> {
    let message = body
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| CompletionError::MalformedResponse("no choices returned".to_string()))?;

    if let Some(call) = message.function_call {
        let arguments = if call.arguments.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&call.arguments).map_err(|err| {
                CompletionError::MalformedResponse(format!(
                    "function_call arguments are not JSON: {err}"
                ))
            })?
        };
        return Ok(CompletionReply::ToolCall(ToolCallRequest {
            name: call.name,
            arguments,
        }));
    }

    message
        .content
        .map(CompletionReply::Message)
        .ok_or_else(|| CompletionError::MalformedResponse("message has no content".to_string()))
}

impl CompletionClient for OpenAiClient {
    fn complete<'a>(
        &'a self,
        messages: &'a [ConversationEntry],
        tools: &'a [ToolDefinition],
    ) -> CompletionFuture<'a, CompletionResult<CompletionReply>> {
        Box::pin(self.post_chat(messages, tools))
    }
}
