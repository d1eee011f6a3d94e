//! Reply delivery through the LINE Messaging API.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::conversation::ReplyToken;
use crate::line::error::{LineError, LineResult};

/// Boxed future type for reply operations.
pub type ReplyFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default Messaging API base URL.
pub const DEFAULT_LINE_API_BASE_URL: &str = "https://api.line.me";

/// Longest text LINE accepts in one text message.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Connection timeout for reply requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends a reply for a received event.
pub trait ReplySender: Send + Sync {
    /// Reply to the event identified by `reply_token` with `text`.
    ///
    /// # Errors
    /// Returns an error if the platform rejects the reply.
    fn reply<'a>(&'a self, reply_token: &'a ReplyToken, text: &'a str)
    -> ReplyFuture<'a, LineResult<()>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// Cut `text` to at most [`MAX_TEXT_CHARS`] characters.
#[must_use]
pub fn truncate_for_line(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Messaging API reply client.
#[derive(Clone)]
pub struct LineReplyClient {
    client: reqwest::Client,
    base_url: String,
    channel_access_token: String,
}

impl LineReplyClient {
    /// Create a reply client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        channel_access_token: impl Into<String>,
        timeout: Duration,
    ) -> LineResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            channel_access_token: channel_access_token.into(),
        })
    }

    async fn post_reply(&self, reply_token: &ReplyToken, text: &str) -> LineResult<()> {
        let request = ReplyRequest {
            reply_token: reply_token.as_str(),
            messages: [TextMessage {
                kind: "text",
                text: truncate_for_line(text),
            }],
        };

        let url = format!(
            "{}/v2/bot/message/reply",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.channel_access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Reply delivered ({} chars)", request.messages[0].text.chars().count());
        Ok(())
    }
}

impl ReplySender for LineReplyClient {
    fn reply<'a>(
        &'a self,
        reply_token: &'a ReplyToken,
        text: &'a str,
    ) -> ReplyFuture<'a, LineResult<()>> {
        Box::pin(self.post_reply(reply_token, text))
    }
}
