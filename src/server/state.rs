//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::completion::OpenAiClient;
use crate::config::RelayConfig;
use crate::conversation::{ConversationStore, InMemoryConversationStore};
use crate::dispatcher::CompletionDispatcher;
use crate::line::{LineReplyClient, ReplySender};
use crate::tools::{ToolBox, WeatherClient, WeatherTool};

/// Shared application state.
pub struct AppState {
    /// Turn orchestration for text messages.
    pub dispatcher: CompletionDispatcher,
    /// Reply delivery back to the platform.
    pub replier: Arc<dyn ReplySender>,
    /// Secret keying the webhook signature.
    pub channel_secret: String,
    /// Reply sent when a turn fails.
    pub failure_reply: String,
}

impl AppState {
    /// Create application state with live service clients.
    ///
    /// # Errors
    /// Returns an error if any HTTP client cannot be created.
    pub fn new(config: &RelayConfig) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let timeout = config.http_timeout();

        let completion = OpenAiClient::new(
            config.openai_base_url.as_str(),
            config.credentials.openai_api_key.as_str(),
            config.openai_model.as_str(),
            timeout,
        )
        .map_err(|e| format!("Failed to create completion client: {e}"))?;

        let tools = match (&config.credentials.weather_api_key, config.tools_enabled) {
            (Some(key), true) => {
                let client =
                    WeatherClient::new(config.weather_base_url.as_str(), key.as_str(), timeout)
                        .map_err(|e| format!("Failed to create weather client: {e}"))?;
                let tool: Arc<dyn ToolBox> = Arc::new(WeatherTool::new(client));
                Some(tool)
            }
            _ => None,
        };

        let replier = LineReplyClient::new(
            config.line_api_base_url.as_str(),
            config.credentials.channel_access_token.as_str(),
            timeout,
        )
        .map_err(|e| format!("Failed to create reply client: {e}"))?;

        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new(
            config.system_prompt.as_str(),
            config.history_max_len,
        ));
        let dispatcher = CompletionDispatcher::new(
            store,
            Arc::new(completion),
            tools,
            config.dispatcher_config(),
        );

        Ok(Self::from_parts(
            dispatcher,
            Arc::new(replier),
            config.credentials.channel_secret.as_str(),
            config.failure_reply.as_str(),
        ))
    }

    /// Assemble state from already-built parts.
    #[must_use]
    pub fn from_parts(
        dispatcher: CompletionDispatcher,
        replier: Arc<dyn ReplySender>,
        channel_secret: impl Into<String>,
        failure_reply: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            replier,
            channel_secret: channel_secret.into(),
            failure_reply: failure_reply.into(),
        })
    }
}
