//! Relay configuration loaded from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::completion::openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::conversation::{DEFAULT_MAX_LEN, DEFAULT_SYSTEM_PROMPT, MIN_MAX_LEN};
use crate::dispatcher::{DEFAULT_CALL_TIMEOUT, DEFAULT_REPLY_SUFFIX, DispatcherConfig};
use crate::line::DEFAULT_LINE_API_BASE_URL;
use crate::server::DEFAULT_PORT;
use crate::tools::weather::DEFAULT_WEATHER_BASE_URL;

/// Extra time HTTP clients get beyond the per-call bound, so the dispatcher's
/// own timeout fires first.
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

/// Reply sent when a turn fails.
pub const DEFAULT_FAILURE_REPLY: &str = "抱歉，目前無法回覆，請稍後再試。";

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// Variable set to an unusable value.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// What was wrong.
        reason: String,
    },
}

/// Convenience result alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Credentials and endpoints for the external services.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// LINE channel access token.
    pub channel_access_token: String,
    /// LINE channel secret, keys the webhook signature.
    pub channel_secret: String,
    /// OpenAI API key.
    pub openai_api_key: String,
    /// OpenWeatherMap API key, required when tools are enabled.
    pub weather_api_key: Option<String>,
}

/// Top-level relay configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Service credentials.
    pub credentials: Credentials,
    /// Offer the weather tool to the model.
    pub tools_enabled: bool,
    /// HTTP listen port.
    pub port: u16,
    /// Chat model name.
    pub openai_model: String,
    /// Completion API base URL.
    pub openai_base_url: String,
    /// Weather API base URL.
    pub weather_base_url: String,
    /// LINE Messaging API base URL.
    pub line_api_base_url: String,
    /// Entries kept per user, system entry included.
    pub history_max_len: usize,
    /// Bound on each external call, in seconds.
    pub call_timeout_secs: u64,
    /// Persona instruction at the head of each history.
    pub system_prompt: String,
    /// Suffix appended to each user message.
    pub reply_suffix: String,
    /// Reply sent when a turn fails.
    pub failure_reply: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            tools_enabled: true,
            port: DEFAULT_PORT,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
            line_api_base_url: DEFAULT_LINE_API_BASE_URL.to_string(),
            history_max_len: DEFAULT_MAX_LEN,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            reply_suffix: DEFAULT_REPLY_SUFFIX.to_string(),
            failure_reply: DEFAULT_FAILURE_REPLY.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns an error if a required key is missing or any value is invalid.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// # Errors
    /// Returns an error if a required key is missing or any value is invalid.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let mut config = Self {
            credentials: Credentials {
                channel_access_token: require("CHANNEL_ACCESS_TOKEN")?,
                channel_secret: require("CHANNEL_SECRET")?,
                openai_api_key: require("OPENAI_API_KEY")?,
                weather_api_key: get("OPENWEATHER_API_KEY"),
            },
            ..Self::default()
        };

        if let Some(value) = get("RELAY_TOOLS_ENABLED") {
            config.tools_enabled = parse_bool("RELAY_TOOLS_ENABLED", &value)?;
        }
        if let Some(value) = get("RELAY_PORT") {
            config.port = parse_number("RELAY_PORT", &value)?;
        }
        if let Some(value) = get("RELAY_OPENAI_MODEL") {
            config.openai_model = value;
        }
        if let Some(value) = get("RELAY_OPENAI_BASE_URL") {
            config.openai_base_url = value;
        }
        if let Some(value) = get("RELAY_WEATHER_BASE_URL") {
            config.weather_base_url = value;
        }
        if let Some(value) = get("RELAY_LINE_API_BASE_URL") {
            config.line_api_base_url = value;
        }
        if let Some(value) = get("RELAY_HISTORY_MAX_LEN") {
            config.history_max_len = parse_number("RELAY_HISTORY_MAX_LEN", &value)?;
        }
        if let Some(value) = get("RELAY_CALL_TIMEOUT_SECS") {
            config.call_timeout_secs = parse_number("RELAY_CALL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("RELAY_SYSTEM_PROMPT") {
            config.system_prompt = value;
        }
        if let Some(value) = lookup("RELAY_REPLY_SUFFIX") {
            config.reply_suffix = value;
        }
        if let Some(value) = get("RELAY_FAILURE_REPLY") {
            config.failure_reply = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("CHANNEL_ACCESS_TOKEN", &self.credentials.channel_access_token),
            ("CHANNEL_SECRET", &self.credentials.channel_secret),
            ("OPENAI_API_KEY", &self.credentials.openai_api_key),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        if self.tools_enabled && self.credentials.weather_api_key.is_none() {
            return Err(ConfigError::Missing("OPENWEATHER_API_KEY"));
        }

        if self.history_max_len < MIN_MAX_LEN {
            return Err(ConfigError::Invalid {
                key: "RELAY_HISTORY_MAX_LEN",
                reason: format!("must be >= {MIN_MAX_LEN}"),
            });
        }

        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RELAY_CALL_TIMEOUT_SECS",
                reason: "must be > 0".to_string(),
            });
        }

        for (key, value) in [
            ("RELAY_OPENAI_BASE_URL", &self.openai_base_url),
            ("RELAY_WEATHER_BASE_URL", &self.weather_base_url),
            ("RELAY_LINE_API_BASE_URL", &self.line_api_base_url),
        ] {
            Url::parse(value).map_err(|err| ConfigError::Invalid {
                key,
                reason: err.to_string(),
            })?;
        }

        Ok(())
    }

    /// Bound on each external call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Request timeout for the HTTP clients, slightly above [`Self::call_timeout`].
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.call_timeout() + HTTP_TIMEOUT_MARGIN
    }

    /// Dispatcher settings derived from this configuration.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            reply_suffix: self.reply_suffix.clone(),
            call_timeout: self.call_timeout(),
        }
    }

    /// Set the listen port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable the weather tool.
    #[must_use]
    pub const fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }
}

fn parse_bool(key: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
    })
}
