//! Tools the completion model may call.
//!
//! The set is closed: a model request is validated into a [`ToolCall`]
//! before anything runs. Only the weather lookup exists today.

pub mod error;
pub mod weather;

pub use error::{ToolError, ToolResult};
pub use weather::{WeatherClient, WeatherReport, WeatherTool};

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future type for tool invocations.
pub type ToolFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Name under which the weather tool is declared to the model.
pub const GET_CURRENT_WEATHER: &str = "get_current_weather";

/// Tool declaration sent to the completion API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Function name.
    pub name: String,
    /// Natural-language description for the model.
    pub description: String,
    /// JSON schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Raw tool-call directive as returned by the completion API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Requested function name.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: serde_json::Value,
}

/// Temperature unit accepted by the weather tool.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    /// Degrees Celsius.
    #[default]
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
}

impl TemperatureUnit {
    /// Stable string form, as declared in the schema.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Celsius => "celsius",
            Self::Fahrenheit => "fahrenheit",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated arguments for [`GET_CURRENT_WEATHER`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WeatherArgs {
    /// City name, e.g. "Tokyo".
    pub location: String,
    /// Unit for the reported temperature.
    #[serde(default)]
    pub unit: TemperatureUnit,
}

/// A tool call that passed validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ToolCall {
    /// Look up current weather for a location.
    GetCurrentWeather(WeatherArgs),
}

impl ToolCall {
    /// Validate a raw directive against the declared tools.
    ///
    /// # Errors
    /// Returns [`ToolError::UnknownTool`] for undeclared names and
    /// [`ToolError::InvalidArguments`] when the arguments do not fit the schema.
    pub fn parse(request: &ToolCallRequest) -> ToolResult<Self> {
        match request.name.as_str() {
            GET_CURRENT_WEATHER => {
                let args: WeatherArgs = serde_json::from_value(request.arguments.clone())
                    .map_err(|err| ToolError::InvalidArguments {
                        tool: request.name.clone(),
                        reason: err.to_string(),
                    })?;
                if args.location.trim().is_empty() {
                    return Err(ToolError::InvalidArguments {
                        tool: request.name.clone(),
                        reason: "location must not be empty".to_string(),
                    });
                }
                Ok(Self::GetCurrentWeather(args))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Declared name of the called tool.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetCurrentWeather(_) => GET_CURRENT_WEATHER,
        }
    }
}

/// Declaration of the weather tool.
#[must_use]
pub fn weather_definition() -> ToolDefinition {
    ToolDefinition {
        name: GET_CURRENT_WEATHER.to_string(),
        description: "Get the current weather in a given location".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city name, e.g. Tokyo or San Francisco"
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"]
                }
            },
            "required": ["location"]
        }),
    }
}

/// A set of tools the dispatcher can offer to the model.
pub trait ToolBox: Send + Sync {
    /// Declarations to send with each completion request.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run a validated call and return its JSON result.
    ///
    /// # Errors
    /// Returns an error if the underlying service call fails.
    fn invoke(&self, call: ToolCall) -> ToolFuture<'_, ToolResult<serde_json::Value>>;
}
