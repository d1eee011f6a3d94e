//! Current-weather lookup against the OpenWeatherMap API.
//!
//! Requires an API key from https://openweathermap.org/api

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tools::error::{ToolError, ToolResult};
use crate::tools::{ToolBox, ToolCall, ToolDefinition, ToolFuture, TemperatureUnit, WeatherArgs};

/// OpenWeatherMap API base URL.
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Connection timeout for weather requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Flat weather result appended to the conversation as a tool entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Location as resolved by the weather service.
    pub location: String,
    /// Current temperature in `units`.
    pub temperature: f64,
    /// Short condition text, e.g. "light rain".
    pub description: String,
    /// "celsius" or "fahrenheit".
    pub units: String,
}

/// HTTP client for the weather API.
#[derive(Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WeatherClient {
    /// Create a client for the given base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> ToolResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Fetch the current weather for a location.
    ///
    /// # Errors
    /// Returns an error if the location is unknown, the request fails, or the
    /// response lacks the expected fields.
    pub async fn current(&self, args: &WeatherArgs) -> ToolResult<WeatherReport> {
        let url = self.build_url(args)?;
        debug!("Fetching weather for {}", args.location);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ToolError::LocationNotFound(args.location.clone()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: CurrentWeatherResponse = response.json().await?;
        parse_response(body, args)
    }

    /// Build the API URL with query parameters.
    fn build_url(&self, args: &WeatherArgs) -> ToolResult<url::Url> {
        let mut url = url::Url::parse(&format!(
            "{}/weather",
            self.base_url.trim_end_matches('/')
        ))?;

        url.query_pairs_mut()
            .append_pair("q", &args.location)
            .append_pair("units", api_units(args.unit))
            .append_pair("appid", &self.api_key);

        Ok(url)
    }
}

/// Unit system name understood by the API.
const fn api_units(unit: TemperatureUnit) -> &'static str {
    match unit {
        TemperatureUnit::Celsius => "metric",
        TemperatureUnit::Fahrenheit => "imperial",
    }
}

fn parse_response(body: CurrentWeatherResponse, args: &WeatherArgs) -> ToolResult<WeatherReport> {
    let description = body
        .weather
        .into_iter()
        .next()
        .map(|w| w.description)
        .ok_or_else(|| ToolError::MalformedResponse("missing weather conditions".to_string()))?;

    let location = body
        .name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| args.location.clone());

    Ok(WeatherReport {
        location,
        temperature: body.main.temp,
        description,
        units: args.unit.as_str().to_string(),
    })
}

/// The weather lookup exposed as a [`ToolBox`].
#[derive(Clone)]
pub struct WeatherTool {
    client: WeatherClient,
}

impl WeatherTool {
    /// Wrap a weather client.
    #[must_use]
    pub const fn new(client: WeatherClient) -> Self {
        Self { client }
    }
}

impl ToolBox for WeatherTool {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![super::weather_definition()]
    }

    fn invoke(&self, call: ToolCall) -> ToolFuture<'_, ToolResult<serde_json::Value>> {
        Box::pin(async move {
            match call {
                ToolCall::GetCurrentWeather(args) => {
                    let report = self.client.current(&args).await?;
                    serde_json::to_value(report)
                        .map_err(|err| ToolError::MalformedResponse(err.to_string()))
                }
            }
        })
    }
}

// OpenWeatherMap response structures

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    name: Option<String>,
    main: MainReadings,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}
