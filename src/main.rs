//! Binary entrypoint that launches the LINE relay server.

use std::process::ExitCode;

use linebot_relay::start_relay;

/// Load configuration from the environment and serve the webhook.
fn main() -> ExitCode {
    start_relay::run()
}
