//! HTTP route handlers for the relay.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, error, warn};

use crate::dispatcher::DispatchError;
use crate::line::{InboundEvent, SIGNATURE_HEADER, parse_events, signature};

use super::state::AppState;

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/callback", post(callback))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "linebot-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// LINE webhook endpoint.
///
/// Answers as soon as the body is verified and parsed. Events are then handled
/// in delivery order on a background task.
async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, (StatusCode, String)> {
    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if signature::verify(&state.channel_secret, &body, signature_header).is_err() {
        warn!(
            "Webhook signature verification failed (signature: {})",
            if signature_header.is_empty() { "missing" } else { "invalid" }
        );
        return Err((StatusCode::BAD_REQUEST, "Invalid signature".to_string()));
    }

    let events = parse_events(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid payload: {e}")))?;

    if !events.is_empty() {
        tokio::spawn(async move {
            for event in events {
                handle_event(&state, event).await;
            }
        });
    }

    Ok("OK")
}

async fn handle_event(state: &AppState, event: InboundEvent) {
    match event {
        InboundEvent::Text {
            user_id,
            reply_token,
            text,
        } => {
            let reply = match state.dispatcher.handle(&user_id, &text).await {
                Ok(reply) => reply,
                Err(DispatchError::EmptyMessage) => {
                    debug!("Ignoring empty message from {}", user_id);
                    return;
                }
                Err(_) => state.failure_reply.clone(),
            };

            if let Err(e) = state.replier.reply(&reply_token, &reply).await {
                error!("Failed to reply to {}: {}", user_id, e);
            }
        }
        InboundEvent::Image { user_id, .. } => {
            debug!("Ignoring image message from {}", user_id);
        }
        InboundEvent::Other { kind } => {
            debug!("Ignoring {} event", kind);
        }
    }
}
