//! Webhook event envelope parsing.
//!
//! Every event in the envelope becomes an [`InboundEvent`]. Unknown event or
//! message types are kept as [`InboundEvent::Other`] instead of failing the
//! whole delivery.

use serde::Deserialize;

use crate::conversation::{ReplyToken, UserId};
use crate::line::error::LineResult;

/// A webhook event, reduced to what the relay acts on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InboundEvent {
    /// Text message from a user; the only event that reaches the dispatcher.
    Text {
        /// Sender.
        user_id: UserId,
        /// Token for answering this event.
        reply_token: ReplyToken,
        /// Message text.
        text: String,
    },
    /// Image message from a user.
    Image {
        /// Sender.
        user_id: UserId,
        /// Token for answering this event.
        reply_token: ReplyToken,
        /// Platform message id of the image.
        message_id: String,
    },
    /// Anything else (follow, sticker, group without user id, ...).
    Other {
        /// Event type, with the message type appended for message events.
        kind: String,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    reply_token: Option<String>,
    source: Option<RawSource>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: String,
    text: Option<String>,
}

/// Parse a webhook body into events, preserving delivery order.
///
/// # Errors
/// Returns an error if the body is not a JSON event envelope.
pub fn parse_events(body: &[u8]) -> LineResult<Vec<InboundEvent>> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    Ok(envelope.events.into_iter().map(classify).collect())
}

fn classify(event: RawEvent) -> InboundEvent {
    let RawEvent {
        kind,
        reply_token,
        source,
        message,
    } = event;

    let Some(message) = message.filter(|_| kind == "message") else {
        return InboundEvent::Other { kind };
    };
    let user_id = source.and_then(|s| s.user_id);

    match (message.kind.as_str(), user_id, reply_token) {
        ("text", Some(user_id), Some(reply_token)) => InboundEvent::Text {
            user_id: UserId::from(user_id),
            reply_token: ReplyToken::from(reply_token),
            text: message.text.unwrap_or_default(),
        },
        ("image", Some(user_id), Some(reply_token)) => InboundEvent::Image {
            user_id: UserId::from(user_id),
            reply_token: ReplyToken::from(reply_token),
            message_id: message.id,
        },
        (other, _, _) => InboundEvent::Other {
            kind: format!("message:{other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"{
        "destination": "Uxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
        "events": [
            {
                "type": "message",
                "mode": "active",
                "timestamp": 1462629479859,
                "webhookEventId": "01FZ74A0TDDPYRVKNK77XKC3ZR",
                "deliveryContext": {"isRedelivery": false},
                "replyToken": "nHuyWiB7yP5Zw52FIkcQobQuGDXCTA",
                "source": {"type": "user", "userId": "U4af4980629"},
                "message": {"id": "325708", "type": "text", "text": "Hello, world"}
            },
            {
                "type": "message",
                "replyToken": "r2",
                "source": {"type": "user", "userId": "U4af4980629"},
                "message": {"id": "325709", "type": "image", "contentProvider": {"type": "line"}}
            },
            {
                "type": "message",
                "replyToken": "r3",
                "source": {"type": "user", "userId": "U4af4980629"},
                "message": {"id": "325710", "type": "sticker", "packageId": "1", "stickerId": "1"}
            },
            {
                "type": "follow",
                "replyToken": "r4",
                "source": {"type": "user", "userId": "U4af4980629"}
            },
            {
                "type": "message",
                "replyToken": "r5",
                "source": {"type": "group", "groupId": "Ca56f94637c"},
                "message": {"id": "325711", "type": "text", "text": "no user id"}
            }
        ]
    }"#;

    #[test]
    fn test_parse_events_classifies_each_event() {
        let events = parse_events(ENVELOPE.as_bytes()).unwrap_or_default();
        assert_eq!(
            events,
            vec![
                InboundEvent::Text {
                    user_id: UserId::from("U4af4980629"),
                    reply_token: ReplyToken::from("nHuyWiB7yP5Zw52FIkcQobQuGDXCTA"),
                    text: "Hello, world".to_string(),
                },
                InboundEvent::Image {
                    user_id: UserId::from("U4af4980629"),
                    reply_token: ReplyToken::from("r2"),
                    message_id: "325709".to_string(),
                },
                InboundEvent::Other {
                    kind: "message:sticker".to_string(),
                },
                InboundEvent::Other {
                    kind: "follow".to_string(),
                },
                InboundEvent::Other {
                    kind: "message:text".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_verification_ping_has_no_events() {
        let events = parse_events(br#"{"destination":"U0","events":[]}"#).ok();
        assert_eq!(events, Some(Vec::new()));
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        assert!(parse_events(b"not json").is_err());
        assert!(parse_events(br#"{"events": "nope"}"#).is_err());
    }
}
