//! LINE Messaging API transport.
//!
//! - `signature`: `X-Line-Signature` verification
//! - `event`: webhook envelope parsing into [`InboundEvent`]
//! - `reply`: reply-token based answers

pub mod error;
pub mod event;
pub mod reply;
pub mod signature;

pub use error::{LineError, LineResult};
pub use event::{InboundEvent, parse_events};
pub use reply::{DEFAULT_LINE_API_BASE_URL, LineReplyClient, ReplyFuture, ReplySender};
pub use signature::SIGNATURE_HEADER;
