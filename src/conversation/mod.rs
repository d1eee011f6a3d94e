//! Per-user conversation state.
//!
//! - `ids`: opaque platform identifiers
//! - `entry`: roles and single conversation entries
//! - `history`: bounded window with a permanent system entry
//! - `store`: process-wide mapping from user to history

pub mod entry;
pub mod history;
pub mod ids;
pub mod store;

pub use entry::{ConversationEntry, Role};
pub use history::{ConversationHistory, DEFAULT_MAX_LEN, MIN_MAX_LEN};
pub use ids::{ReplyToken, UserId};
pub use store::{
    ConversationStore, DEFAULT_SYSTEM_PROMPT, InMemoryConversationStore, SharedHistory,
    StoreFuture,
};
