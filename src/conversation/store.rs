//! Process-wide conversation store keyed by user identity.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::conversation::entry::ConversationEntry;
use crate::conversation::history::{ConversationHistory, DEFAULT_MAX_LEN};
use crate::conversation::ids::UserId;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handle to one user's history.
///
/// Holding the lock serializes every read-modify-write for that user.
pub type SharedHistory = Arc<Mutex<ConversationHistory>>;

/// Default persona instruction seeded into every new history.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是人工智能助理";

/// Storage abstraction for per-user conversation histories.
pub trait ConversationStore: Send + Sync {
    /// Return the user's history handle, creating it on first sight.
    ///
    /// Repeated calls for the same user return the same handle.
    fn get_or_create(&self, user_id: &UserId) -> StoreFuture<'_, SharedHistory>;

    /// Append an entry to the user's history and apply the eviction policy.
    fn append(&self, user_id: &UserId, entry: ConversationEntry) -> StoreFuture<'_, ()>;

    /// Copy of the user's current entries, or `None` for an unknown user.
    fn snapshot(&self, user_id: &UserId) -> StoreFuture<'_, Option<Vec<ConversationEntry>>>;

    /// Number of users with a history.
    fn user_count(&self) -> usize;
}

/// In-memory store. Histories live until the process exits.
pub struct InMemoryConversationStore {
    histories: DashMap<UserId, SharedHistory>,
    system_prompt: String,
    max_len: usize,
}

impl InMemoryConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, max_len: usize) -> Self {
        Self {
            histories: DashMap::new(),
            system_prompt: system_prompt.into(),
            max_len,
        }
    }

    fn handle(&self, user_id: &UserId) -> SharedHistory {
        if let Some(existing) = self.histories.get(user_id) {
            return Arc::clone(existing.value());
        }

        // `entry` holds the shard lock, so two racing first messages still
        // end up sharing one history.
        let handle = self.histories.entry(user_id.clone()).or_insert_with(|| {
            debug!("Creating conversation history for user {}", user_id);
            Arc::new(Mutex::new(ConversationHistory::new(
                self.system_prompt.clone(),
                self.max_len,
            )))
        });
        Arc::clone(handle.value())
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT, DEFAULT_MAX_LEN)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get_or_create(&self, user_id: &UserId) -> StoreFuture<'_, SharedHistory> {
        let handle = self.handle(user_id);
        Box::pin(async move { handle })
    }

    fn append(&self, user_id: &UserId, entry: ConversationEntry) -> StoreFuture<'_, ()> {
        let handle = self.handle(user_id);
        let user_id = user_id.clone();
        Box::pin(async move {
            let mut history = handle.lock().await;
            let evicted = history.push(entry);
            if !evicted.is_empty() {
                debug!(
                    "Evicted {} entries for user {} (window {})",
                    evicted.len(),
                    user_id,
                    history.max_len()
                );
            }
        })
    }

    fn snapshot(&self, user_id: &UserId) -> StoreFuture<'_, Option<Vec<ConversationEntry>>> {
        let handle = self.histories.get(user_id).map(|h| Arc::clone(h.value()));
        Box::pin(async move {
            match handle {
                Some(handle) => Some(handle.lock().await.entries().to_vec()),
                None => None,
            }
        })
    }

    fn user_count(&self) -> usize {
        self.histories.len()
    }
}
