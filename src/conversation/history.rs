//! Bounded per-user conversation window.

use crate::conversation::entry::ConversationEntry;

/// Default maximum number of entries kept per user, system entry included.
pub const DEFAULT_MAX_LEN: usize = 4;

/// Smallest usable window: the system entry, a user message and the tool
/// result answering it, so a tool turn never evicts its own question.
pub const MIN_MAX_LEN: usize = 3;

/// Ordered history for one user.
///
/// The first entry is the system instruction. It is inserted once by
/// [`ConversationHistory::new`] and never evicted. Once the window is full,
/// every push drops the oldest entry after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationHistory {
    entries: Vec<ConversationEntry>,
    max_len: usize,
}

impl ConversationHistory {
    /// Create a history seeded with the system instruction.
    ///
    /// `max_len` is raised to [`MIN_MAX_LEN`] if smaller.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, max_len: usize) -> Self {
        Self {
            entries: vec![ConversationEntry::system(system_prompt)],
            max_len: max_len.max(MIN_MAX_LEN),
        }
    }

    /// Append an entry, then evict the oldest non-system entries until the
    /// window bound holds. Returns whatever was evicted, oldest first.
    pub fn push(&mut self, entry: ConversationEntry) -> Vec<ConversationEntry> {
        self.entries.push(entry);

        let overflow = self.entries.len().saturating_sub(self.max_len);
        if overflow == 0 {
            return Vec::new();
        }
        self.entries.drain(1..=overflow).collect()
    }

    /// All entries, system instruction first.
    #[must_use]
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// Number of entries, system instruction included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a history holds at least its system entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Window bound.
    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }
}
