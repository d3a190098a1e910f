//! Thread-scoped message persistence.

use std::collections::BTreeSet;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::ids::ThreadId;
use crate::memory::core::message::{Message, NewMessage};
use crate::memory::core::thread::Thread;
use crate::memory::storage::StoreFuture;

/// A window of neighbours around one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncludeRange {
    /// Anchor message position.
    pub sequence_index: u64,
    /// Messages to include before the anchor.
    pub before: usize,
    /// Messages to include after the anchor.
    pub after: usize,
}

/// Which messages a query returns.
///
/// An empty selection (no `last`, no `include`) returns the whole thread.
/// Otherwise the result is the union of the last `last` messages and every
/// include window, de-duplicated and in chronological order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectBy {
    /// Number of most recent messages to include.
    pub last: Option<usize>,
    /// Context windows around specific messages.
    pub include: Vec<IncludeRange>,
}

impl SelectBy {
    /// Select the whole thread.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Select the `count` most recent messages.
    #[must_use]
    pub fn last(count: usize) -> Self {
        Self {
            last: Some(count),
            include: Vec::new(),
        }
    }

    /// Select context windows around the given positions.
    #[must_use]
    pub fn around(indexes: impl IntoIterator<Item = u64>, before: usize, after: usize) -> Self {
        Self {
            last: None,
            include: indexes
                .into_iter()
                .map(|sequence_index| IncludeRange {
                    sequence_index,
                    before,
                    after,
                })
                .collect(),
        }
    }

    /// Whether this selection returns every message.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.last.is_none() && self.include.is_empty()
    }

    /// Apply the selection to a chronologically ordered history.
    ///
    /// Include anchors that do not exist are ignored.
    #[must_use]
    pub fn apply(&self, history: &[Message]) -> Vec<Message> {
        if self.is_all() {
            return history.to_vec();
        }

        let mut positions = BTreeSet::new();
        if let Some(last) = self.last {
            positions.extend(history.len().saturating_sub(last)..history.len());
        }
        for range in &self.include {
            let Ok(anchor) =
                history.binary_search_by_key(&range.sequence_index, |m| m.sequence_index)
            else {
                continue;
            };
            let start = anchor.saturating_sub(range.before);
            let end = anchor.saturating_add(range.after).min(history.len() - 1);
            positions.extend(start..=end);
        }

        positions
            .into_iter()
            .map(|position| history[position].clone())
            .collect()
    }
}

/// Thread and message storage.
///
/// Reads of an unknown thread return empty results; writes to an unknown
/// thread fail with `THREAD_NOT_FOUND`.
pub trait MessageStore: Send + Sync {
    /// Persist a new thread.
    fn create_thread(&self, thread: Thread) -> StoreFuture<'_, MemoryResult<Thread>>;

    /// Fetch a thread by id.
    fn get_thread(&self, thread_id: ThreadId) -> StoreFuture<'_, MemoryResult<Option<Thread>>>;

    /// Append messages, assigning consecutive sequence indexes.
    fn append_messages(
        &self,
        thread_id: ThreadId,
        messages: Vec<NewMessage>,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>>;

    /// Read messages from a thread in chronological order.
    fn query(
        &self,
        thread_id: ThreadId,
        select_by: SelectBy,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>>;
}
