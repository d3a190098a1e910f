//! Chronological restoration after score-driven reducers.
//!
//! Only messages that survived pruning are re-ordered: a user message whose
//! assistant reply was pruned is not paired back up. Pairs where both halves
//! survived end up adjacent because ordering is by `sequence_index`.

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::message::{Message, ScoredMessage};

/// Sort ascending by `sequence_index` and unwrap the messages.
///
/// # Errors
/// Returns `MemoryError::Processing` if two inputs share a `sequence_index`.
pub fn restore_flow(mut messages: Vec<ScoredMessage>) -> MemoryResult<Vec<Message>> {
    messages.sort_by_key(|m| m.sequence_index);

    if let Some(pair) = messages
        .windows(2)
        .find(|pair| pair[0].sequence_index == pair[1].sequence_index)
    {
        return Err(MemoryError::Processing(format!(
            "duplicate sequence index {} after pruning",
            pair[0].sequence_index
        )));
    }

    Ok(messages.into_iter().map(|m| m.message).collect())
}
