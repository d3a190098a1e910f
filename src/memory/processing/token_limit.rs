//! Hard size ceiling applied after compaction.
//!
//! Keeps the most recent messages until the estimated token total would
//! exceed the limit. Scores play no part here.

use crate::memory::core::message::Message;

/// Fixed per-message overhead (role markers, separators).
const MESSAGE_OVERHEAD_TOKENS: usize = 4;
/// Rough characters-per-token ratio for English text.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token cost of a message.
#[must_use]
pub fn estimate_tokens(message: &Message) -> usize {
    message.char_len().div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
}

/// Keep the newest messages within `max_tokens` and `max_messages`.
#[must_use]
pub fn limit_tokens(
    mut messages: Vec<Message>,
    max_tokens: usize,
    max_messages: usize,
) -> Vec<Message> {
    let mut total = 0_usize;
    let mut keep = 0_usize;

    for message in messages.iter().rev() {
        let cost = estimate_tokens(message);
        if keep == max_messages || total + cost > max_tokens {
            break;
        }
        total += cost;
        keep += 1;
    }

    let start = messages.len() - keep;
    messages.drain(..start);
    messages
}
