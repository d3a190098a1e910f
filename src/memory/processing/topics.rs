//! Topic segmentation: keep only the most recent conversation topics.

use crate::memory::core::config::TopicConfig;
use crate::memory::core::message::Message;
use crate::memory::processing::tokens::{jaccard, token_set};

/// Split an ordered history into topic segments.
///
/// A new segment starts when the word overlap between consecutive messages
/// falls below `threshold`. Messages without meaningful words stay in the
/// current segment.
#[must_use]
pub fn segment(messages: Vec<Message>, threshold: f64) -> Vec<Vec<Message>> {
    let mut segments: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut previous_tokens = None;

    for message in messages {
        let tokens = token_set(&message.content);
        if let Some(previous) = &previous_tokens
            && !tokens.is_empty()
            && jaccard(previous, &tokens) < threshold
            && !current.is_empty()
        {
            segments.push(std::mem::take(&mut current));
        }

        if !tokens.is_empty() {
            previous_tokens = Some(tokens);
        }
        current.push(message);
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Keep the last `max_segments` topic segments, flattened in order.
///
/// Histories shorter than `min_messages` are returned unchanged.
#[must_use]
pub fn select_recent_topics(messages: Vec<Message>, config: &TopicConfig) -> Vec<Message> {
    if messages.len() < config.min_messages {
        return messages;
    }

    let segments = segment(messages, config.continuity_threshold);
    let skip = segments.len().saturating_sub(config.max_segments);
    segments.into_iter().skip(skip).flatten().collect()
}
