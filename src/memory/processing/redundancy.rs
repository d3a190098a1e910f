//! Near-duplicate removal using token-set Jaccard similarity.

use std::collections::{BTreeSet, HashSet};

use crate::memory::core::message::ScoredMessage;
use crate::memory::processing::tokens::{jaccard, token_set};

/// Remove near-duplicates, processing in the given order.
///
/// A candidate is rejected when its similarity to an already accepted
/// message exceeds `threshold` and that message scores at least as high.
/// Messages whose `sequence_index` is in `protected` are always accepted.
#[must_use]
pub fn filter_redundant(
    messages: Vec<ScoredMessage>,
    threshold: f64,
    protected: &BTreeSet<u64>,
) -> Vec<ScoredMessage> {
    let mut accepted: Vec<(ScoredMessage, HashSet<String>)> = Vec::with_capacity(messages.len());

    for candidate in messages {
        let tokens = token_set(&candidate.message.content);
        let redundant = !protected.contains(&candidate.sequence_index)
            && accepted.iter().any(|(existing, existing_tokens)| {
                existing.score >= candidate.score && jaccard(&tokens, existing_tokens) > threshold
            });

        if !redundant {
            accepted.push((candidate, tokens));
        }
    }

    accepted.into_iter().map(|(message, _)| message).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::message::{Message, Role};

    fn scored(content: &str, index: u64, score: f64) -> ScoredMessage {
        ScoredMessage::new(Message::new(Role::User, content, index), score)
    }

    const BASE: &str = "please restart the staging build server before the nightly release run";
    // Ten of the eleven distinct tokens shared: similarity 10/11 ~ 0.909.
    const NEAR: &str = "please restart the staging build server before the nightly release job run";

    #[test]
    fn later_duplicate_with_equal_score_is_dropped() {
        let kept = filter_redundant(
            vec![scored(BASE, 0, 1.0), scored(NEAR, 1, 1.0)],
            0.85,
            &BTreeSet::new(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sequence_index, 0);
    }

    #[test]
    fn higher_scored_duplicate_survives() {
        let kept = filter_redundant(
            vec![scored(BASE, 0, 1.0), scored(NEAR, 1, 1.5)],
            0.85,
            &BTreeSet::new(),
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn protected_messages_are_never_dropped() {
        let protected = BTreeSet::from([1]);
        let kept = filter_redundant(
            vec![scored(BASE, 0, 2.0), scored(BASE, 1, 1.0)],
            0.85,
            &protected,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn distinct_messages_pass_through_in_order() {
        let kept = filter_redundant(
            vec![
                scored("deploy pipeline failing on step three", 0, 1.0),
                scored("lunch order for the team offsite", 1, 1.0),
            ],
            0.85,
            &BTreeSet::new(),
        );
        let order: Vec<u64> = kept.iter().map(|m| m.sequence_index).collect();
        assert_eq!(order, vec![0, 1]);
    }
}
