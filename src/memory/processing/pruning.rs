//! Budgeted selection of scored messages.

use std::collections::BTreeSet;

use crate::memory::core::message::ScoredMessage;

/// Sequence indexes of the `count` most recent messages.
#[must_use]
pub fn most_recent_indexes(messages: &[ScoredMessage], count: usize) -> BTreeSet<u64> {
    let mut indexes: Vec<u64> = messages.iter().map(|m| m.sequence_index).collect();
    indexes.sort_unstable_by(|a, b| b.cmp(a));
    indexes.into_iter().take(count).collect()
}

/// Keep at most `budget` messages: `reserved` newest unconditionally, the
/// remaining slots filled by descending score.
///
/// Returns the input unchanged when it already fits. The output is not
/// re-ordered chronologically.
#[must_use]
pub fn prune_to_budget(
    messages: Vec<ScoredMessage>,
    budget: usize,
    reserved: usize,
) -> Vec<ScoredMessage> {
    if messages.len() <= budget {
        return messages;
    }

    let reserved = reserved.min(budget);
    let recent = most_recent_indexes(&messages, reserved);
    let (mut kept, mut rest): (Vec<_>, Vec<_>) = messages
        .into_iter()
        .partition(|m| recent.contains(&m.sequence_index));

    rest.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.sequence_index.cmp(&b.sequence_index))
    });
    // Repeated sequence indexes can put more than `reserved` in `kept`.
    kept.truncate(budget);
    rest.truncate(budget.saturating_sub(kept.len()));
    kept.extend(rest);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::message::{Message, Role};

    fn scored(index: u64, score: f64) -> ScoredMessage {
        ScoredMessage::new(Message::new(Role::User, format!("m{index}"), index), score)
    }

    #[test]
    fn fitting_input_is_returned_unchanged() {
        let input = vec![scored(3, 0.1), scored(1, 0.9)];
        assert_eq!(prune_to_budget(input.clone(), 5, 2), input);
    }

    #[test]
    fn reserves_newest_then_fills_by_score() {
        let input: Vec<ScoredMessage> = (0..12)
            .map(|i| scored(i, if i % 4 == 0 { 5.0 } else { 1.0 }))
            .collect();
        let kept = prune_to_budget(input, 5, 2);
        let mut indexes: Vec<u64> = kept.iter().map(|m| m.sequence_index).collect();
        indexes.sort_unstable();
        // 10, 11 reserved; 0, 4, 8 are the top scorers
        assert_eq!(indexes, vec![0, 4, 8, 10, 11]);
    }

    #[test]
    fn low_scoring_recent_messages_still_survive() {
        let input = vec![scored(0, 9.0), scored(1, 8.0), scored(2, 7.0), scored(3, 0.0)];
        let kept = prune_to_budget(input, 2, 1);
        let indexes: BTreeSet<u64> = kept.iter().map(|m| m.sequence_index).collect();
        assert_eq!(indexes, BTreeSet::from([0, 3]));
    }

    #[test]
    fn score_ties_prefer_earlier_messages() {
        let input = vec![scored(0, 1.0), scored(1, 1.0), scored(2, 1.0)];
        let kept = prune_to_budget(input, 1, 0);
        assert_eq!(kept[0].sequence_index, 0);
    }

    #[test]
    fn repeated_recent_indexes_stay_within_budget() {
        let input: Vec<ScoredMessage> = (0..8)
            .map(|i| scored(if i >= 5 { 5 } else { i }, 1.0))
            .collect();
        let kept = prune_to_budget(input, 2, 2);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|m| m.sequence_index == 5));
    }
}
