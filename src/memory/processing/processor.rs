//! Processor strategies composed by the compaction pipeline.

use std::collections::HashSet;

use tracing::debug;

use crate::memory::core::config::{
    CompactionConfig, TokenLimitConfig, ToolFilterConfig, TopicConfig,
};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::message::Message;
use crate::memory::processing::flow::restore_flow;
use crate::memory::processing::importance::ImportanceScorer;
use crate::memory::processing::pruning::{most_recent_indexes, prune_to_budget};
use crate::memory::processing::redundancy::filter_redundant;
use crate::memory::processing::token_limit::limit_tokens;
use crate::memory::processing::tool_filter::filter_tool_messages;
use crate::memory::processing::topics::select_recent_topics;

/// One reducer step over an ordered message history.
pub trait Processor: Send + Sync {
    /// Short stable name used in logs.
    fn name(&self) -> &'static str;

    /// Reduce the history.
    ///
    /// # Errors
    /// Returns an error on internal failure; callers fall back to recency.
    fn process(&self, messages: Vec<Message>) -> MemoryResult<Vec<Message>>;
}

/// Score, de-duplicate, prune and re-order a history to fit a message budget.
#[derive(Clone, Debug)]
pub struct ImportanceCompactor {
    scorer: ImportanceScorer,
    max_messages: usize,
    reserved: usize,
    similarity_threshold: f64,
}

impl ImportanceCompactor {
    /// Build the compactor from compaction settings.
    ///
    /// # Errors
    /// Returns an error if the scorer cannot be built.
    pub fn new(config: &CompactionConfig) -> MemoryResult<Self> {
        Ok(Self {
            scorer: ImportanceScorer::new(config)?,
            max_messages: config.max_messages,
            reserved: config.reserved_slots(),
            similarity_threshold: config.similarity_threshold,
        })
    }
}

impl Processor for ImportanceCompactor {
    fn name(&self) -> &'static str {
        "importance"
    }

    fn process(&self, messages: Vec<Message>) -> MemoryResult<Vec<Message>> {
        if messages.len() <= self.max_messages {
            return Ok(messages);
        }

        let mut seen = HashSet::with_capacity(messages.len());
        if let Some(repeated) = messages.iter().find(|m| !seen.insert(m.sequence_index)) {
            return Err(MemoryError::Processing(format!(
                "duplicate sequence_index {}",
                repeated.sequence_index
            )));
        }

        let input_len = messages.len();
        let scored = self.scorer.score(&messages)?;
        let protected = most_recent_indexes(&scored, self.reserved);
        let deduped = filter_redundant(scored, self.similarity_threshold, &protected);
        let deduped_len = deduped.len();
        let pruned = prune_to_budget(deduped, self.max_messages, self.reserved);
        let restored = restore_flow(pruned)?;

        debug!(
            input = input_len,
            deduped = deduped_len,
            output = restored.len(),
            reserved = self.reserved,
            "Importance compaction finished"
        );

        Ok(restored)
    }
}

/// Keep only the most recent topic segments.
#[derive(Clone, Debug)]
pub struct TopicSegmenter {
    config: TopicConfig,
}

impl TopicSegmenter {
    /// Build the segmenter.
    #[must_use]
    pub const fn new(config: TopicConfig) -> Self {
        Self { config }
    }
}

impl Processor for TopicSegmenter {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn process(&self, messages: Vec<Message>) -> MemoryResult<Vec<Message>> {
        Ok(select_recent_topics(messages, &self.config))
    }
}

/// Drop tool call traffic.
#[derive(Clone, Debug)]
pub struct ToolCallFilter {
    config: ToolFilterConfig,
}

impl ToolCallFilter {
    /// Build the filter.
    #[must_use]
    pub const fn new(config: ToolFilterConfig) -> Self {
        Self { config }
    }
}

impl Processor for ToolCallFilter {
    fn name(&self) -> &'static str {
        "tool_filter"
    }

    fn process(&self, messages: Vec<Message>) -> MemoryResult<Vec<Message>> {
        Ok(filter_tool_messages(messages, &self.config))
    }
}

/// Hard token and message ceiling, newest first.
#[derive(Clone, Debug)]
pub struct TokenLimiter {
    max_tokens: usize,
    max_messages: usize,
}

impl TokenLimiter {
    /// Build the limiter.
    #[must_use]
    pub const fn new(config: &TokenLimitConfig, max_messages: usize) -> Self {
        Self {
            max_tokens: config.max_tokens,
            max_messages,
        }
    }
}

impl Processor for TokenLimiter {
    fn name(&self) -> &'static str {
        "token_limit"
    }

    fn process(&self, messages: Vec<Message>) -> MemoryResult<Vec<Message>> {
        Ok(limit_tokens(messages, self.max_tokens, self.max_messages))
    }
}
