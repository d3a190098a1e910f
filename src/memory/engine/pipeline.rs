//! Compaction orchestration.
//!
//! Runs an explicit, ordered list of processors. A failing stage never
//! aborts the run: its input is replaced by the most recent `max_messages`
//! messages and the next stage continues from there.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::memory::core::config::CompactionConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::message::Message;
use crate::memory::processing::processor::{
    ImportanceCompactor, Processor, TokenLimiter, ToolCallFilter, TopicSegmenter,
};

/// Compact a history with the importance path (score, dedupe, prune, reorder).
///
/// Returns the input untouched when it already fits `max_messages`.
///
/// # Errors
/// Returns an error only if the configuration is invalid.
pub fn compact(messages: Vec<Message>, config: &CompactionConfig) -> MemoryResult<Vec<Message>> {
    config.validate()?;
    if messages.len() <= config.max_messages {
        return Ok(messages);
    }

    let compactor = ImportanceCompactor::new(config)?;
    Ok(run_stage(&compactor, messages, config.max_messages))
}

/// The full ordered processing chain with its final hard ceiling.
pub struct CompactionPipeline {
    processors: Vec<Box<dyn Processor>>,
    limiter: TokenLimiter,
    max_messages: usize,
}

impl CompactionPipeline {
    /// Build the default chain: tool filter, topic segmenter (both when
    /// enabled), importance compactor, then the token limiter.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &CompactionConfig) -> MemoryResult<Self> {
        config.validate()?;

        let mut processors: Vec<Box<dyn Processor>> = Vec::new();
        if config.tool_filter.enabled {
            processors.push(Box::new(ToolCallFilter::new(config.tool_filter.clone())));
        }
        if config.topic.enabled {
            processors.push(Box::new(TopicSegmenter::new(config.topic.clone())));
        }
        processors.push(Box::new(ImportanceCompactor::new(config)?));

        Ok(Self {
            processors,
            limiter: TokenLimiter::new(&config.token_limit, config.max_messages),
            max_messages: config.max_messages,
        })
    }

    /// Build a chain from explicit processors.
    ///
    /// # Errors
    /// Returns an error if `max_messages` is zero.
    pub fn with_processors(
        processors: Vec<Box<dyn Processor>>,
        limiter: TokenLimiter,
        max_messages: usize,
    ) -> MemoryResult<Self> {
        if max_messages == 0 {
            return Err(MemoryError::InvalidConfig(
                "max_messages must be > 0".to_string(),
            ));
        }
        Ok(Self {
            processors,
            limiter,
            max_messages,
        })
    }

    /// Names of the configured stages, in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.processors
            .iter()
            .map(|processor| processor.name())
            .chain(std::iter::once(self.limiter.name()))
            .collect()
    }

    /// Run every stage, then the hard ceiling.
    #[must_use]
    pub fn process(&self, messages: Vec<Message>) -> Vec<Message> {
        let input_len = messages.len();
        let mut current = messages;
        for processor in &self.processors {
            current = run_stage(processor.as_ref(), current, self.max_messages);
        }
        let output = run_stage(&self.limiter, current, self.max_messages);
        debug!(input = input_len, output = output.len(), "Compaction pipeline finished");
        output
    }
}

/// Run one processor, falling back to recency on failure.
fn run_stage(
    processor: &dyn Processor,
    messages: Vec<Message>,
    max_messages: usize,
) -> Vec<Message> {
    let snapshot = messages.clone();
    let result = processor
        .process(messages)
        .and_then(|output| check_traceable(&snapshot, output));

    match result {
        Ok(output) => output,
        Err(err) => {
            warn!(
                stage = processor.name(),
                code = err.code(),
                error = %err,
                "Processor failed, keeping most recent messages"
            );
            recency_fallback(snapshot, max_messages)
        }
    }
}

/// Reject outputs with invented or repeated sequence indexes.
fn check_traceable(input: &[Message], output: Vec<Message>) -> MemoryResult<Vec<Message>> {
    let known: HashSet<u64> = input.iter().map(|m| m.sequence_index).collect();
    let mut seen = HashSet::with_capacity(output.len());
    for message in &output {
        if !known.contains(&message.sequence_index) {
            return Err(MemoryError::Processing(format!(
                "output references unknown sequence index {}",
                message.sequence_index
            )));
        }
        if !seen.insert(message.sequence_index) {
            return Err(MemoryError::Processing(format!(
                "output repeats sequence index {}",
                message.sequence_index
            )));
        }
    }
    Ok(output)
}

/// The most recent `max_messages` messages in chronological order, unscored.
#[must_use]
pub fn recency_fallback(mut messages: Vec<Message>, max_messages: usize) -> Vec<Message> {
    messages.sort_by_key(|m| m.sequence_index);
    let start = messages.len().saturating_sub(max_messages);
    messages.drain(..start);
    messages
}
