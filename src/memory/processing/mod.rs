//! Message reducers: scoring, de-duplication, pruning, ordering and limits.

pub mod flow;
pub mod importance;
pub mod processor;
pub mod pruning;
pub mod redundancy;
pub mod token_limit;
pub mod tokens;
pub mod tool_filter;
pub mod topics;

pub use flow::restore_flow;
pub use importance::ImportanceScorer;
pub use processor::{ImportanceCompactor, Processor, TokenLimiter, ToolCallFilter, TopicSegmenter};
pub use pruning::{most_recent_indexes, prune_to_budget};
pub use redundancy::filter_redundant;
pub use token_limit::{estimate_tokens, limit_tokens};
pub use tokens::{jaccard, token_set};
pub use tool_filter::filter_tool_messages;
pub use topics::{segment, select_recent_topics};
