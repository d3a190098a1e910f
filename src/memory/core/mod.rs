//! Core memory types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod message;
pub mod thread;

pub use config::{
    CompactionConfig, EmbeddingConfig, LlmConfig, MemoryConfig, RerankWeights, RetrievalConfig,
    ScoringWeights, StorageConfig, TokenLimitConfig, ToolFilterConfig, TopicConfig,
};
pub use errors::{AdapterErrorCode, MemoryError, MemoryResult};
pub use ids::{ResourceId, ThreadId};
pub use message::{Message, NewMessage, Role, ScoredMessage};
pub use thread::{
    Candidate, Metadata, RerankedResult, ScoreDetails, SEQUENCE_INDEX_KEY, THREAD_ID_KEY, Thread,
};
