//! Conversation memory: compaction and ranked retrieval.
//!
//! This module keeps an unbounded thread history usable within a bounded
//! context window, organized into:
//! - `core`: Configuration, errors, IDs, messages and threads
//! - `processing`: Importance scoring, de-duplication, pruning, ordering, topic and size limits
//! - `storage`: Message store and vector index adapters (in-memory and `SQLite`)
//! - `embedding`: Embedding model abstraction, Ollama implementation and LRU cache
//! - `retrieval`: Scoring models and the weighted reranker
//! - `engine`: Compaction pipeline and the retrieval orchestrator
//! - `adapters`: Rig and tracing plumbing

pub mod adapters;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod processing;
pub mod retrieval;
pub mod storage;

// Re-export commonly used types for convenience
pub use self::core::{
    AdapterErrorCode, Candidate, CompactionConfig, EmbeddingConfig, LlmConfig, MemoryConfig,
    MemoryError, MemoryResult, Message, Metadata, NewMessage, RerankWeights, RerankedResult,
    ResourceId, RetrievalConfig, Role, ScoreDetails, ScoredMessage, ScoringWeights, StorageConfig,
    Thread, ThreadId, TokenLimitConfig, ToolFilterConfig, TopicConfig,
};
pub use adapters::{init_tracing, ollama_client};
pub use embedding::{CachedEmbedder, EmbedFuture, Embedder, OllamaEmbedder};
pub use engine::{
    CompactionPipeline, MemoryBackends, MemoryPipeline, RerankMetadata, RetrievedContext, compact,
};
pub use processing::Processor;
pub use retrieval::{
    LlmScorer, RerankOutcome, ScoringModel, TermOverlapScorer, WeightedReranker,
    map_to_sequence_indexes,
};
pub use storage::{
    InMemoryMessageStore, InMemoryVectorIndex, IncludeRange, IndexedVector, MessageStore,
    MetadataFilter, SelectBy, SqliteMessageStore, SqliteVectorIndex, StoreFuture, VectorIndex,
    init_sqlite_vec_extension,
};
