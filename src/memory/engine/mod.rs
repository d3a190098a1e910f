//! Memory pipeline orchestration module.

pub mod core;
pub mod pipeline;

pub use self::core::{MemoryBackends, MemoryPipeline, RerankMetadata, RetrievedContext};
pub use pipeline::{CompactionPipeline, compact, recency_fallback};
