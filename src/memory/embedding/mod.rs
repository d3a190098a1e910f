//! Embedding model modules.

pub mod cache;
pub mod embedder;

pub use cache::CachedEmbedder;
pub use embedder::{EmbedFuture, Embedder, OllamaEmbedder};
