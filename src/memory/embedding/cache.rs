//! LRU cache in front of an embedder.
//!
//! Retrieval embeds the same queries repeatedly; caching them skips a model
//! round trip. Entries are keyed by the exact input text.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use rig::embeddings::Embedding;
use tokio::sync::Mutex;
use tracing::debug;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::embedding::embedder::{EmbedFuture, Embedder};

/// Embedder decorator that memoizes results.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Embedding>>,
}

impl CachedEmbedder {
    /// Wrap `inner` with a cache of `capacity` entries.
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero.
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> MemoryResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            MemoryError::InvalidConfig("embedding.cache_capacity must be > 0".to_string())
        })?;
        Ok(Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Number of cached embeddings.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }
}

impl Embedder for CachedEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        let text = text.to_string();
        Box::pin(async move {
            if let Some(hit) = self.cache.lock().await.get(&text) {
                debug!(chars = text.len(), "Embedding cache hit");
                return Ok(hit.clone());
            }
            let embedding = self.inner.embed_text(&text).await?;
            self.cache.lock().await.put(text, embedding.clone());
            Ok(embedding)
        })
    }

    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>> {
        Box::pin(async move {
            let mut slots: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
            let mut misses = Vec::new();
            {
                let mut cache = self.cache.lock().await;
                for text in &texts {
                    let hit = cache.get(text).cloned();
                    if hit.is_none() {
                        misses.push(text.clone());
                    }
                    slots.push(hit);
                }
            }

            let fetched = if misses.is_empty() {
                Vec::new()
            } else {
                self.inner.embed_texts(misses.clone()).await?
            };
            if fetched.len() != misses.len() {
                return Err(MemoryError::Processing(format!(
                    "embedder returned {} vectors for {} texts",
                    fetched.len(),
                    misses.len()
                )));
            }

            {
                let mut cache = self.cache.lock().await;
                for (text, embedding) in misses.into_iter().zip(&fetched) {
                    cache.put(text, embedding.clone());
                }
            }

            let mut fetched = fetched.into_iter();
            slots
                .into_iter()
                .map(|slot| {
                    slot.or_else(|| fetched.next()).ok_or_else(|| {
                        MemoryError::Processing("embedding batch misaligned".to_string())
                    })
                })
                .collect()
        })
    }

    fn ndims(&self) -> usize {
        self.inner.ndims()
    }
}
