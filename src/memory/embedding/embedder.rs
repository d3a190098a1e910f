//! Embedding seam and its Ollama implementation.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client as ReqwestClient;
use rig::client::EmbeddingsClient;
use rig::embeddings::{Embedding, EmbeddingModel};
use rig::providers::ollama;
use tracing::debug;

use crate::memory::adapters::rig_adapter::ollama_client;
use crate::memory::core::config::EmbeddingConfig;
use crate::memory::core::errors::{AdapterErrorCode, MemoryError, MemoryResult};

/// Boxed future returned by [`Embedder`] methods.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns message and query text into vectors for the index.
pub trait Embedder: Send + Sync {
    /// Embed a query or a single message.
    ///
    /// # Errors
    /// Returns an error if the model call fails.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>>;

    /// Embed a batch; output order matches input order.
    ///
    /// # Errors
    /// Returns an error if the model call fails.
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>>;

    /// Vector length produced by this model.
    fn ndims(&self) -> usize;
}

/// Embedder backed by an Ollama embedding model through rig.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: ollama::EmbeddingModel<ReqwestClient>,
    model_name: String,
    ndims: usize,
}

impl OllamaEmbedder {
    /// Build the embedder from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> MemoryResult<Self> {
        let client = ollama_client(config.base_url.as_deref())?;
        Ok(Self {
            model: client.embedding_model_with_ndims(config.model.clone(), config.ndims),
            model_name: config.model.clone(),
            ndims: config.ndims,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        let text = text.to_string();
        Box::pin(async move {
            let embedding = self.model.embed_text(&text).await?;
            check_dimensions(std::slice::from_ref(&embedding), 1, self.ndims)?;
            Ok(embedding)
        })
    }

    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let expected = texts.len();
            let embeddings = self.model.embed_texts(texts).await?;
            check_dimensions(&embeddings, expected, self.ndims)?;
            debug!(model = %self.model_name, count = expected, "Embedded batch");
            Ok(embeddings)
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

/// Reject model responses whose count or vector length is off.
fn check_dimensions(embeddings: &[Embedding], expected: usize, ndims: usize) -> MemoryResult<()> {
    if embeddings.len() != expected {
        return Err(MemoryError::Processing(format!(
            "embedding model returned {} vectors for {expected} inputs",
            embeddings.len()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.vec.len() != ndims) {
        return Err(MemoryError::adapter(
            AdapterErrorCode::DimensionMismatch,
            format!(
                "embedding model returned {} dimensions, configured for {ndims}",
                bad.vec.len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(len: usize) -> Embedding {
        Embedding {
            document: "doc".to_string(),
            vec: vec![0.5; len],
        }
    }

    #[test]
    fn matching_batches_pass() {
        assert!(check_dimensions(&[embedding(4), embedding(4)], 2, 4).is_ok());
    }

    #[test]
    fn wrong_vector_length_is_a_dimension_mismatch() {
        let err = check_dimensions(&[embedding(4), embedding(3)], 2, 4).unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
    }

    #[test]
    fn missing_vectors_are_rejected() {
        let err = check_dimensions(&[embedding(4)], 2, 4).unwrap_err();
        assert_eq!(err.code(), "PROCESSING_FAILED");
    }
}
