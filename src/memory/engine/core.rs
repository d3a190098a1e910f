//! Memory pipeline orchestration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::memory::core::config::{MemoryConfig, RetrievalConfig};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::ThreadId;
use crate::memory::core::message::{Message, NewMessage};
use crate::memory::core::thread::{
    Metadata, RerankedResult, SEQUENCE_INDEX_KEY, THREAD_ID_KEY, Thread,
};
use crate::memory::embedding::cache::CachedEmbedder;
use crate::memory::embedding::embedder::{Embedder, OllamaEmbedder};
use crate::memory::engine::pipeline::CompactionPipeline;
use crate::memory::retrieval::llm_scorer::LlmScorer;
use crate::memory::retrieval::reranker::{WeightedReranker, map_to_sequence_indexes};
use crate::memory::retrieval::scoring::ScoringModel;
use crate::memory::storage::filter::MetadataFilter;
use crate::memory::storage::message_store::{MessageStore, SelectBy};
use crate::memory::storage::sqlite_message_store::SqliteMessageStore;
use crate::memory::storage::sqlite_vector_index::SqliteVectorIndex;
use crate::memory::storage::vector_index::{IndexedVector, VectorIndex};

/// Summary of one ranked retrieval.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RerankMetadata {
    /// Candidates requested from the index.
    pub top_k_initial: usize,
    /// Results kept after reranking.
    pub top_k_final: usize,
    /// Candidates the index actually returned.
    pub initial_result_count: usize,
    /// Whether the scoring model contributed to the order.
    pub reranking_used: bool,
    /// Wall time of the whole retrieval.
    pub duration_ms: u64,
    /// Mean combined score of the returned results, 0 when empty.
    pub average_relevance_score: f64,
}

/// Messages and ranking produced by [`MemoryPipeline::retrieve_ranked`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievedContext {
    /// Hits plus their neighbours, chronological.
    pub messages: Vec<Message>,
    /// Reranked results, best first.
    pub results: Vec<RerankedResult>,
    /// Retrieval summary.
    pub metadata: RerankMetadata,
}

/// Backend dependencies for the memory pipeline.
pub struct MemoryBackends {
    /// Thread and message store.
    pub message_store: Arc<dyn MessageStore>,
    /// Vector index over message embeddings.
    pub vector_index: Arc<dyn VectorIndex>,
    /// Embedding model wrapper.
    pub embedder: Arc<dyn Embedder>,
    /// Scoring model used by the reranker.
    pub scorer: Arc<dyn ScoringModel>,
}

impl MemoryBackends {
    /// Build default `SQLite` + Ollama backends from config.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn sqlite(config: &MemoryConfig) -> MemoryResult<Self> {
        let message_store = Arc::new(SqliteMessageStore::new(&config.storage).await?);
        let vector_index = Arc::new(SqliteVectorIndex::new(&config.storage).await?);
        let ollama = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let embedder = Arc::new(CachedEmbedder::new(ollama, config.embedding.cache_capacity)?);
        let scorer = Arc::new(LlmScorer::new(&config.llm)?);

        Ok(Self {
            message_store,
            vector_index,
            embedder,
            scorer,
        })
    }
}

/// Compaction and ranked retrieval over injected collaborators.
pub struct MemoryPipeline {
    config: MemoryConfig,
    message_store: Arc<dyn MessageStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    scorer: Arc<dyn ScoringModel>,
    compaction: CompactionPipeline,
}

impl MemoryPipeline {
    /// Create a new pipeline.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: MemoryConfig, backends: MemoryBackends) -> MemoryResult<Self> {
        config.validate()?;
        let compaction = CompactionPipeline::from_config(&config.compaction)?;

        Ok(Self {
            config,
            message_store: backends.message_store,
            vector_index: backends.vector_index,
            embedder: backends.embedder,
            scorer: backends.scorer,
            compaction,
        })
    }

    /// Create a pipeline using `SQLite` and Ollama backends.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or backends cannot be initialized.
    pub async fn from_config(config: MemoryConfig) -> MemoryResult<Self> {
        config.validate()?;
        let backends = MemoryBackends::sqlite(&config).await?;
        Self::new(config, backends)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Create one thread.
    ///
    /// # Errors
    /// Returns an error if the store rejects the thread.
    pub async fn create_thread(&self, thread: Thread) -> MemoryResult<Thread> {
        self.message_store.create_thread(thread).await
    }

    /// Create threads concurrently; one result per draft, in input order.
    ///
    /// A failed creation does not cancel or roll back its siblings.
    pub async fn create_threads(&self, drafts: Vec<Thread>) -> Vec<MemoryResult<Thread>> {
        let total = drafts.len();
        let results = join_all(
            drafts
                .into_iter()
                .map(|draft| self.message_store.create_thread(draft)),
        )
        .await;

        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            warn!(total, failed, "Batch thread creation partially failed");
        } else {
            debug!(total, "Batch thread creation finished");
        }
        results
    }

    /// Append messages to a thread and index them for retrieval.
    ///
    /// # Errors
    /// Returns an error if the thread does not exist or storage, embedding or
    /// indexing fails.
    pub async fn append_messages(
        &self,
        thread_id: ThreadId,
        messages: Vec<NewMessage>,
    ) -> MemoryResult<Vec<Message>> {
        let stored = self
            .message_store
            .append_messages(thread_id, messages)
            .await?;
        self.index_messages(thread_id, &stored).await?;
        Ok(stored)
    }

    /// Embed messages and upsert them into the configured vector index.
    ///
    /// Entries carry `thread_id`, `sequence_index`, `role` and `text`
    /// metadata; ids are `{thread_id}:{sequence_index}` so re-indexing
    /// replaces entries.
    ///
    /// # Errors
    /// Returns an error if embedding or indexing fails.
    pub async fn index_messages(
        &self,
        thread_id: ThreadId,
        messages: &[Message],
    ) -> MemoryResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let index_name = &self.config.retrieval.index_name;
        self.vector_index
            .create_index(index_name, self.embedder.ndims())
            .await?;

        let texts = messages.iter().map(|m| m.content.clone()).collect();
        let embeddings = self.embedder.embed_texts(texts).await?;
        if embeddings.len() != messages.len() {
            return Err(MemoryError::Processing(format!(
                "embedder returned {} vectors for {} messages",
                embeddings.len(),
                messages.len()
            )));
        }

        let items = messages
            .iter()
            .zip(embeddings)
            .map(|(message, embedding)| {
                let mut metadata = Metadata::new();
                metadata.insert(THREAD_ID_KEY.to_string(), json!(thread_id.to_string()));
                metadata.insert(SEQUENCE_INDEX_KEY.to_string(), json!(message.sequence_index));
                metadata.insert("role".to_string(), json!(message.role.as_str()));
                metadata.insert("text".to_string(), json!(message.content));
                IndexedVector {
                    id: format!("{thread_id}:{}", message.sequence_index),
                    vector: embedding.vec,
                    metadata,
                }
            })
            .collect();

        self.vector_index.upsert(index_name, items).await?;
        debug!(%thread_id, count = messages.len(), "Indexed messages");
        Ok(())
    }

    /// Vector search within a thread, weighted rerank, then context expansion.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, or if embedding,
    /// the index or the store fail. Scoring model failures are not errors.
    pub async fn retrieve_ranked(
        &self,
        thread_id: ThreadId,
        query: &str,
        config: &RetrievalConfig,
    ) -> MemoryResult<RetrievedContext> {
        config.validate()?;
        let filter = MetadataFilter::new().field(THREAD_ID_KEY, thread_id.to_string());
        filter.validate()?;
        let started = Instant::now();

        let embedding = self.embedder.embed_text(query).await?;
        let candidates = self
            .vector_index
            .query(
                &config.index_name,
                &embedding.vec,
                config.top_k_initial,
                Some(&filter),
            )
            .await?;
        let initial_result_count = candidates.len();

        let reranker = WeightedReranker::new(Arc::clone(&self.scorer), config.weights)
            .with_timeout(config.scoring_timeout_ms.map(Duration::from_millis));
        let outcome = reranker
            .rerank(query, candidates, config.top_k_final)
            .await;

        let hits: BTreeSet<u64> = map_to_sequence_indexes(&outcome.results)
            .into_iter()
            .collect();
        let messages = if hits.is_empty() {
            Vec::new()
        } else {
            self.message_store
                .query(
                    thread_id,
                    SelectBy::around(hits, config.context_before, config.context_after),
                )
                .await?
        };

        let metadata = RerankMetadata {
            top_k_initial: config.top_k_initial,
            top_k_final: config.top_k_final,
            initial_result_count,
            reranking_used: outcome.reranking_used,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            average_relevance_score: average_score(&outcome.results),
        };

        info!(
            %thread_id,
            candidates = initial_result_count,
            results = outcome.results.len(),
            messages = messages.len(),
            reranking_used = metadata.reranking_used,
            duration_ms = metadata.duration_ms,
            "Ranked retrieval finished"
        );

        Ok(RetrievedContext {
            messages,
            results: outcome.results,
            metadata,
        })
    }

    /// Compact the most recent `history_window` messages of a thread.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn process_thread(&self, thread_id: ThreadId) -> MemoryResult<Vec<Message>> {
        let history = self
            .message_store
            .query(thread_id, SelectBy::last(self.config.history_window))
            .await?;
        Ok(self.compaction.process(history))
    }
}

#[allow(clippy::cast_precision_loss)]
fn average_score(results: &[RerankedResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|result| result.score).sum::<f64>() / results.len() as f64
}
