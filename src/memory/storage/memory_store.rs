//! In-process message store and vector index backed by `DashMap`.
//!
//! Used for tests and single-process deployments that do not need
//! persistence.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::memory::core::errors::{AdapterErrorCode, MemoryError, MemoryResult};
use crate::memory::core::ids::ThreadId;
use crate::memory::core::message::{Message, NewMessage};
use crate::memory::core::thread::{Candidate, Thread};
use crate::memory::storage::StoreFuture;
use crate::memory::storage::filter::MetadataFilter;
use crate::memory::storage::message_store::{MessageStore, SelectBy};
use crate::memory::storage::vector_index::{IndexedVector, VectorIndex, cosine_similarity};

#[derive(Debug)]
struct ThreadEntry {
    thread: Thread,
    messages: Vec<Message>,
}

/// Message store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    threads: DashMap<ThreadId, ThreadEntry>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn create_thread(&self, thread: Thread) -> StoreFuture<'_, MemoryResult<Thread>> {
        Box::pin(async move {
            match self.threads.entry(thread.id) {
                Entry::Occupied(_) => Err(MemoryError::adapter(
                    AdapterErrorCode::Storage,
                    format!("thread {} already exists", thread.id),
                )),
                Entry::Vacant(slot) => {
                    slot.insert(ThreadEntry {
                        thread: thread.clone(),
                        messages: Vec::new(),
                    });
                    Ok(thread)
                }
            }
        })
    }

    fn get_thread(&self, thread_id: ThreadId) -> StoreFuture<'_, MemoryResult<Option<Thread>>> {
        Box::pin(async move {
            Ok(self
                .threads
                .get(&thread_id)
                .map(|entry| entry.thread.clone()))
        })
    }

    fn append_messages(
        &self,
        thread_id: ThreadId,
        messages: Vec<NewMessage>,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            let mut entry = self.threads.get_mut(&thread_id).ok_or_else(|| {
                MemoryError::adapter(
                    AdapterErrorCode::ThreadNotFound,
                    format!("thread {thread_id} not found"),
                )
            })?;

            let next = entry
                .messages
                .last()
                .map_or(0, |last| last.sequence_index + 1);
            let appended: Vec<Message> = messages
                .into_iter()
                .zip(next..)
                .map(|(message, index)| Message::new(message.role, message.content, index))
                .collect();

            entry.messages.extend(appended.iter().cloned());
            entry.thread.updated_at = Utc::now();
            Ok(appended)
        })
    }

    fn query(
        &self,
        thread_id: ThreadId,
        select_by: SelectBy,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            Ok(self
                .threads
                .get(&thread_id)
                .map(|entry| select_by.apply(&entry.messages))
                .unwrap_or_default())
        })
    }
}

#[derive(Debug)]
struct IndexEntry {
    dimension: usize,
    items: Vec<IndexedVector>,
}

/// Brute-force cosine index held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    indexes: DashMap<String, IndexEntry>,
}

impl InMemoryVectorIndex {
    /// Create an empty index set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn index_not_found(index_name: &str) -> MemoryError {
    MemoryError::adapter(
        AdapterErrorCode::IndexNotFound,
        format!("index '{index_name}' does not exist"),
    )
}

fn dimension_mismatch(index_name: &str, expected: usize, actual: usize) -> MemoryError {
    MemoryError::adapter(
        AdapterErrorCode::DimensionMismatch,
        format!("index '{index_name}' expects {expected} dimensions, got {actual}"),
    )
}

impl VectorIndex for InMemoryVectorIndex {
    fn create_index(&self, index_name: &str, dimension: usize) -> StoreFuture<'_, MemoryResult<()>> {
        let index_name = index_name.to_string();
        Box::pin(async move {
            match self.indexes.entry(index_name.clone()) {
                Entry::Occupied(existing) if existing.get().dimension != dimension => Err(
                    dimension_mismatch(&index_name, existing.get().dimension, dimension),
                ),
                Entry::Occupied(_) => Ok(()),
                Entry::Vacant(slot) => {
                    slot.insert(IndexEntry {
                        dimension,
                        items: Vec::new(),
                    });
                    Ok(())
                }
            }
        })
    }

    fn upsert(
        &self,
        index_name: &str,
        items: Vec<IndexedVector>,
    ) -> StoreFuture<'_, MemoryResult<()>> {
        let index_name = index_name.to_string();
        Box::pin(async move {
            let mut index = self
                .indexes
                .get_mut(&index_name)
                .ok_or_else(|| index_not_found(&index_name))?;

            if let Some(bad) = items.iter().find(|item| item.vector.len() != index.dimension) {
                return Err(dimension_mismatch(
                    &index_name,
                    index.dimension,
                    bad.vector.len(),
                ));
            }

            for item in items {
                if let Some(existing) = index.items.iter_mut().find(|e| e.id == item.id) {
                    *existing = item;
                } else {
                    index.items.push(item);
                }
            }
            Ok(())
        })
    }

    fn query(
        &self,
        index_name: &str,
        query_vector: &[f64],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreFuture<'_, MemoryResult<Vec<Candidate>>> {
        let index_name = index_name.to_string();
        let query_vector = query_vector.to_vec();
        let filter = filter.cloned();
        Box::pin(async move {
            if let Some(filter) = &filter {
                filter.validate()?;
            }
            let index = self
                .indexes
                .get(&index_name)
                .ok_or_else(|| index_not_found(&index_name))?;
            if query_vector.len() != index.dimension {
                return Err(dimension_mismatch(
                    &index_name,
                    index.dimension,
                    query_vector.len(),
                ));
            }

            let mut candidates: Vec<Candidate> = index
                .items
                .iter()
                .filter(|item| filter.as_ref().is_none_or(|f| f.matches(&item.metadata)))
                .map(|item| Candidate {
                    id: item.id.clone(),
                    score: cosine_similarity(&query_vector, &item.vector),
                    metadata: item.metadata.clone(),
                })
                .collect();

            candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
            candidates.truncate(top_k);
            Ok(candidates)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::ids::ResourceId;
    use crate::memory::core::thread::Metadata;
    use serde_json::json;

    fn entry(id: &str, vector: Vec<f64>, thread: &str) -> IndexedVector {
        let mut metadata = Metadata::new();
        metadata.insert("thread_id".to_string(), json!(thread));
        IndexedVector {
            id: id.to_string(),
            vector,
            metadata,
        }
    }

    #[tokio::test]
    async fn append_assigns_consecutive_indexes() {
        let store = InMemoryMessageStore::new();
        let thread = store
            .create_thread(Thread::new(ResourceId::new()))
            .await
            .unwrap();

        let first = store
            .append_messages(thread.id, vec![NewMessage::user("a"), NewMessage::assistant("b")])
            .await
            .unwrap();
        let second = store
            .append_messages(thread.id, vec![NewMessage::user("c")])
            .await
            .unwrap();

        assert_eq!(first[1].sequence_index, 1);
        assert_eq!(second[0].sequence_index, 2);
        let all = store.query(thread.id, SelectBy::all()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn unknown_threads_read_empty_but_reject_writes() {
        let store = InMemoryMessageStore::new();
        let missing = ThreadId::new();
        assert!(store.get_thread(missing).await.unwrap().is_none());
        assert!(store.query(missing, SelectBy::last(5)).await.unwrap().is_empty());

        let err = store
            .append_messages(missing, vec![NewMessage::user("x")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "THREAD_NOT_FOUND");
    }

    #[tokio::test]
    async fn duplicate_thread_ids_are_rejected() {
        let store = InMemoryMessageStore::new();
        let thread = Thread::new(ResourceId::new());
        store.create_thread(thread.clone()).await.unwrap();
        assert!(store.create_thread(thread).await.is_err());
        assert_eq!(store.thread_count(), 1);
    }

    #[tokio::test]
    async fn query_orders_by_similarity_and_applies_filter() {
        let index = InMemoryVectorIndex::new();
        index.create_index("msgs", 2).await.unwrap();
        index
            .upsert(
                "msgs",
                vec![
                    entry("near", vec![1.0, 0.1], "t1"),
                    entry("far", vec![0.0, 1.0], "t1"),
                    entry("other", vec![1.0, 0.0], "t2"),
                ],
            )
            .await
            .unwrap();

        let filter = MetadataFilter::new().field("thread_id", "t1");
        let hits = index
            .query("msgs", &[1.0, 0.0], 5, Some(&filter))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let index = InMemoryVectorIndex::new();
        index.create_index("msgs", 2).await.unwrap();
        index
            .upsert("msgs", vec![entry("a", vec![0.0, 1.0], "t1")])
            .await
            .unwrap();
        index
            .upsert("msgs", vec![entry("a", vec![1.0, 0.0], "t1")])
            .await
            .unwrap();

        let hits = index.query("msgs", &[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn index_errors_are_classified() {
        let index = InMemoryVectorIndex::new();
        let err = index.query("missing", &[1.0], 3, None).await.unwrap_err();
        assert_eq!(err.code(), "INDEX_NOT_FOUND");

        index.create_index("msgs", 2).await.unwrap();
        assert!(index.create_index("msgs", 2).await.is_ok());
        let err = index.create_index("msgs", 3).await.unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");

        let err = index
            .upsert("msgs", vec![entry("a", vec![1.0, 2.0, 3.0], "t1")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
    }

    #[tokio::test]
    async fn invalid_filter_fails_before_lookup() {
        let index = InMemoryVectorIndex::new();
        let filter = MetadataFilter::new().field("$ne", 1);
        let err = index
            .query("missing", &[1.0], 3, Some(&filter))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_FILTER");
    }
}
