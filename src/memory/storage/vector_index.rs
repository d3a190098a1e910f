//! Named vector indexes with metadata filtering.

use serde::{Deserialize, Serialize};

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::thread::{Candidate, Metadata};
use crate::memory::storage::StoreFuture;
use crate::memory::storage::filter::MetadataFilter;

/// One entry to write into an index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    /// Stable entry identifier; upserts replace by id.
    pub id: String,
    /// Embedding.
    pub vector: Vec<f64>,
    /// Metadata returned with query results.
    pub metadata: Metadata,
}

/// Similarity search over named, fixed-dimension indexes.
pub trait VectorIndex: Send + Sync {
    /// Create an index, or succeed if it already exists with this dimension.
    ///
    /// Fails with `DIMENSION_MISMATCH` if it exists with another dimension.
    fn create_index(&self, index_name: &str, dimension: usize) -> StoreFuture<'_, MemoryResult<()>>;

    /// Insert or replace entries.
    fn upsert(
        &self,
        index_name: &str,
        items: Vec<IndexedVector>,
    ) -> StoreFuture<'_, MemoryResult<()>>;

    /// Return up to `top_k` entries by descending similarity.
    ///
    /// Fails with `INDEX_NOT_FOUND` for unknown indexes and `INVALID_FILTER`
    /// for malformed filters, before touching the backend.
    fn query(
        &self,
        index_name: &str,
        query_vector: &[f64],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreFuture<'_, MemoryResult<Vec<Candidate>>>;
}

/// Cosine similarity; zero when either vector has no magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let sim = cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((sim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f64::EPSILON);
    }
}
