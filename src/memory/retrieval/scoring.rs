//! Scoring model abstraction used by the weighted reranker.

use async_trait::async_trait;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::thread::Candidate;

/// Semantic relevance scorer.
///
/// Implementations return candidates carrying their relevance to the query in
/// `score`, ideally in `[0, 1]`. Results are matched back by `id`, so the
/// output may be reordered or omit candidates the model could not judge.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Score every candidate against the query in a single call.
    ///
    /// # Errors
    /// Returns an error if the underlying model call fails.
    async fn score(&self, query: &str, candidates: &[Candidate]) -> MemoryResult<Vec<Candidate>>;
}
