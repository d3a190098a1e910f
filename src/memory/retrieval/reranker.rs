//! Weighted multi-signal reranking.
//!
//! Combined score = `w_s * semantic + w_v * vector + w_p * position`, where
//! `semantic` comes from a [`ScoringModel`], `vector` is the index similarity
//! and `position = 1 / (1 + original_rank)`. The model is an enhancement: on
//! failure or timeout the original vector order is returned instead.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::memory::core::config::RerankWeights;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::thread::{Candidate, RerankedResult, ScoreDetails};
use crate::memory::retrieval::scoring::ScoringModel;

/// Reranked results plus whether the scoring model contributed.
#[derive(Clone, Debug, PartialEq)]
pub struct RerankOutcome {
    /// Results, best first.
    pub results: Vec<RerankedResult>,
    /// Whether the scoring model was called and succeeded.
    pub reranking_used: bool,
}

/// Reranker combining semantic, vector and positional signals.
pub struct WeightedReranker {
    model: Arc<dyn ScoringModel>,
    weights: RerankWeights,
    timeout: Option<Duration>,
}

#[allow(clippy::cast_precision_loss)]
fn position_score(rank: usize) -> f64 {
    1.0 / (1.0 + rank as f64)
}

fn by_score_then_rank(a: &(usize, RerankedResult), b: &(usize, RerankedResult)) -> Ordering {
    b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0))
}

impl WeightedReranker {
    /// Create a reranker without a deadline on the model call.
    #[must_use]
    pub fn new(model: Arc<dyn ScoringModel>, weights: RerankWeights) -> Self {
        Self {
            model,
            weights,
            timeout: None,
        }
    }

    /// Bound the scoring model call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rerank `candidates` (in original index order) down to `top_k_final`.
    ///
    /// Never fails: model errors degrade to vector order.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_k_final: usize,
    ) -> RerankOutcome {
        if candidates.len() <= top_k_final {
            debug!(
                candidates = candidates.len(),
                top_k_final, "Skipping rerank, candidate set already small enough"
            );
            return RerankOutcome {
                results: Self::passthrough(candidates),
                reranking_used: false,
            };
        }

        match self.semantic_scores(query, &candidates).await {
            Ok(semantic) => RerankOutcome {
                results: self.combine(candidates, &semantic, top_k_final),
                reranking_used: true,
            },
            Err(err) => {
                warn!(
                    model = self.model.name(),
                    code = err.code(),
                    error = %err,
                    "Scoring model failed, falling back to vector order"
                );
                RerankOutcome {
                    results: Self::vector_order(candidates, top_k_final),
                    reranking_used: false,
                }
            }
        }
    }

    async fn semantic_scores(
        &self,
        query: &str,
        candidates: &[Candidate],
    ) -> MemoryResult<HashMap<String, f64>> {
        let call = self.model.score(query, candidates);
        let scored = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                MemoryError::ScoringTimeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
            })??,
            None => call.await?,
        };

        Ok(scored
            .into_iter()
            .map(|candidate| {
                let score = if candidate.score.is_finite() {
                    candidate.score.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (candidate.id, score)
            })
            .collect())
    }

    fn combine(
        &self,
        candidates: Vec<Candidate>,
        semantic: &HashMap<String, f64>,
        top_k_final: usize,
    ) -> Vec<RerankedResult> {
        let mut ranked: Vec<(usize, RerankedResult)> = candidates
            .into_iter()
            .enumerate()
            .map(|(rank, candidate)| {
                let details = ScoreDetails {
                    semantic: semantic.get(&candidate.id).copied().unwrap_or(0.0),
                    vector: candidate.score,
                    position: position_score(rank),
                };
                let score = self.weights.semantic * details.semantic
                    + self.weights.vector * details.vector
                    + self.weights.position * details.position;
                (
                    rank,
                    RerankedResult {
                        id: candidate.id,
                        score,
                        metadata: candidate.metadata,
                        details,
                    },
                )
            })
            .collect();

        ranked.sort_by(by_score_then_rank);
        ranked.truncate(top_k_final);
        ranked.into_iter().map(|(_, result)| result).collect()
    }

    fn unscored(rank: usize, candidate: Candidate) -> (usize, RerankedResult) {
        (
            rank,
            RerankedResult {
                id: candidate.id,
                score: candidate.score,
                metadata: candidate.metadata,
                details: ScoreDetails {
                    semantic: 0.0,
                    vector: candidate.score,
                    position: position_score(rank),
                },
            },
        )
    }

    fn passthrough(candidates: Vec<Candidate>) -> Vec<RerankedResult> {
        candidates
            .into_iter()
            .enumerate()
            .map(|(rank, candidate)| Self::unscored(rank, candidate).1)
            .collect()
    }

    fn vector_order(candidates: Vec<Candidate>, top_k_final: usize) -> Vec<RerankedResult> {
        let mut ranked: Vec<(usize, RerankedResult)> = candidates
            .into_iter()
            .enumerate()
            .map(|(rank, candidate)| Self::unscored(rank, candidate))
            .collect();
        ranked.sort_by(by_score_then_rank);
        ranked.truncate(top_k_final);
        ranked.into_iter().map(|(_, result)| result).collect()
    }
}

/// Original message positions of `results`, in rank order.
///
/// Results without a non-negative integer `sequence_index` are dropped.
#[must_use]
pub fn map_to_sequence_indexes(results: &[RerankedResult]) -> Vec<u64> {
    results
        .iter()
        .filter_map(|result| {
            let index = result.sequence_index();
            if index.is_none() {
                debug!(id = %result.id, "Dropping result without a usable sequence_index");
            }
            index
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::thread::Metadata;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct Fixed {
        scores: HashMap<String, f64>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(scores: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self {
                scores: scores.iter().map(|(id, s)| ((*id).to_string(), *s)).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ScoringModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score(
            &self,
            _query: &str,
            candidates: &[Candidate],
        ) -> MemoryResult<Vec<Candidate>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(candidates
                .iter()
                .filter_map(|c| {
                    self.scores.get(&c.id).map(|&score| Candidate {
                        score,
                        ..c.clone()
                    })
                })
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl ScoringModel for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn score(&self, _query: &str, _c: &[Candidate]) -> MemoryResult<Vec<Candidate>> {
            Err(MemoryError::Scoring("model offline".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl ScoringModel for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn score(&self, _query: &str, c: &[Candidate]) -> MemoryResult<Vec<Candidate>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(c.to_vec())
        }
    }

    fn candidates(scores: &[f64]) -> Vec<Candidate> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &score)| {
                let mut metadata = Metadata::new();
                metadata.insert("sequence_index".to_string(), json!(i));
                Candidate {
                    id: format!("c{i}"),
                    score,
                    metadata,
                }
            })
            .collect()
    }

    fn ids(results: &[RerankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn small_candidate_sets_skip_the_model() {
        let model = Fixed::new(&[]);
        let reranker = WeightedReranker::new(model.clone(), RerankWeights::default());
        let outcome = reranker.rerank("q", candidates(&[0.2, 0.9]), 2).await;

        assert!(!outcome.reranking_used);
        assert_eq!(model.calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(ids(&outcome.results), vec!["c0", "c1"]);
    }

    #[tokio::test]
    async fn semantic_scores_can_overturn_vector_order() {
        let model = Fixed::new(&[("c0", 0.0), ("c1", 0.1), ("c2", 1.0)]);
        let weights = RerankWeights {
            semantic: 0.6,
            vector: 0.3,
            position: 0.1,
        };
        let reranker = WeightedReranker::new(model, weights);
        let outcome = reranker.rerank("q", candidates(&[0.9, 0.8, 0.7]), 2).await;

        assert!(outcome.reranking_used);
        // c0: 0.27 + 0.1 = 0.37, c1: 0.06 + 0.24 + 0.05 = 0.35
        assert_eq!(ids(&outcome.results), vec!["c2", "c0"]);
        let top = &outcome.results[0];
        let expected = 0.6 * 1.0 + 0.3 * 0.7 + 0.1 * (1.0 / 3.0);
        assert!((top.score - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn missing_and_out_of_range_semantic_scores_are_normalized() {
        let model = Fixed::new(&[("c0", 7.5), ("c2", -3.0)]);
        let reranker = WeightedReranker::new(model, RerankWeights::default());
        let outcome = reranker.rerank("q", candidates(&[0.5, 0.5, 0.5]), 2).await;

        let details: HashMap<&str, f64> = outcome
            .results
            .iter()
            .map(|r| (r.id.as_str(), r.details.semantic))
            .collect();
        assert!((details["c0"] - 1.0).abs() < 1e-12);
        assert!(details.get("c2").is_none_or(|s| s.abs() < 1e-12));
        assert_eq!(outcome.results[0].id, "c0");
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_vector_order() {
        let reranker = WeightedReranker::new(Arc::new(Failing), RerankWeights::default());
        let outcome = reranker
            .rerank("q", candidates(&[0.3, 0.9, 0.1, 0.8]), 2)
            .await;

        assert!(!outcome.reranking_used);
        assert_eq!(ids(&outcome.results), vec!["c1", "c3"]);
    }

    #[tokio::test]
    async fn timeout_is_treated_as_failure() {
        let reranker = WeightedReranker::new(Arc::new(Slow), RerankWeights::default())
            .with_timeout(Some(Duration::from_millis(20)));
        let outcome = reranker.rerank("q", candidates(&[0.1, 0.2, 0.3]), 1).await;

        assert!(!outcome.reranking_used);
        assert_eq!(ids(&outcome.results), vec!["c2"]);
    }

    #[test]
    fn mapping_drops_unusable_positions() {
        let mut results: Vec<RerankedResult> = WeightedReranker::passthrough(candidates(&[
            0.9, 0.8, 0.7, 0.6,
        ]));
        results[1].metadata.insert("sequence_index".to_string(), json!("3"));
        results[2].metadata.remove("sequence_index");
        results[3].metadata.insert("sequence_index".to_string(), json!(-2));

        assert_eq!(map_to_sequence_indexes(&results), vec![0]);
    }
}
