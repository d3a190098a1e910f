//! Local scoring by query term overlap.
//!
//! Score = |query ∩ document| / |query| over lower-cased whitespace terms.
//! No IDF, no term frequency, no length normalization. Useful offline and
//! as a deterministic stand-in for a model.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::thread::Candidate;
use crate::memory::retrieval::scoring::ScoringModel;

/// Term overlap scorer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TermOverlapScorer;

impl TermOverlapScorer {
    /// Create a new scorer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|term| {
            term.trim_matches(|c: char| !c.is_alphanumeric())
                .to_string()
        })
        .filter(|term| !term.is_empty())
        .collect()
}

#[async_trait]
impl ScoringModel for TermOverlapScorer {
    fn name(&self) -> &str {
        "term-overlap"
    }

    #[allow(clippy::cast_precision_loss)]
    async fn score(&self, query: &str, candidates: &[Candidate]) -> MemoryResult<Vec<Candidate>> {
        let query_terms = terms(query);
        let max_terms = query_terms.len().max(1);

        Ok(candidates
            .iter()
            .map(|candidate| {
                let doc_terms = terms(candidate.text().unwrap_or_default());
                let overlap = query_terms.intersection(&doc_terms).count();
                Candidate {
                    score: overlap as f64 / max_terms as f64,
                    ..candidate.clone()
                }
            })
            .collect())
    }
}
