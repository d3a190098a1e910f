//! Candidate scoring and reranking.

pub mod llm_scorer;
pub mod reranker;
pub mod scoring;
pub mod term_overlap;

pub use llm_scorer::LlmScorer;
pub use reranker::{RerankOutcome, WeightedReranker, map_to_sequence_indexes};
pub use scoring::ScoringModel;
pub use term_overlap::TermOverlapScorer;
