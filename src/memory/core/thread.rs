//! Thread and retrieval candidate models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::core::ids::{ResourceId, ThreadId};

/// Free-form JSON metadata attached to threads and candidates.
pub type Metadata = Map<String, Value>;

/// Metadata key carrying the owning thread of an indexed message.
pub const THREAD_ID_KEY: &str = "thread_id";
/// Metadata key carrying the original position of an indexed message.
pub const SEQUENCE_INDEX_KEY: &str = "sequence_index";

/// A conversation thread: the unit of message history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Thread identifier.
    pub id: ThreadId,
    /// Owner of the thread.
    pub resource_id: ResourceId,
    /// Optional human title.
    pub title: Option<String>,
    /// Arbitrary metadata.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last append timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Create a fresh thread for an owner.
    #[must_use]
    pub fn new(resource_id: ResourceId) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            resource_id,
            title: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Insert a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An item returned by the vector index before reranking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Index entry identifier.
    pub id: String,
    /// Similarity score reported by the index (higher is closer).
    pub score: f64,
    /// Entry metadata; carries `thread_id` and `sequence_index` for messages.
    pub metadata: Metadata,
}

impl Candidate {
    /// Original message position, if present and a non-negative integer.
    #[must_use]
    pub fn sequence_index(&self) -> Option<u64> {
        self.metadata.get(SEQUENCE_INDEX_KEY).and_then(Value::as_u64)
    }

    /// Text stored alongside the entry, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.metadata.get("text").and_then(Value::as_str)
    }
}

/// Score breakdown of a reranked result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetails {
    /// Relevance reported by the scoring model.
    pub semantic: f64,
    /// Similarity reported by the vector index.
    pub vector: f64,
    /// Score derived from the original rank.
    pub position: f64,
}

/// Output of the weighted reranker, ordered by descending `score`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    /// Index entry identifier.
    pub id: String,
    /// Combined score.
    pub score: f64,
    /// Entry metadata, passed through from the candidate.
    pub metadata: Metadata,
    /// Individual signals behind `score`.
    pub details: ScoreDetails,
}

impl RerankedResult {
    /// Original message position, if present and a non-negative integer.
    #[must_use]
    pub fn sequence_index(&self) -> Option<u64> {
        self.metadata.get(SEQUENCE_INDEX_KEY).and_then(Value::as_u64)
    }
}
