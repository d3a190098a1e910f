//! Configuration for the memory subsystem.
//!
//! Every struct rejects unknown keys at deserialization time and exposes a
//! `validate` method; pipelines call it before touching any collaborator.

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Top-level configuration for the memory pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Compaction settings.
    pub compaction: CompactionConfig,
    /// Retrieval and reranking settings.
    pub retrieval: RetrievalConfig,
    /// Number of most recent stored messages loaded by `process_thread`.
    pub history_window: usize,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Scoring model settings.
    pub llm: LlmConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            compaction: CompactionConfig::default(),
            retrieval: RetrievalConfig::default(),
            history_window: 500,
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Parse a JSON configuration document; unknown keys are rejected.
    ///
    /// # Errors
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json_str(raw: &str) -> MemoryResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| MemoryError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        self.compaction.validate()?;
        self.retrieval.validate()?;

        if self.history_window == 0 {
            return Err(MemoryError::InvalidConfig(
                "history_window must be > 0".to_string(),
            ));
        }

        validate_identifier("storage.threads_table", &self.storage.threads_table)?;
        validate_identifier("storage.messages_table", &self.storage.messages_table)?;

        if self.embedding.ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

/// Settings for the compaction path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompactionConfig {
    /// Maximum number of messages kept.
    pub max_messages: usize,
    /// Jaccard similarity above which a lower-scored message is redundant.
    pub similarity_threshold: f64,
    /// Keywords that raise a message's importance.
    pub importance_keywords: Vec<String>,
    /// Character length above which a message is penalized as verbose.
    pub verbose_message_threshold: usize,
    /// Fraction of the budget reserved for the newest messages.
    pub recency_reservation_ratio: f64,
    /// Importance scoring weights.
    pub scoring: ScoringWeights,
    /// Topic segmentation settings.
    pub topic: TopicConfig,
    /// Tool message filter settings.
    pub tool_filter: ToolFilterConfig,
    /// Hard token ceiling settings.
    pub token_limit: TokenLimitConfig,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            similarity_threshold: 0.85,
            importance_keywords: [
                "important",
                "remember",
                "critical",
                "error",
                "decision",
                "deadline",
                "must",
                "requirement",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            verbose_message_threshold: 500,
            recency_reservation_ratio: 0.3,
            scoring: ScoringWeights::default(),
            topic: TopicConfig::default(),
            tool_filter: ToolFilterConfig::default(),
            token_limit: TokenLimitConfig::default(),
        }
    }
}

impl CompactionConfig {
    /// Validate compaction invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.max_messages == 0 {
            return Err(MemoryError::InvalidConfig(
                "compaction.max_messages must be > 0".to_string(),
            ));
        }

        check_unit_interval(
            "compaction.similarity_threshold",
            self.similarity_threshold,
        )?;
        check_unit_interval(
            "compaction.recency_reservation_ratio",
            self.recency_reservation_ratio,
        )?;

        if self.verbose_message_threshold == 0 {
            return Err(MemoryError::InvalidConfig(
                "compaction.verbose_message_threshold must be > 0".to_string(),
            ));
        }

        if self
            .importance_keywords
            .iter()
            .any(|keyword| keyword.trim().is_empty())
        {
            return Err(MemoryError::InvalidConfig(
                "compaction.importance_keywords must not contain blank entries".to_string(),
            ));
        }

        self.scoring.validate()?;
        self.topic.validate()?;

        if self.token_limit.max_tokens == 0 {
            return Err(MemoryError::InvalidConfig(
                "compaction.token_limit.max_tokens must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of slots reserved for the newest messages.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn reserved_slots(&self) -> usize {
        let reserved = (self.max_messages as f64 * self.recency_reservation_ratio).floor() as usize;
        reserved.min(self.max_messages)
    }
}

/// Weights used by the importance scorer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringWeights {
    /// Base score of system messages.
    pub system: f64,
    /// Base score of user messages.
    pub user: f64,
    /// Base score of assistant messages.
    pub assistant: f64,
    /// Base score of tool messages.
    pub tool: f64,
    /// Bonus added per keyword occurrence.
    pub keyword_bonus: f64,
    /// Decay rate `k` of the recency bonus `exp(-k * distance)`.
    pub recency_decay: f64,
    /// Multiplier applied to verbose messages, in (0, 1).
    pub verbosity_penalty: f64,
    /// Bonus for messages that ask something.
    pub question_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            system: 1.0,
            user: 0.8,
            assistant: 0.6,
            tool: 0.4,
            keyword_bonus: 0.2,
            recency_decay: 0.1,
            verbosity_penalty: 0.8,
            question_bonus: 0.1,
        }
    }
}

impl ScoringWeights {
    /// Validate scorer weights.
    ///
    /// # Errors
    /// Returns an error if role weights are not ordered or values are out of range.
    pub fn validate(&self) -> MemoryResult<()> {
        let values = [
            ("system", self.system),
            ("user", self.user),
            ("assistant", self.assistant),
            ("tool", self.tool),
            ("keyword_bonus", self.keyword_bonus),
            ("recency_decay", self.recency_decay),
            ("question_bonus", self.question_bonus),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryError::InvalidConfig(format!(
                    "compaction.scoring.{name} must be finite and >= 0"
                )));
            }
        }

        let ordered = self.system > self.user
            && self.user > self.assistant
            && self.assistant > self.tool
            && self.tool > 0.0;
        if !ordered {
            return Err(MemoryError::InvalidConfig(
                "compaction.scoring role weights must satisfy system > user > assistant > tool > 0"
                    .to_string(),
            ));
        }

        if !(self.verbosity_penalty > 0.0 && self.verbosity_penalty < 1.0) {
            return Err(MemoryError::InvalidConfig(
                "compaction.scoring.verbosity_penalty must be in (0, 1)".to_string(),
            ));
        }

        Ok(())
    }
}

/// Topic segmentation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicConfig {
    /// Whether the segmenter runs inside `process`.
    pub enabled: bool,
    /// Word-overlap below which a new segment starts.
    pub continuity_threshold: f64,
    /// Number of most recent segments kept.
    pub max_segments: usize,
    /// Histories shorter than this are returned unchanged.
    pub min_messages: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            continuity_threshold: 0.1,
            max_segments: 3,
            min_messages: 10,
        }
    }
}

impl TopicConfig {
    /// Validate segmentation settings.
    ///
    /// # Errors
    /// Returns an error if values are out of range.
    pub fn validate(&self) -> MemoryResult<()> {
        check_unit_interval("compaction.topic.continuity_threshold", self.continuity_threshold)?;
        if self.max_segments == 0 {
            return Err(MemoryError::InvalidConfig(
                "compaction.topic.max_segments must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tool message filter settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolFilterConfig {
    /// Whether the filter runs inside `process`.
    pub enabled: bool,
    /// Only drop tool messages naming these tools; empty drops all of them.
    pub tool_names: Vec<String>,
}

/// Hard token ceiling applied after compaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenLimitConfig {
    /// Maximum estimated tokens kept.
    pub max_tokens: usize,
}

impl Default for TokenLimitConfig {
    fn default() -> Self {
        Self { max_tokens: 8000 }
    }
}

/// Weights of the reranking signals.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RerankWeights {
    /// Weight of the scoring-model relevance.
    pub semantic: f64,
    /// Weight of the vector similarity.
    pub vector: f64,
    /// Weight of the original rank.
    pub position: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            vector: 0.4,
            position: 0.2,
        }
    }
}

impl RerankWeights {
    /// Validate weights.
    ///
    /// # Errors
    /// Returns an error if a weight is negative or non-finite, or the sum is
    /// zero or above one.
    pub fn validate(&self) -> MemoryResult<()> {
        for (name, value) in [
            ("semantic", self.semantic),
            ("vector", self.vector),
            ("position", self.position),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryError::InvalidConfig(format!(
                    "retrieval.weights.{name} must be finite and >= 0"
                )));
            }
        }

        let sum = self.semantic + self.vector + self.position;
        if sum <= 0.0 || sum > 1.0 + 1e-6 {
            return Err(MemoryError::InvalidConfig(format!(
                "retrieval.weights must sum to a value in (0, 1], got {sum}"
            )));
        }

        Ok(())
    }
}

/// Retrieval and reranking settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Vector index holding message embeddings.
    pub index_name: String,
    /// Candidates requested from the vector index.
    pub top_k_initial: usize,
    /// Results kept after reranking.
    pub top_k_final: usize,
    /// Messages loaded before each hit.
    pub context_before: usize,
    /// Messages loaded after each hit.
    pub context_after: usize,
    /// Reranking weights.
    pub weights: RerankWeights,
    /// Deadline for the scoring model call, in milliseconds.
    pub scoring_timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_name: "thread_messages".to_string(),
            top_k_initial: 20,
            top_k_final: 5,
            context_before: 1,
            context_after: 1,
            weights: RerankWeights::default(),
            scoring_timeout_ms: Some(10_000),
        }
    }
}

impl RetrievalConfig {
    /// Validate retrieval invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        validate_identifier("retrieval.index_name", &self.index_name)?;

        if self.top_k_initial == 0 || self.top_k_final == 0 {
            return Err(MemoryError::InvalidConfig(
                "retrieval.top_k_initial and retrieval.top_k_final must be > 0".to_string(),
            ));
        }

        if self.top_k_final > self.top_k_initial {
            return Err(MemoryError::InvalidConfig(
                "retrieval.top_k_final must be <= retrieval.top_k_initial".to_string(),
            ));
        }

        if self.scoring_timeout_ms == Some(0) {
            return Err(MemoryError::InvalidConfig(
                "retrieval.scoring_timeout_ms must be > 0 when set".to_string(),
            ));
        }

        self.weights.validate()
    }
}

/// Storage configuration for the `SQLite` backends.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Thread table name.
    pub threads_table: String,
    /// Message table name.
    pub messages_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("memory.sqlite"),
            threads_table: "memory_threads".to_string(),
            messages_table: "memory_messages".to_string(),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// Query embeddings kept in the LRU cache.
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
            cache_capacity: 256,
        }
    }
}

/// Scoring model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for scoring calls.
    pub temperature: f64,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "ministral-3:8b-instruct-2512-q8_0".to_string(),
            temperature: 0.0,
            base_url: None,
        }
    }
}

fn check_unit_interval(name: &str, value: f64) -> MemoryResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(MemoryError::InvalidConfig(format!(
            "{name} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Ensure a name is safe to interpolate as a SQL identifier.
///
/// # Errors
/// Returns an error if the name is empty or contains characters outside `[A-Za-z0-9_]`.
pub fn validate_identifier(field: &str, name: &str) -> MemoryResult<()> {
    let regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .map_err(|err| MemoryError::InvalidConfig(format!("invalid regex: {err}")))?;
    if !regex.is_match(name) {
        return Err(MemoryError::InvalidConfig(format!(
            "{field} must match [A-Za-z_][A-Za-z0-9_]* (max 63 chars), got {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        MemoryConfig::default().validate().unwrap();
    }

    #[test]
    fn reserved_slots_floor_the_ratio() {
        let config = CompactionConfig {
            max_messages: 5,
            recency_reservation_ratio: 0.4,
            ..CompactionConfig::default()
        };
        assert_eq!(config.reserved_slots(), 2);

        let config = CompactionConfig {
            max_messages: 7,
            recency_reservation_ratio: 0.3,
            ..CompactionConfig::default()
        };
        assert_eq!(config.reserved_slots(), 2);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let config = CompactionConfig {
            max_messages: 0,
            ..CompactionConfig::default()
        };
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn unordered_role_weights_are_rejected() {
        let mut config = CompactionConfig::default();
        config.scoring.tool = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn weights_above_one_are_rejected() {
        let weights = RerankWeights {
            semantic: 0.6,
            vector: 0.4,
            position: 0.2,
        };
        assert!(weights.validate().is_err());
        assert!(RerankWeights::default().validate().is_ok());
    }

    #[test]
    fn top_k_final_cannot_exceed_initial() {
        let config = RetrievalConfig {
            top_k_initial: 3,
            top_k_final: 5,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MemoryConfig::from_json_str(r#"{"compaction": {"max_mesages": 10}}"#)
            .unwrap_err();
        assert!(err.is_config_error());

        let config =
            MemoryConfig::from_json_str(r#"{"compaction": {"max_messages": 10}}"#).unwrap();
        assert_eq!(config.compaction.max_messages, 10);
        assert_eq!(config.retrieval.top_k_final, 5);
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert!(validate_identifier("t", "memory_messages").is_ok());
        assert!(validate_identifier("t", "messages; DROP TABLE x").is_err());
        assert!(validate_identifier("t", "").is_err());
    }
}
