//! Importance scoring for conversation messages.
//!
//! A message's score starts from its role weight and is adjusted by
//! importance keywords, recency, verbosity and whether it asks something.

use regex::Regex;

use crate::memory::core::config::{CompactionConfig, ScoringWeights};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::message::{Message, Role, ScoredMessage};

/// Pure importance scorer built from compaction settings.
#[derive(Clone, Debug)]
pub struct ImportanceScorer {
    weights: ScoringWeights,
    keywords: Vec<String>,
    verbose_threshold: usize,
    question: Regex,
}

impl ImportanceScorer {
    /// Build a scorer from compaction settings.
    ///
    /// # Errors
    /// Returns an error if the interrogative pattern cannot be compiled.
    pub fn new(config: &CompactionConfig) -> MemoryResult<Self> {
        let question = Regex::new(r"(?i)\b(how|what|why)\b")
            .map_err(|err| MemoryError::InvalidConfig(format!("invalid regex: {err}")))?;
        Ok(Self {
            weights: config.scoring.clone(),
            keywords: config
                .importance_keywords
                .iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .collect(),
            verbose_threshold: config.verbose_message_threshold,
            question,
        })
    }

    /// Score every message, preserving order.
    ///
    /// # Errors
    /// Returns `MemoryError::Processing` if a score is not finite.
    pub fn score(&self, messages: &[Message]) -> MemoryResult<Vec<ScoredMessage>> {
        let total = messages.len();
        let mut scored = Vec::with_capacity(total);

        for (position, message) in messages.iter().enumerate() {
            let distance = total - 1 - position;
            let score = self.score_one(message, distance);
            if !score.is_finite() {
                return Err(MemoryError::Processing(format!(
                    "non-finite importance score for message {}",
                    message.sequence_index
                )));
            }
            scored.push(ScoredMessage::new(message.clone(), score));
        }

        Ok(scored)
    }

    #[allow(clippy::cast_precision_loss)]
    fn score_one(&self, message: &Message, distance: usize) -> f64 {
        let lowered = message.content.to_lowercase();
        let mut score = self.role_weight(message.role);

        let occurrences: usize = self
            .keywords
            .iter()
            .map(|keyword| lowered.matches(keyword.as_str()).count())
            .sum();
        score += self.weights.keyword_bonus * occurrences as f64;

        score += (-self.weights.recency_decay * distance as f64).exp();

        if message.char_len() > self.verbose_threshold {
            score *= self.weights.verbosity_penalty;
        }

        if lowered.contains('?') || self.question.is_match(&lowered) {
            score += self.weights.question_bonus;
        }

        score
    }

    const fn role_weight(&self, role: Role) -> f64 {
        match role {
            Role::System => self.weights.system,
            Role::User => self.weights.user,
            Role::Assistant => self.weights.assistant,
            Role::Tool => self.weights.tool,
        }
    }
}
