//! Relevance scoring with an Ollama completion model.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::providers::ollama;
use serde_json::Value;

use crate::memory::adapters::rig_adapter::{extract_text, ollama_client};
use crate::memory::core::config::LlmConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::thread::Candidate;
use crate::memory::retrieval::scoring::ScoringModel;

/// Characters of candidate text shown to the model.
const MAX_DOCUMENT_CHARS: usize = 600;

const SYSTEM_PROMPT: &str = "You rate how relevant each document is to a search query. Return a strict JSON array of objects with fields: id (string, copied from the input) and score (number between 0 and 1). Include every document exactly once.";

/// LLM-backed scoring model.
pub struct LlmScorer {
    model: ollama::CompletionModel<ReqwestClient>,
    model_name: String,
    temperature: f64,
}

impl LlmScorer {
    /// Create a scorer from the completion model config.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(llm: &LlmConfig) -> MemoryResult<Self> {
        let client = ollama_client(llm.base_url.as_deref())?;
        Ok(Self {
            model: client.completion_model(llm.model.clone()),
            model_name: llm.model.clone(),
            temperature: llm.temperature,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct ScoreEntry {
    id: Value,
    score: f64,
}

fn build_prompt(query: &str, candidates: &[Candidate]) -> String {
    let mut prompt = format!("Query:\n{query}\n\nDocuments:\n");
    for candidate in candidates {
        let text: String = candidate
            .text()
            .unwrap_or_default()
            .chars()
            .take(MAX_DOCUMENT_CHARS)
            .collect();
        prompt.push_str(&format!("- id: {}\n  text: {}\n", candidate.id, text.replace('\n', " ")));
    }
    prompt
}

/// Parse the first JSON array in a model reply into `id -> score`.
fn parse_scores(reply: &str) -> MemoryResult<HashMap<String, f64>> {
    let start = reply
        .find('[')
        .ok_or_else(|| MemoryError::Scoring("reply contains no JSON array".to_string()))?;
    let entries: Vec<ScoreEntry> = serde_json::Deserializer::from_str(&reply[start..])
        .into_iter::<Vec<ScoreEntry>>()
        .next()
        .ok_or_else(|| MemoryError::Scoring("reply contains no JSON array".to_string()))?
        .map_err(|err| MemoryError::Scoring(format!("malformed score array: {err}")))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let id = match entry.id {
                Value::String(id) => id,
                Value::Number(id) => id.to_string(),
                _ => return None,
            };
            entry.score.is_finite().then_some((id, entry.score))
        })
        .collect())
}

#[async_trait]
impl ScoringModel for LlmScorer {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn score(&self, query: &str, candidates: &[Candidate]) -> MemoryResult<Vec<Candidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .model
            .completion_request(build_prompt(query, candidates))
            .preamble(SYSTEM_PROMPT.to_string())
            .temperature(self.temperature)
            .build();

        let response = self.model.completion(request).await?;
        let scores = parse_scores(&extract_text(&response.choice))?;

        Ok(candidates
            .iter()
            .filter_map(|candidate| {
                scores.get(&candidate.id).map(|&score| Candidate {
                    score,
                    ..candidate.clone()
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_first_array_and_ignores_chatter() {
        let reply = r#"Sure! Here you go:
[{"id": "m-1", "score": 0.9}, {"id": 7, "score": 0.2}]
Then some trailing text [1, 2]"#;
        let scores = parse_scores(reply).unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores["m-1"] - 0.9).abs() < 1e-12);
        assert!((scores["7"] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn reply_without_array_is_a_scoring_error() {
        let err = parse_scores("I cannot help with that").unwrap_err();
        assert_eq!(err.code(), "SCORING_FAILED");
    }

    #[test]
    fn malformed_entries_are_a_scoring_error() {
        assert!(parse_scores(r#"[{"id": "a"}]"#).is_err());
    }

    #[test]
    fn prompt_lists_every_candidate_id() {
        let candidates = vec![
            Candidate {
                id: "a".to_string(),
                score: 0.1,
                metadata: serde_json::Map::new(),
            },
            Candidate {
                id: "b".to_string(),
                score: 0.2,
                metadata: serde_json::Map::new(),
            },
        ];
        let prompt = build_prompt("deploys", &candidates);
        assert!(prompt.contains("- id: a"));
        assert!(prompt.contains("- id: b"));
    }
}
