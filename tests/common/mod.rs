#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rig::embeddings::Embedding;
use thread_memory::memory::{
    Candidate, EmbedFuture, Embedder, InMemoryMessageStore, InMemoryVectorIndex, MemoryBackends,
    MemoryConfig, MemoryError, MemoryPipeline, MemoryResult, Message, MessageStore, Role,
    ScoringModel,
};

/// Bag-of-letters embedder: deterministic, no model required.
pub struct Letters;

impl Embedder for Letters {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        let mut vec = vec![0.0; 26];
        for c in text
            .to_ascii_lowercase()
            .bytes()
            .filter(u8::is_ascii_lowercase)
        {
            vec[usize::from(c - b'a')] += 1.0;
        }
        let document = text.to_string();
        Box::pin(async move { Ok(Embedding { document, vec }) })
    }

    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed_text(&text).await?);
            }
            Ok(out)
        })
    }

    fn ndims(&self) -> usize {
        26
    }
}

/// Scorer returning fixed scores by candidate text, counting calls.
pub struct ByText {
    pub scores: HashMap<String, f64>,
    pub calls: AtomicUsize,
}

impl ByText {
    pub fn new(scores: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            scores: scores
                .iter()
                .map(|(text, score)| ((*text).to_string(), *score))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringModel for ByText {
    fn name(&self) -> &str {
        "by-text"
    }

    async fn score(&self, _query: &str, candidates: &[Candidate]) -> MemoryResult<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(candidates
            .iter()
            .map(|candidate| Candidate {
                score: candidate
                    .text()
                    .and_then(|text| self.scores.get(text).copied())
                    .unwrap_or(0.0),
                ..candidate.clone()
            })
            .collect())
    }
}

/// Scorer that always fails.
pub struct Offline;

#[async_trait]
impl ScoringModel for Offline {
    fn name(&self) -> &str {
        "offline"
    }

    async fn score(&self, _query: &str, _candidates: &[Candidate]) -> MemoryResult<Vec<Candidate>> {
        Err(MemoryError::Scoring("connection refused".to_string()))
    }
}

/// Scorer that never answers in time.
pub struct Stalled;

#[async_trait]
impl ScoringModel for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn score(&self, _query: &str, candidates: &[Candidate]) -> MemoryResult<Vec<Candidate>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(candidates.to_vec())
    }
}

pub fn in_memory_pipeline(
    config: MemoryConfig,
    scorer: Arc<dyn ScoringModel>,
) -> (MemoryPipeline, Arc<InMemoryMessageStore>) {
    let store = Arc::new(InMemoryMessageStore::new());
    let store_handle: Arc<dyn MessageStore> = store.clone();
    let backends = MemoryBackends {
        message_store: store_handle,
        vector_index: Arc::new(InMemoryVectorIndex::new()),
        embedder: Arc::new(Letters),
        scorer,
    };
    (MemoryPipeline::new(config, backends).unwrap(), store)
}

pub fn indexes(messages: &[Message]) -> Vec<u64> {
    messages.iter().map(|m| m.sequence_index).collect()
}

pub fn conversation(contents: &[&str]) -> Vec<Message> {
    contents
        .iter()
        .zip(0_u64..)
        .map(|(content, i)| {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            Message::new(role, *content, i)
        })
        .collect()
}
