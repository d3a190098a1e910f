//! Rig + Ollama plumbing shared by the embedder and the scoring model.

use reqwest::Client as ReqwestClient;
use rig::message::AssistantContent;
use rig::providers::ollama;

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Initialize tracing with a basic subscriber.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Build an Ollama client, optionally pointed at a custom base URL.
///
/// # Errors
/// Returns an error if the base URL is invalid or the client cannot be built.
pub fn ollama_client(base_url: Option<&str>) -> MemoryResult<ollama::Client<ReqwestClient>> {
    let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
    let builder = if let Some(base_url) = base_url {
        url::Url::parse(base_url)?;
        builder.base_url(base_url)
    } else {
        builder
    };
    builder.build().map_err(MemoryError::from)
}

/// Concatenate the text parts of a completion choice.
pub(crate) fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
