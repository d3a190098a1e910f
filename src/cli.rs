//! Command-line compaction of a transcript file.
//!
//! Usage: `thread-memory <transcript.json> [config.json]`. The transcript is
//! a JSON array of `{role, content, sequence_index?}` objects; entries without
//! a `sequence_index` take their array position. The compacted history is
//! written to stdout as pretty JSON.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::memory::adapters::init_tracing;
use crate::memory::core::config::MemoryConfig;
use crate::memory::core::message::{Message, Role};
use crate::memory::engine::pipeline::CompactionPipeline;

#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    role: Role,
    content: String,
    #[serde(default)]
    sequence_index: Option<u64>,
}

/// Parse a transcript document into messages.
///
/// # Errors
/// Returns an error if the document is not a JSON array of messages.
pub fn parse_transcript(raw: &str) -> anyhow::Result<Vec<Message>> {
    let entries: Vec<TranscriptEntry> =
        serde_json::from_str(raw).context("transcript must be a JSON array of messages")?;
    Ok(entries
        .into_iter()
        .zip(0_u64..)
        .map(|(entry, position)| {
            Message::new(
                entry.role,
                entry.content,
                entry.sequence_index.unwrap_or(position),
            )
        })
        .collect())
}

/// Load the configuration file, or defaults when no path is given.
///
/// # Errors
/// Returns an error if the file cannot be read or is invalid.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<MemoryConfig> {
    let Some(path) = path else {
        return Ok(MemoryConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    MemoryConfig::from_json_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))
}

/// Compact the transcript at `args[0]` with the optional config at `args[1]`.
///
/// # Errors
/// Returns an error on bad arguments, unreadable files or invalid config.
pub fn compact_files(args: &[String]) -> anyhow::Result<Vec<Message>> {
    let (transcript, config) = match args {
        [transcript] => (transcript, None),
        [transcript, config] => (transcript, Some(Path::new(config.as_str()))),
        _ => bail!("usage: thread-memory <transcript.json> [config.json]"),
    };

    let config = load_config(config)?;
    let raw = std::fs::read_to_string(transcript)
        .with_context(|| format!("failed to read transcript {transcript}"))?;
    let messages = parse_transcript(&raw)?;
    let pipeline = CompactionPipeline::from_config(&config.compaction)?;

    let input = messages.len();
    let output = pipeline.process(messages);
    tracing::info!(input, output = output.len(), "Compacted transcript");
    Ok(output)
}

/// Binary entry point.
///
/// # Returns
/// `ExitCode::SUCCESS` when the compacted history was written, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let result = compact_files(&args).and_then(|messages| {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &messages)?;
        writeln!(stdout)?;
        Ok(())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_fill_missing_sequence_indexes() {
        let messages = parse_transcript(
            r#"[
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello", "sequence_index": 10}
            ]"#,
        )
        .unwrap();
        assert_eq!(messages[0].sequence_index, 0);
        assert_eq!(messages[1].sequence_index, 10);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn rejects_non_array_transcripts() {
        assert!(parse_transcript(r#"{"role": "user"}"#).is_err());
    }

    #[test]
    fn wrong_argument_count_is_a_usage_error() {
        let err = compact_files(&[]).unwrap_err();
        assert!(err.to_string().starts_with("usage:"));
    }
}
