//! Removal of tool call traffic from a history.

use serde_json::Value;

use crate::memory::core::config::ToolFilterConfig;
use crate::memory::core::message::{Message, Role};

/// Drop tool messages; when `tool_names` is set, only those naming one of them.
#[must_use]
pub fn filter_tool_messages(messages: Vec<Message>, config: &ToolFilterConfig) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|message| {
            message.role != Role::Tool
                || (!config.tool_names.is_empty()
                    && !config
                        .tool_names
                        .iter()
                        .any(|name| names_tool(&message.content, name)))
        })
        .collect()
}

/// Whether a tool message was produced by `name`.
///
/// Recognizes `name: output` prefixes and JSON payloads with a `tool` field.
fn names_tool(content: &str, name: &str) -> bool {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix(name)
        && rest.trim_start().starts_with(':')
    {
        return true;
    }

    serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|payload| {
            payload
                .get("tool")
                .and_then(Value::as_str)
                .map(|tool| tool == name)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<Message> {
        vec![
            Message::new(Role::User, "what is the weather", 0),
            Message::new(Role::Tool, "weather: 21C and sunny", 1),
            Message::new(Role::Tool, r#"{"tool": "calendar", "events": []}"#, 2),
            Message::new(Role::Assistant, "It is sunny.", 3),
        ]
    }

    #[test]
    fn drops_all_tool_messages_by_default() {
        let kept = filter_tool_messages(history(), &ToolFilterConfig::default());
        let indexes: Vec<u64> = kept.iter().map(|m| m.sequence_index).collect();
        assert_eq!(indexes, vec![0, 3]);
    }

    #[test]
    fn named_filter_keeps_other_tools() {
        let config = ToolFilterConfig {
            enabled: true,
            tool_names: vec!["calendar".to_string()],
        };
        let kept = filter_tool_messages(history(), &config);
        let indexes: Vec<u64> = kept.iter().map(|m| m.sequence_index).collect();
        assert_eq!(indexes, vec![0, 1, 3]);
    }
}
