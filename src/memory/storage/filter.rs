//! Equality filters over index entry metadata.
//!
//! Filters are validated before any I/O. Keys are restricted to a safe
//! character set so backends can embed them in queries.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::thread::Metadata;

/// Longest accepted filter key, in bytes.
pub const MAX_FILTER_KEY_LEN: usize = 256;

/// Conjunction of `key == value` conditions on metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    conditions: Metadata,
}

impl MetadataFilter {
    /// Empty filter; matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Build from a raw JSON object.
    #[must_use]
    pub const fn from_metadata(conditions: Metadata) -> Self {
        Self { conditions }
    }

    /// Whether there are no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Conditions in key order.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Check every key and value.
    ///
    /// # Errors
    /// Returns `InvalidFilter` for empty, oversized, `$`-prefixed or
    /// malformed keys, and for null or non-scalar values.
    pub fn validate(&self) -> MemoryResult<()> {
        let pattern = Regex::new(r"^[A-Za-z0-9_.$\-]+$")
            .map_err(|err| MemoryError::InvalidFilter(format!("invalid regex: {err}")))?;

        for (key, value) in &self.conditions {
            if key.is_empty() {
                return Err(MemoryError::InvalidFilter("empty filter key".to_string()));
            }
            if key.len() > MAX_FILTER_KEY_LEN {
                return Err(MemoryError::InvalidFilter(format!(
                    "filter key exceeds {MAX_FILTER_KEY_LEN} bytes"
                )));
            }
            if key.starts_with('$') {
                return Err(MemoryError::InvalidFilter(format!(
                    "operator-like filter key '{key}'"
                )));
            }
            if !pattern.is_match(key) {
                return Err(MemoryError::InvalidFilter(format!(
                    "filter key '{key}' contains unsupported characters"
                )));
            }
            match value {
                Value::Null => {
                    return Err(MemoryError::InvalidFilter(format!(
                        "filter key '{key}' has a null value"
                    )));
                }
                Value::Array(_) | Value::Object(_) => {
                    return Err(MemoryError::InvalidFilter(format!(
                        "filter key '{key}' must map to a scalar"
                    )));
                }
                Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
            }
        }
        Ok(())
    }

    /// Whether `metadata` satisfies every condition.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| metadata.get(key).is_some_and(|actual| actual == expected))
    }
}
