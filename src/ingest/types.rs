// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One upstream article reference, uniform across source kinds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LinkRecord {
    pub link: String,
    /// Identity key for deduplication (see `normalize_link`).
    pub normalized_link: String,
    pub time: DateTime<Utc>,
    pub source_link: Option<String>,
    pub source_name: String, // configured source name, e.g. "sifted"
}

/// Untyped upstream row. Keys are folded with [`field_key`] on insert so
/// `Source Link`, `source_link` and `sourceLink` all land on the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(field_key(key), value.into());
    }

    /// First non-blank value among `aliases`.
    pub fn get_any(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .filter_map(|a| self.fields.get(&field_key(a)))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub fn field_key(k: &str) -> String {
    k.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[async_trait::async_trait]
pub trait SourceReader: Send + Sync {
    async fn read_rows(&self) -> Result<Vec<RawRow>>;
    fn name(&self) -> &str;
}
