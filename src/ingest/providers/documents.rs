// src/ingest/providers/documents.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::ingest::types::{RawRow, SourceReader};

/// A document-store export: a JSON array of documents, or JSON Lines with one
/// document per line. Only scalar top-level fields are kept.
pub struct DocumentSource {
    name: String,
    path: PathBuf,
}

impl DocumentSource {
    pub fn new(name: &str, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn parse_str(content: &str) -> Result<Vec<RawRow>> {
        let trimmed = content.trim_start();
        if trimmed.starts_with('[') {
            let docs: Vec<Value> = serde_json::from_str(trimmed).context("parsing json array")?;
            return docs.iter().map(doc_to_row).collect();
        }
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                let v: Value =
                    serde_json::from_str(l).with_context(|| format!("json line {}", i + 1))?;
                doc_to_row(&v)
            })
            .collect()
    }
}

fn doc_to_row(v: &Value) -> Result<RawRow> {
    let obj: &Map<String, Value> = v.as_object().ok_or_else(|| anyhow!("document is not an object"))?;
    let mut row = RawRow::new();
    for (k, val) in obj {
        match val {
            Value::String(s) => row.insert(k, s.as_str()),
            Value::Number(n) => row.insert(k, n.to_string()),
            Value::Bool(b) => row.insert(k, b.to_string()),
            _ => {}
        }
    }
    Ok(row)
}

#[async_trait]
impl SourceReader for DocumentSource {
    async fn read_rows(&self) -> Result<Vec<RawRow>> {
        if !self.path.exists() {
            tracing::warn!(target: "ingest", source = %self.name, path = %self.path.display(), "document export missing, skipping");
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        Self::parse_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_and_json_lines_both_parse() {
        let arr = r#"[{"Link":"https://a.test/1","Time":"2024-09-01","Source":"Sifted","tags":["x"]}]"#;
        let rows = DocumentSource::parse_str(arr).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_any(&["link"]), Some("https://a.test/1"));
        assert_eq!(rows[0].len(), 3);

        let jsonl = "{\"link\":\"https://a.test/1\",\"time\":\"2024-09-01\"}\n\n{\"link\":\"https://a.test/2\",\"time\":\"2024-09-02\"}\n";
        assert_eq!(DocumentSource::parse_str(jsonl).unwrap().len(), 2);
    }

    #[test]
    fn non_object_document_is_an_error() {
        assert!(DocumentSource::parse_str("[1,2]").is_err());
    }
}
