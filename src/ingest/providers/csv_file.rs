// src/ingest/providers/csv_file.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::ingest::types::{RawRow, SourceReader};

/// Scraper output written as CSV with a header row (`Link`, `Time`, ...).
pub struct CsvFileSource {
    name: String,
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(name: &str, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn parse_str(content: &str) -> Result<Vec<RawRow>> {
        parse_reader(content.as_bytes())
    }
}

fn parse_reader<R: std::io::Read>(rdr: R) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);
    let headers = reader.headers().context("reading csv header")?.clone();

    let mut out = Vec::new();
    for (idx, rec) in reader.records().enumerate() {
        let rec = rec.with_context(|| format!("csv record {}", idx + 1))?;
        let mut row = RawRow::new();
        for (h, v) in headers.iter().zip(rec.iter()) {
            row.insert(h, v);
        }
        out.push(row);
    }
    Ok(out)
}

#[async_trait]
impl SourceReader for CsvFileSource {
    async fn read_rows(&self) -> Result<Vec<RawRow>> {
        if !self.path.exists() {
            tracing::warn!(target: "ingest", source = %self.name, path = %self.path.display(), "csv source missing, skipping");
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        parse_reader(file).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
