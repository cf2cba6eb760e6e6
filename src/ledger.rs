// src/ledger.rs
//! Deduplication ledger: append-only record of links already published.
//!
//! The store is read in full once per run into a [`Ledger`] snapshot, which
//! answers "was this link processed?" and "is this image already used?".
//! [`Ledger::append`] is the only mutator and is called once per confirmed
//! batch publish.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::LedgerError;
use crate::generate::GeneratedPost;
use crate::image::normalize_image_url;
use crate::ingest::normalize_link;
use crate::ingest::types::LinkRecord;

/// A published post plus its downstream identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub ledger_id: String,
    pub downstream_id: String,
    #[serde(flatten)]
    pub post: GeneratedPost,
}

impl LedgerEntry {
    pub fn new(post: GeneratedPost, downstream_id: String) -> Self {
        Self {
            ledger_id: ledger_id(&post.link),
            downstream_id,
            post,
        }
    }
}

/// Content-addressed entry id: hex SHA-256 of the normalized link.
pub fn ledger_id(link: &str) -> String {
    let digest = Sha256::digest(normalize_link(link).as_bytes());
    format!("{digest:x}")
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError>;
    async fn append(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError>;
}

/// JSON Lines file, one entry per line. A missing file is an empty ledger.
pub struct JsonlLedgerStore {
    path: PathBuf,
}

impl JsonlLedgerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn io_err(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl LedgerStore for JsonlLedgerStore {
    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                serde_json::from_str(l).map_err(|e| LedgerError::Corrupt {
                    line: i + 1,
                    message: e.to_string(),
                })
            })
            .collect()
    }

    async fn append(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for e in entries {
            let line = serde_json::to_string(e).map_err(|e| LedgerError::Backend(e.to_string()))?;
            buf.push_str(&line);
            buf.push('\n');
        }
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        // One write for the whole batch so entries land together.
        f.write_all(buf.as_bytes()).map_err(|e| self.io_err(e))?;
        f.sync_all().map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

/// In-run snapshot of the ledger.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    links: HashSet<String>,
    images: HashSet<String>,
}

impl Ledger {
    /// Reads the whole store once.
    pub async fn load(store: &dyn LedgerStore) -> Result<Self, LedgerError> {
        let entries = store.load_all().await?;
        Ok(Self::from_entries(&entries))
    }

    pub fn from_entries(entries: &[LedgerEntry]) -> Self {
        let mut ledger = Self::default();
        for e in entries {
            ledger.remember(e);
        }
        ledger
    }

    fn remember(&mut self, e: &LedgerEntry) {
        self.links.insert(normalize_link(&e.post.link));
        if !e.post.image_url.trim().is_empty() {
            self.images.insert(normalize_image_url(&e.post.image_url));
        }
    }

    /// Candidates whose normalized link is not yet in the ledger, order kept.
    pub fn filter_already_processed(&self, candidates: Vec<LinkRecord>) -> Vec<LinkRecord> {
        candidates
            .into_iter()
            .filter(|c| !self.links.contains(&c.normalized_link))
            .collect()
    }

    /// Normalized image URLs of every ledgered post.
    pub fn image_urls(&self) -> &HashSet<String> {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Persist `entries` in one store call and fold them into the snapshot.
    pub async fn append(
        &mut self,
        store: &dyn LedgerStore,
        entries: &[LedgerEntry],
    ) -> Result<(), LedgerError> {
        store.append(entries).await?;
        for e in entries {
            self.remember(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_id_ignores_case_and_trailing_slash() {
        assert_eq!(ledger_id("https://A.test/x/"), ledger_id("https://a.test/x"));
        assert_ne!(ledger_id("https://a.test/x"), ledger_id("https://a.test/y"));
        assert_eq!(ledger_id("https://a.test/x").len(), 64);
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlLedgerStore::new(dir.path().join("nope.jsonl"));
        let ledger = Ledger::load(&store).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn corrupt_line_is_reported_with_its_number() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ledger.jsonl");
        fs::write(&p, "\n{not json}\n").unwrap();
        let err = JsonlLedgerStore::new(&p).load_all().await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 2, .. }), "{err}");
    }
}
