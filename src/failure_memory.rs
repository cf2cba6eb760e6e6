// src/failure_memory.rs
//! Short-term memory of links whose content failed the article check.
//! One row per link, overwritten on each failure; rows older than the
//! cooldown count as absent and are pruned on save.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::ingest::normalize_link;

#[derive(Debug, Clone)]
pub struct FailureMemory {
    path: PathBuf,
    cooldown: Duration,
    entries: HashMap<String, DateTime<Utc>>,
}

impl FailureMemory {
    /// Load from `path`. A missing file is empty; an unreadable one is logged
    /// and treated as empty so a bad file never blocks a run.
    pub fn load(path: impl AsRef<Path>, cooldown_secs: u64) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str::<HashMap<String, DateTime<Utc>>>(&s).unwrap_or_else(|e| {
                tracing::warn!(target: "failure_memory", path = %path.display(), error = %e, "unparseable failure memory, starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(target: "failure_memory", path = %path.display(), error = %e, "unreadable failure memory, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            cooldown: Duration::seconds(
                i64::try_from(cooldown_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1_000),
            ),
            entries,
        }
    }

    pub fn last_failed_at(&self, link: &str) -> Option<DateTime<Utc>> {
        self.entries.get(&normalize_link(link)).copied()
    }

    /// True while the last failure is younger than the cooldown.
    pub fn is_cooling_down(&self, link: &str, now: DateTime<Utc>) -> bool {
        match self.last_failed_at(link) {
            Some(at) => now - at < self.cooldown,
            None => false,
        }
    }

    /// Overwrite the link's failure time and persist immediately.
    pub fn record_failure(&mut self, link: &str, now: DateTime<Utc>) -> io::Result<()> {
        self.entries.insert(normalize_link(link), now);
        self.save(now)
    }

    /// Drop rows whose cooldown has elapsed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let cooldown = self.cooldown;
        self.entries.retain(|_, at| now - *at < cooldown);
        before - self.entries.len()
    }

    pub fn save(&mut self, now: DateTime<Utc>) -> io::Result<()> {
        self.prune(now);
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut f = fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_window_gates_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("failed.json");
        let t0 = Utc::now();

        let mut fm = FailureMemory::load(&p, 3600);
        assert!(!fm.is_cooling_down("https://a.test/x", t0));
        fm.record_failure("https://A.test/x/", t0).unwrap();

        let reloaded = FailureMemory::load(&p, 3600);
        assert!(reloaded.is_cooling_down("https://a.test/x", t0 + Duration::minutes(59)));
        assert!(!reloaded.is_cooling_down("https://a.test/x", t0 + Duration::minutes(60)));
    }

    #[test]
    fn overwrite_not_append_and_prune_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("failed.json");
        let t0 = Utc::now();
        let mut fm = FailureMemory::load(&p, 60);
        fm.record_failure("https://a.test/old", t0).unwrap();
        fm.record_failure("https://a.test/x", t0).unwrap();
        fm.record_failure("https://a.test/x", t0 + Duration::seconds(30)).unwrap();
        assert_eq!(fm.len(), 2);
        assert_eq!(fm.last_failed_at("https://a.test/x"), Some(t0 + Duration::seconds(30)));

        fm.record_failure("https://a.test/new", t0 + Duration::seconds(70)).unwrap();
        assert!(fm.last_failed_at("https://a.test/old").is_none());
        assert_eq!(FailureMemory::load(&p, 60).len(), 2);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("failed.json");
        fs::write(&p, "[[[").unwrap();
        assert!(FailureMemory::load(&p, 60).is_empty());
    }
}
