// src/ingest/mod.rs
//! Link Source Reader: flattens heterogeneous upstream rows into
//! [`LinkRecord`]s, de-duplicated within the batch by normalized link.

pub mod providers;
pub mod types;

use crate::ingest::types::{LinkRecord, RawRow, SourceReader};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

pub const LINK_FIELDS: &[&str] = &["link", "url"];
pub const TIME_FIELDS: &[&str] = &["time", "publish timestamp", "published_at", "date"];
pub const SOURCE_LINK_FIELDS: &[&str] = &["source link", "source url"];

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_rows_total", "Raw rows read from link sources.");
        describe_counter!(
            "ingest_rows_dropped_total",
            "Rows dropped for a missing link or unusable time."
        );
        describe_counter!(
            "ingest_duplicates_total",
            "Rows removed because the normalized link was already seen in this batch."
        );
        describe_counter!("ingest_source_errors_total", "Link sources that failed to read.");
    });
}

/// Identity key for a link: entity-decoded, trimmed, lower-cased, no trailing slash.
pub fn normalize_link(link: &str) -> String {
    let decoded = html_escape::decode_html_entities(link);
    decoded.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Parse the timestamp shapes seen across upstream sources.
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%H:%M on %d-%m-%Y"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Why a row did not become a [`LinkRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDrop {
    MissingLink,
    BadTime(Option<String>),
}

pub fn record_from_row(source_name: &str, row: &RawRow) -> Result<LinkRecord, RowDrop> {
    let link = row.get_any(LINK_FIELDS).ok_or(RowDrop::MissingLink)?;
    let link = html_escape::decode_html_entities(link).trim().to_string();
    let raw_time = row.get_any(TIME_FIELDS);
    let time = raw_time
        .and_then(parse_time)
        .ok_or_else(|| RowDrop::BadTime(raw_time.map(str::to_string)))?;
    let source_link = row
        .get_any(SOURCE_LINK_FIELDS)
        .map(|s| html_escape::decode_html_entities(s).trim().to_string())
        .unwrap_or_else(|| link.clone());

    Ok(LinkRecord {
        normalized_link: normalize_link(&link),
        link,
        time,
        source_link: Some(source_link),
        source_name: source_name.to_string(),
    })
}

/// Keep the first occurrence of each normalized link. Returns (kept, removed).
pub fn dedup_within_batch(records: Vec<LinkRecord>) -> (Vec<LinkRecord>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());
    let mut removed = 0usize;
    for r in records {
        if seen.insert(r.normalized_link.clone()) {
            kept.push(r);
        } else {
            removed += 1;
        }
    }
    (kept, removed)
}

/// Read every source in configured order and return a flat, de-duplicated list.
/// A failing source is logged and skipped; the others still contribute.
pub async fn read_sources(sources: &[Box<dyn SourceReader>]) -> Vec<LinkRecord> {
    ensure_metrics_described();

    let mut all = Vec::new();
    for src in sources {
        let rows = match src.read_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(target: "ingest", source = src.name(), error = ?e, "source read failed");
                counter!("ingest_source_errors_total").increment(1);
                continue;
            }
        };
        counter!("ingest_rows_total").increment(rows.len() as u64);

        let mut dropped = 0u64;
        for (idx, row) in rows.iter().enumerate() {
            match record_from_row(src.name(), row) {
                Ok(rec) => all.push(rec),
                Err(RowDrop::MissingLink) => {
                    dropped += 1;
                    tracing::debug!(target: "ingest", source = src.name(), row = idx, "row without link dropped");
                }
                Err(RowDrop::BadTime(raw)) => {
                    dropped += 1;
                    tracing::warn!(
                        target: "ingest",
                        source = src.name(),
                        row = idx,
                        time = raw.as_deref().unwrap_or(""),
                        "row with missing or unparseable time dropped"
                    );
                }
            }
        }
        counter!("ingest_rows_dropped_total").increment(dropped);
    }

    let (kept, dup) = dedup_within_batch(all);
    counter!("ingest_duplicates_total").increment(dup as u64);
    tracing::info!(target: "ingest", kept = kept.len(), duplicates = dup, "sources read");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn normalize_link_folds_case_and_trailing_slash() {
        assert_eq!(
            normalize_link("  HTTPS://Example.com/News/A/ "),
            "https://example.com/news/a"
        );
        assert_eq!(
            normalize_link("https://x.test/a?b=1&amp;c=2"),
            "https://x.test/a?b=1&c=2"
        );
    }

    #[test]
    fn parses_upstream_time_shapes() {
        let t = parse_time("09:30 on 09-09-2024").unwrap();
        assert_eq!((t.year(), t.month(), t.day(), t.hour(), t.minute()), (2024, 9, 9, 9, 30));
        assert!(parse_time("2024-09-09 00:00:00").is_some());
        assert!(parse_time("September 3, 2024").is_some());
        assert!(parse_time("Tue, 10 Sep 2024 14:00:00 GMT").is_some());
        assert!(parse_time("2024-09-10T14:00:00Z").is_some());
        assert!(parse_time("yesterday").is_none());
    }

    #[test]
    fn row_mapping_defaults_source_link_and_drops_bad_rows() {
        let row = RawRow::new()
            .with("Link", "https://a.test/x")
            .with("Time", "2024-01-02");
        let rec = record_from_row("meds", &row).unwrap();
        assert_eq!(rec.source_link.as_deref(), Some("https://a.test/x"));
        assert_eq!(rec.source_name, "meds");

        let no_link = RawRow::new().with("Time", "2024-01-02");
        assert_eq!(record_from_row("meds", &no_link), Err(RowDrop::MissingLink));

        let bad_time = RawRow::new().with("Link", "https://a.test/x").with("Time", "soon");
        assert_eq!(
            record_from_row("meds", &bad_time),
            Err(RowDrop::BadTime(Some("soon".into())))
        );
    }
}
