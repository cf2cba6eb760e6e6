// src/ingest/providers/rss_feed.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::types::{RawRow, SourceReader};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// RSS snapshot saved by a scraper; `<link>` and `<pubDate>` become `Link`/`Time`.
pub struct RssFeedSource {
    name: String,
    path: PathBuf,
}

impl RssFeedSource {
    pub fn new(name: &str, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn parse_str(xml: &str) -> Result<Vec<RawRow>> {
        let rss: Rss = from_str(&scrub_html_entities_for_xml(xml)).context("parsing rss xml")?;
        Ok(rss
            .channel
            .item
            .into_iter()
            .map(|it| {
                let mut row = RawRow::new();
                if let Some(link) = it.link {
                    row.insert("link", link);
                }
                if let Some(ts) = it.pub_date {
                    row.insert("time", ts);
                }
                row
            })
            .collect())
    }
}

#[async_trait]
impl SourceReader for RssFeedSource {
    async fn read_rows(&self) -> Result<Vec<RawRow>> {
        if !self.path.exists() {
            tracing::warn!(target: "ingest", source = %self.name, path = %self.path.display(), "rss snapshot missing, skipping");
            return Ok(Vec::new());
        }
        let xml = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        Self::parse_str(&xml)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_map_to_link_and_time() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
<item><title>One&nbsp;x</title><link>https://a.test/1</link><pubDate>Tue, 10 Sep 2024 14:00:00 GMT</pubDate></item>
<item><title>No date</title><link>https://a.test/2</link></item>
</channel></rss>"#;
        let rows = RssFeedSource::parse_str(xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_any(&["Link"]), Some("https://a.test/1"));
        assert!(rows[0].get_any(&["Time"]).is_some());
        assert_eq!(rows[1].get_any(&["Time"]), None);
    }
}
