pub mod csv_file;
pub mod documents;
pub mod rss_feed;

use crate::config::pipeline::{SourceConfig, SourceKind};
use crate::ingest::types::SourceReader;

/// Build a reader for one configured upstream source.
pub fn from_config(cfg: &SourceConfig) -> Box<dyn SourceReader> {
    match cfg.kind {
        SourceKind::Csv => Box::new(csv_file::CsvFileSource::new(&cfg.name, &cfg.path)),
        SourceKind::Documents => Box::new(documents::DocumentSource::new(&cfg.name, &cfg.path)),
        SourceKind::Rss => Box::new(rss_feed::RssFeedSource::new(&cfg.name, &cfg.path)),
    }
}
