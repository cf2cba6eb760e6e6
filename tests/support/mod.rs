// tests/support/mod.rs
// Fakes for every pipeline seam. Behavior is driven by markers in page text
// so each test only has to describe its links.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scrapegen::config::PipelineConfig;
use scrapegen::error::{FetchError, ImageError, LedgerError, LlmError, PublishError};
use scrapegen::generate::fetch::PageFetcher;
use scrapegen::generate::prompts::{ARTICLE_CHECK_PROMPT, IMAGE_QUERY_PROMPT};
use scrapegen::image::{ImageSearch, ImageSourcer, SearchImageSourcer};
use scrapegen::ingest::types::{RawRow, SourceReader};
use scrapegen::ledger::{LedgerEntry, LedgerStore};
use scrapegen::llm::{DynLlm, LlmClient, LlmRequest, LlmResponse, TokenUsage};
use scrapegen::pipeline::{rate_limited_llm, Clients};
use scrapegen::publish::{PostPayload, PublishTransport};
use scrapegen::retry::RetryPolicy;
use scrapegen::Pipeline;

/// Page markers understood by [`FakeLlm`].
pub const NOT_ARTICLE: &str = "[cookie wall]";
pub const EMPTY_ARTICLE: &str = "[blank extraction]";
pub const SCHEMA_BREAK: &str = "[off-vocabulary]";

pub const VALID_POST_JSON: &str = r###"{"postText":"## Headline\n**Big** news from the ward. #AI","hashtags":["ai","MedTech"],"category":"Clinical Practice"}"###;

// ---------- sources ----------

pub struct StaticSource {
    pub name: String,
    pub rows: Vec<RawRow>,
}

impl StaticSource {
    pub fn links(name: &str, links: &[&str]) -> Box<dyn SourceReader> {
        Box::new(Self {
            name: name.into(),
            rows: links
                .iter()
                .map(|l| RawRow::new().with("Link", *l).with("Time", "2024-05-01T10:00:00Z"))
                .collect(),
        })
    }
}

#[async_trait]
impl SourceReader for StaticSource {
    async fn read_rows(&self) -> anyhow::Result<Vec<RawRow>> {
        Ok(self.rows.clone())
    }
    fn name(&self) -> &str {
        &self.name
    }
}

// ---------- page fetcher ----------

#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, String>>,
    /// Status codes returned (in order) before the page is served.
    failures: Mutex<HashMap<String, Vec<u16>>>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn page(&self, link: &str, text: &str) {
        self.pages.lock().unwrap().insert(link.to_lowercase(), text.into());
    }

    pub fn fail_with(&self, link: &str, statuses: &[u16]) {
        self.failures
            .lock()
            .unwrap()
            .insert(link.to_lowercase(), statuses.to_vec());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, link: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = link.to_lowercase();
        if let Some(queue) = self.failures.lock().unwrap().get_mut(&key) {
            if !queue.is_empty() {
                let status = queue.remove(0);
                return Err(FetchError::Http { url: link.into(), status });
            }
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("Full article text for {link}. Doctors welcome the change.")))
    }
}

// ---------- llm ----------

#[derive(Default)]
pub struct FakeLlm {
    pub requests: Mutex<Vec<LlmRequest>>,
    /// Errors returned (in order) before normal replies resume.
    pub errors: Mutex<Vec<LlmError>>,
}

impl FakeLlm {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn article_checks(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_prompt == ARTICLE_CHECK_PROMPT)
            .count()
    }

    pub fn generations(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.response_schema.is_some())
            .count()
    }

    pub fn push_error(&self, e: LlmError) {
        self.errors.lock().unwrap().push(e);
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(req.clone());
        {
            let mut errs = self.errors.lock().unwrap();
            if !errs.is_empty() {
                return Err(errs.remove(0));
            }
        }
        let text = if req.system_prompt == ARTICLE_CHECK_PROMPT {
            if req.user_content.contains(NOT_ARTICLE) {
                "None".to_string()
            } else if req.user_content.contains(EMPTY_ARTICLE) {
                "   ".to_string()
            } else {
                req.user_content.clone()
            }
        } else if req.response_schema.is_some() {
            if req.user_content.contains(SCHEMA_BREAK) {
                r#"{"postText":"x","hashtags":["Crypto"],"category":"Digital Health"}"#.to_string()
            } else {
                VALID_POST_JSON.to_string()
            }
        } else if req.system_prompt == IMAGE_QUERY_PROMPT {
            "\"hospital ward nurse\"".to_string()
        } else {
            "A photorealistic hospital ward at dawn".to_string()
        };
        Ok(LlmResponse {
            text,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
            },
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

// ---------- images ----------

/// Serves the same candidate list to every query, like a stock library with
/// a small catalogue.
pub struct FakeImageSearch {
    pub catalogue: Vec<String>,
    pub calls: AtomicUsize,
    pub fail_first: AtomicUsize,
}

impl FakeImageSearch {
    pub fn with_catalogue(n: usize) -> Self {
        Self {
            catalogue: (1..=n)
                .map(|i| format!("https://images.test/photos/{i}.jpeg?auto=compress"))
                .collect(),
            calls: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageSearch for FakeImageSearch {
    async fn search(&self, _query: &str, per_page: u32) -> Result<Vec<String>, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ImageError::Service("search http 503".into()));
        }
        Ok(self.catalogue.iter().take(per_page as usize).cloned().collect())
    }
}

// ---------- publisher ----------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PublishMode {
    Accept,
    Status(u16),
    /// Return one id fewer than submitted.
    ShortIds,
    /// Fail to connect this many times, then accept.
    ConnectFailures(usize),
}

pub struct RecordingPublisher {
    pub mode: Mutex<PublishMode>,
    pub batches: Mutex<Vec<Vec<PostPayload>>>,
    pub attempts: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new(mode: PublishMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            batches: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn set_mode(&self, mode: PublishMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published_posts(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl PublishTransport for RecordingPublisher {
    async fn send(&self, posts: &[PostPayload]) -> Result<Vec<String>, PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            PublishMode::Status(status) => {
                return Err(PublishError::Http {
                    status,
                    body: "upstream exploded".into(),
                })
            }
            PublishMode::ConnectFailures(n) if n > 0 => {
                self.set_mode(PublishMode::ConnectFailures(n - 1));
                return Err(PublishError::Transport {
                    message: "connection refused".into(),
                    connect: true,
                });
            }
            _ => {}
        }
        self.batches.lock().unwrap().push(posts.to_vec());
        let mut ids: Vec<String> = posts
            .iter()
            .map(|_| format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
            .collect();
        if mode == PublishMode::ShortIds {
            ids.pop();
        }
        Ok(ids)
    }
}

// ---------- ledger ----------

#[derive(Default)]
pub struct MemoryLedgerStore {
    pub entries: Mutex<Vec<LedgerEntry>>,
    pub appends: AtomicUsize,
}

impl MemoryLedgerStore {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn links(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.post.link.clone())
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn append(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().extend_from_slice(entries);
        Ok(())
    }
}

// ---------- harness ----------

/// Config with zero-delay retries, state files under `dir`.
pub fn test_config(dir: &Path, batch_size: usize, max_links: usize) -> PipelineConfig {
    let toml = format!(
        r#"
[ledger]
path = "{ledger}"

[failure_memory]
path = "{failed}"
cooldown_secs = 3600

[limits]
batch_size = {batch_size}
max_links_per_run = {max_links}

[llm]
api_key = "test"
rate_limit_fallback_secs = 0
max_rate_limit_wait_secs = 0

[image]
api_key = "test"

[publish]
endpoint = "http://publisher.invalid/posts"
api_token = "test"
professional_domains = ["nice.org.uk"]

[retry.fetch]
max_attempts = 3
base_delay_ms = 0
jitter = false

[retry.llm]
max_attempts = 2
base_delay_ms = 0
jitter = false

[retry.image]
max_attempts = 2
base_delay_ms = 0
jitter = false

[retry.publish]
max_attempts = 3
base_delay_ms = 0
jitter = false

[vocabulary]
hashtags = ["AI", "MedTech", "NHS"]
"#,
        ledger = dir.join("ledger.jsonl").display(),
        failed = dir.join("failed.json").display(),
    );
    PipelineConfig::from_toml_str(&toml).expect("test config")
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub config: PipelineConfig,
    pub llm: Arc<FakeLlm>,
    pub fetcher: Arc<FakeFetcher>,
    pub search: Arc<FakeImageSearch>,
    pub publisher: Arc<RecordingPublisher>,
    pub ledger: Arc<MemoryLedgerStore>,
}

impl Harness {
    pub fn new(batch_size: usize, max_links: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), batch_size, max_links);
        Self {
            dir,
            config,
            llm: Arc::new(FakeLlm::default()),
            fetcher: Arc::new(FakeFetcher::default()),
            search: Arc::new(FakeImageSearch::with_catalogue(15)),
            publisher: Arc::new(RecordingPublisher::new(PublishMode::Accept)),
            ledger: Arc::new(MemoryLedgerStore::default()),
        }
    }

    pub fn image_sourcer(&self) -> Arc<dyn ImageSourcer> {
        let llm: DynLlm = self.llm.clone();
        Arc::new(SearchImageSourcer::new(
            rate_limited_llm(&self.config, llm),
            "image-model",
            self.search.clone(),
            15,
            RetryPolicy::immediate(2),
        ))
    }

    /// Fresh pipeline over shared fakes, as a new process would build it.
    pub fn pipeline(&self, sources: Vec<Box<dyn SourceReader>>) -> Pipeline {
        let clients = Clients {
            sources,
            ledger: self.ledger.clone(),
            fetcher: self.fetcher.clone(),
            llm: self.llm.clone(),
            images: self.image_sourcer(),
            publisher: self.publisher.clone(),
        };
        Pipeline::new(self.config.clone(), clients)
    }
}
