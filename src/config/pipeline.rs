// src/config/pipeline.rs
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::vocabulary::{default_hashtags, Vocabulary};
use crate::generate::prompts::DEFAULT_POST_SYSTEM_PROMPT;
use crate::retry::RetryPolicy;

/// Hard ceiling on posts per publish request.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub failure_memory: FailureMemoryConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub image: ImageConfig,
    pub publish: PublishConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Documents,
    Rss,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("databases/ledger.jsonl")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailureMemoryConfig {
    #[serde(default = "default_failure_path")]
    pub path: PathBuf,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_path() -> PathBuf {
    PathBuf::from("databases/failed_links.json")
}
fn default_cooldown_secs() -> u64 {
    4 * 3600
}

impl Default for FailureMemoryConfig {
    fn default() -> Self {
        Self {
            path: default_failure_path(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Limits {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Links attempted per run, accepted or not.
    #[serde(default = "default_max_links")]
    pub max_links_per_run: usize,
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_max_links() -> usize {
    10
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_links_per_run: default_max_links(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// "openai" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "env_marker")]
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Small/fast model for the article check and image prompts.
    #[serde(default = "default_check_model")]
    pub check_model: String,
    /// Larger model for structured post generation.
    #[serde(default = "default_generate_model")]
    pub generate_model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_rate_limit_fallback")]
    pub rate_limit_fallback_secs: u64,
    #[serde(default = "default_rate_limit_waits")]
    pub max_rate_limit_waits: u32,
    #[serde(default = "default_rate_limit_cap")]
    pub max_rate_limit_wait_secs: u64,
    /// USD per million tokens, for the per-run cost estimate.
    #[serde(default = "default_input_price")]
    pub input_price_per_million: f64,
    #[serde(default = "default_output_price")]
    pub output_price_per_million: f64,
}

fn default_provider() -> String {
    "openai".into()
}
fn env_marker() -> String {
    "ENV".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_check_model() -> String {
    "gpt-4o-mini".into()
}
fn default_generate_model() -> String {
    "gpt-4o".into()
}
fn default_system_prompt() -> String {
    DEFAULT_POST_SYSTEM_PROMPT.into()
}
fn default_llm_timeout() -> u64 {
    90
}
fn default_rate_limit_fallback() -> u64 {
    20
}
fn default_rate_limit_waits() -> u32 {
    5
}
fn default_rate_limit_cap() -> u64 {
    120
}
fn default_input_price() -> f64 {
    0.150
}
fn default_output_price() -> f64 {
    0.600
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: env_marker(),
            base_url: default_llm_base_url(),
            check_model: default_check_model(),
            generate_model: default_generate_model(),
            system_prompt: default_system_prompt(),
            timeout_secs: default_llm_timeout(),
            rate_limit_fallback_secs: default_rate_limit_fallback(),
            max_rate_limit_waits: default_rate_limit_waits(),
            max_rate_limit_wait_secs: default_rate_limit_cap(),
            input_price_per_million: default_input_price(),
            output_price_per_million: default_output_price(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Text-extraction proxy prepended to every article link.
    #[serde(default = "default_reader_prefix")]
    pub reader_prefix: String,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_reader_prefix() -> String {
    "https://r.jina.ai/".into()
}
fn default_fetch_timeout() -> u64 {
    30
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            reader_prefix: default_reader_prefix(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageStrategy {
    #[default]
    Search,
    Generative,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub strategy: ImageStrategy,
    /// "ENV" means: PEXELS_API_KEY (search) or FAL_KEY (generative)
    #[serde(default = "env_marker")]
    pub api_key: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_generate_url")]
    pub generate_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
}

fn default_search_url() -> String {
    "https://api.pexels.com/v1/search".into()
}
fn default_generate_url() -> String {
    "https://fal.run/fal-ai/flux/schnell".into()
}
fn default_per_page() -> u32 {
    15
}
fn default_image_timeout() -> u64 {
    60
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            strategy: ImageStrategy::default(),
            api_key: env_marker(),
            search_url: default_search_url(),
            generate_url: default_generate_url(),
            per_page: default_per_page(),
            timeout_secs: default_image_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    pub endpoint: String,
    /// "ENV" means: read from PUBLISH_API_TOKEN
    #[serde(default = "env_marker")]
    pub api_token: String,
    /// Link-domain substrings that mark a post for the professional audience.
    #[serde(default = "default_professional_domains")]
    pub professional_domains: Vec<String>,
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

pub fn default_professional_domains() -> Vec<String> {
    [
        "medscape.com",
        "nice.org.uk",
        "nih.gov",
        "fiercepharma.com",
        "bmj.com",
        "nejm.org",
        "thelancet.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_publish_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_fetch_retry")]
    pub fetch: RetryPolicy,
    #[serde(default)]
    pub llm: RetryPolicy,
    #[serde(default)]
    pub image: RetryPolicy,
    #[serde(default = "default_publish_retry")]
    pub publish: RetryPolicy,
}

fn default_fetch_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay_ms: 1_000,
        ..RetryPolicy::default()
    }
}
fn default_publish_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 2_000,
        ..RetryPolicy::default()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fetch: default_fetch_retry(),
            llm: RetryPolicy::default(),
            image: RetryPolicy::default(),
            publish: default_publish_retry(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VocabularyConfig {
    #[serde(default = "default_hashtags")]
    pub hashtags: Vec<String>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            hashtags: default_hashtags(),
        }
    }
}

impl PipelineConfig {
    /// Parse TOML or JSON (by extension, then by content), resolve "ENV"
    /// secrets and clamp knobs into range.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = Self::parse(&data, &ext)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        cfg.resolve_secrets()?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Parse and clamp a TOML document without resolving "ENV" secrets.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Self = toml::from_str(s).context("parsing pipeline config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            return Ok(serde_json::from_str(s)?);
        }
        match toml::from_str::<Self>(s) {
            Ok(v) => Ok(v),
            Err(toml_err) => serde_json::from_str(s).map_err(|_| toml_err.into()),
        }
    }

    fn resolve_secrets(&mut self) -> Result<()> {
        self.llm.provider = self.llm.provider.to_lowercase();
        if self.llm.provider != "openai" {
            bail!("Unsupported llm provider in config: {}", self.llm.provider);
        }
        resolve_env(&mut self.llm.api_key, "OPENAI_API_KEY")?;
        let image_var = match self.image.strategy {
            ImageStrategy::Search => "PEXELS_API_KEY",
            ImageStrategy::Generative => "FAL_KEY",
        };
        resolve_env(&mut self.image.api_key, image_var)?;
        resolve_env(&mut self.publish.api_token, "PUBLISH_API_TOKEN")?;
        Ok(())
    }

    fn sanitize(&mut self) {
        self.limits.batch_size = self.limits.batch_size.clamp(1, MAX_BATCH_SIZE);
        self.limits.max_links_per_run = self.limits.max_links_per_run.max(1);
        if self.failure_memory.cooldown_secs == 0 {
            self.failure_memory.cooldown_secs = default_cooldown_secs();
        }
        self.image.per_page = self.image.per_page.clamp(1, 80);
        self.publish.professional_domains = self
            .publish
            .professional_domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if self.vocabulary().is_empty() {
            tracing::warn!(target: "config", "hashtag vocabulary has no usable entries, using the built-in list");
            self.vocabulary.hashtags = default_hashtags();
        }
    }

    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary::new(&self.vocabulary.hashtags)
    }
}

fn resolve_env(value: &mut String, var: &str) -> Result<()> {
    if value.trim().eq_ignore_ascii_case("env") {
        *value = std::env::var(var).with_context(|| format!("Missing {var} env var"))?;
    }
    Ok(())
}
