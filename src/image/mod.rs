// src/image/mod.rs
//! Image sourcing for generated posts.
//!
//! Two strategies behind [`ImageSourcer`]: stock search with a global
//! uniqueness check, and text-to-image generation.

pub mod fal;
pub mod pexels;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::pipeline::{ImageConfig, ImageStrategy};
use crate::error::{ImageError, LlmError};
use crate::llm::{LlmRequest, RateLimitedLlm, TokenUsage};
use crate::retry::RetryPolicy;

use self::fal::FalGenerator;
use self::pexels::PexelsSearch;
use crate::generate::prompts::{IMAGE_GENERATION_PROMPT, IMAGE_QUERY_PROMPT};

/// Identity key for image URLs: lower-case, no query, fragment or trailing slash.
pub fn normalize_image_url(url: &str) -> String {
    let t = url.trim();
    let t = t.split('#').next().unwrap_or(t);
    let t = t.split('?').next().unwrap_or(t);
    t.trim_end_matches('/').to_lowercase()
}

/// First candidate whose normalized URL is not in `taken`.
pub fn select_unique<'a>(candidates: &'a [String], taken: &HashSet<String>) -> Option<&'a String> {
    candidates
        .iter()
        .filter(|c| !c.trim().is_empty())
        .find(|c| !taken.contains(&normalize_image_url(c)))
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Candidate image URLs, best first.
    async fn search(&self, query: &str, per_page: u32) -> Result<Vec<String>, ImageError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ImageError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcedImage {
    pub url: String,
    /// Search phrase or generation prompt derived from the post.
    pub query: String,
}

/// One sourcing attempt plus the tokens spent deriving its query, found or not.
#[derive(Debug, Clone)]
pub struct ImageAttempt {
    pub result: Result<SourcedImage, ImageError>,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait ImageSourcer: Send + Sync {
    /// `taken` holds normalized URLs already used by the ledger or the current batch.
    async fn source_image(&self, post_text: &str, taken: &HashSet<String>) -> ImageAttempt;
    fn strategy(&self) -> &'static str;
}

async fn derive_text(
    llm: &RateLimitedLlm,
    model: &str,
    instruction: &str,
    post_text: &str,
) -> (Result<String, ImageError>, TokenUsage) {
    let req = LlmRequest::new(model, instruction, post_text).temperature(0.4);
    let resp = match llm.call(&req).await {
        Ok(r) => r,
        Err(e) => return (Err(e.into()), TokenUsage::default()),
    };
    let text = resp
        .text
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim()
        .to_string();
    if text.is_empty() {
        return (Err(LlmError::InvalidResponse("empty image query".into()).into()), resp.usage);
    }
    (Ok(text), resp.usage)
}

pub struct SearchImageSourcer {
    llm: RateLimitedLlm,
    model: String,
    search: Arc<dyn ImageSearch>,
    per_page: u32,
    retry: RetryPolicy,
}

impl SearchImageSourcer {
    pub fn new(
        llm: RateLimitedLlm,
        model: impl Into<String>,
        search: Arc<dyn ImageSearch>,
        per_page: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            search,
            per_page,
            retry,
        }
    }

    async fn pick_unique(&self, query: String, taken: &HashSet<String>) -> Result<SourcedImage, ImageError> {
        let search = &self.search;
        let (q, per_page) = (query.as_str(), self.per_page);
        let candidates = self
            .retry
            .run("image_search", ImageError::is_retryable, move |_| search.search(q, per_page))
            .await?;
        match select_unique(&candidates, taken) {
            Some(url) => {
                tracing::debug!(target: "image", query = %query, candidates = candidates.len(), "picked unique image");
                Ok(SourcedImage {
                    url: url.clone(),
                    query,
                })
            }
            None => Err(ImageError::NoUniqueCandidate {
                query,
                candidates: candidates.len(),
            }),
        }
    }
}

#[async_trait]
impl ImageSourcer for SearchImageSourcer {
    async fn source_image(&self, post_text: &str, taken: &HashSet<String>) -> ImageAttempt {
        let (query, usage) = derive_text(&self.llm, &self.model, IMAGE_QUERY_PROMPT, post_text).await;
        let result = match query {
            Ok(q) => self.pick_unique(q, taken).await,
            Err(e) => Err(e),
        };
        ImageAttempt { result, usage }
    }

    fn strategy(&self) -> &'static str {
        "search"
    }
}

pub struct GenerativeImageSourcer {
    llm: RateLimitedLlm,
    model: String,
    generator: Arc<dyn ImageGenerator>,
    retry: RetryPolicy,
}

impl GenerativeImageSourcer {
    pub fn new(
        llm: RateLimitedLlm,
        model: impl Into<String>,
        generator: Arc<dyn ImageGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            generator,
            retry,
        }
    }

    async fn render(&self, prompt: String) -> Result<SourcedImage, ImageError> {
        let generator = &self.generator;
        let p = prompt.as_str();
        let url = self
            .retry
            .run("image_generate", ImageError::is_retryable, move |_| generator.generate(p))
            .await?;
        Ok(SourcedImage { url, query: prompt })
    }
}

#[async_trait]
impl ImageSourcer for GenerativeImageSourcer {
    async fn source_image(&self, post_text: &str, _taken: &HashSet<String>) -> ImageAttempt {
        let (prompt, usage) = derive_text(&self.llm, &self.model, IMAGE_GENERATION_PROMPT, post_text).await;
        let result = match prompt {
            Ok(p) => self.render(p).await,
            Err(e) => Err(e),
        };
        ImageAttempt { result, usage }
    }

    fn strategy(&self) -> &'static str {
        "generative"
    }
}

/// Build the configured strategy. Prompts are derived with `model`.
pub fn sourcer_from_config(
    cfg: &ImageConfig,
    llm: RateLimitedLlm,
    model: &str,
    retry: RetryPolicy,
) -> Arc<dyn ImageSourcer> {
    match cfg.strategy {
        ImageStrategy::Search => Arc::new(SearchImageSourcer::new(
            llm,
            model,
            Arc::new(PexelsSearch::new(&cfg.search_url, &cfg.api_key, cfg.timeout_secs)),
            cfg.per_page,
            retry,
        )),
        ImageStrategy::Generative => Arc::new(GenerativeImageSourcer::new(
            llm,
            model,
            Arc::new(FalGenerator::new(&cfg.generate_url, &cfg.api_key, cfg.timeout_secs)),
            retry,
        )),
    }
}
