// src/generate/mod.rs
//! Content validator/generator.
//!
//! Per link: fetch page -> ARTICLE_CHECK (small model) -> GENERATE (large
//! model, strict schema) -> validate against the vocabularies. Every
//! terminal state is an [`Outcome`] value; nothing here returns `Err`.

pub mod fetch;
pub mod markdown;
pub mod prompts;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::vocabulary::{Category, Vocabulary};
use crate::config::PipelineConfig;
use crate::error::{FetchError, ImageError, LlmError};
use crate::ingest::types::LinkRecord;
use crate::llm::schema::{parse_structured, with_string_enum, StructuredOutput};
use crate::llm::{LlmRequest, RateLimitedLlm, ResponseSchema, TokenUsage};
use crate::retry::RetryPolicy;

use fetch::PageFetcher;
use markdown::finalize_post_text;
use prompts::ARTICLE_CHECK_PROMPT;

/// Upper bound on page text sent to the article check.
pub const MAX_PAGE_CHARS: usize = 60_000;

/// A finished post, ready to publish. Serialized as part of a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPost {
    pub original_time: DateTime<Utc>,
    pub generation_time: DateTime<Utc>,
    pub post_text: String,
    pub hashtags: Vec<String>,
    pub category: Category,
    pub image_url: String,
    pub link: String,
    #[serde(default)]
    pub source_link: Option<String>,
    #[serde(default)]
    pub source_name: String,
    pub prompt_used: String,
    pub raw_article_text: String,
    pub model_name: String,
}

impl GeneratedPost {
    pub fn assemble(record: &LinkRecord, draft: Draft, image_url: String, now: DateTime<Utc>) -> Self {
        Self {
            original_time: record.time,
            generation_time: now,
            post_text: draft.post_text,
            hashtags: draft.hashtags,
            category: draft.category,
            image_url,
            link: record.link.clone(),
            source_link: record.source_link.clone(),
            source_name: record.source_name.clone(),
            prompt_used: draft.prompt_used,
            raw_article_text: draft.article_text,
            model_name: draft.model_name,
        }
    }
}

/// Shape the GENERATE call must return.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub post_text: String,
    pub hashtags: Vec<String>,
    pub category: Category,
}

/// Validated generation output, before an image is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub post_text: String,
    pub hashtags: Vec<String>,
    pub category: Category,
    pub article_text: String,
    pub prompt_used: String,
    pub model_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Property of the page; memoized in failure memory.
    SourceQuality,
    /// Bad LLM output; retried next run.
    GenerationQuality,
    /// Infrastructure gave up after retries; retried next run.
    Transient,
}

#[derive(Debug, Clone)]
pub enum Rejection {
    NotArticle,
    EmptyContent,
    ValidationFailed(String),
    Fetch(FetchError),
    /// The ARTICLE_CHECK call failed after retries.
    ArticleCheck(LlmError),
    /// The GENERATE call failed after retries.
    Llm(LlmError),
    Image(ImageError),
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::NotArticle | Rejection::EmptyContent => RejectionKind::SourceQuality,
            Rejection::ValidationFailed(_) => RejectionKind::GenerationQuality,
            Rejection::Fetch(_) | Rejection::ArticleCheck(_) | Rejection::Llm(_) | Rejection::Image(_) => {
                RejectionKind::Transient
            }
        }
    }

    /// Stage label for logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Rejection::Fetch(_) => "fetch",
            Rejection::NotArticle | Rejection::EmptyContent | Rejection::ArticleCheck(_) => "article_check",
            Rejection::Llm(_) | Rejection::ValidationFailed(_) => "generate",
            Rejection::Image(_) => "image",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotArticle => f.write_str("page is not an article"),
            Rejection::EmptyContent => f.write_str("no article content extracted"),
            Rejection::ValidationFailed(why) => write!(f, "structured output rejected: {why}"),
            Rejection::Fetch(e) => write!(f, "{e}"),
            Rejection::ArticleCheck(e) | Rejection::Llm(e) => write!(f, "{e}"),
            Rejection::Image(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Accepted(Draft),
    Rejected(Rejection),
}

/// One generation attempt plus the tokens it spent, accepted or not.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub outcome: Outcome,
    pub usage: TokenUsage,
}

impl Attempt {
    fn rejected(r: Rejection, usage: TokenUsage) -> Self {
        Self {
            outcome: Outcome::Rejected(r),
            usage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub check_model: String,
    pub generate_model: String,
    pub system_prompt: String,
    pub fetch_retry: RetryPolicy,
    pub vocabulary: Vocabulary,
}

impl GeneratorSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            check_model: cfg.llm.check_model.clone(),
            generate_model: cfg.llm.generate_model.clone(),
            system_prompt: cfg.llm.system_prompt.clone(),
            fetch_retry: cfg.retry.fetch,
            vocabulary: cfg.vocabulary(),
        }
    }
}

pub struct ContentGenerator {
    fetcher: Arc<dyn PageFetcher>,
    llm: RateLimitedLlm,
    settings: GeneratorSettings,
    schema: ResponseSchema,
}

impl ContentGenerator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, llm: RateLimitedLlm, settings: GeneratorSettings) -> Self {
        let mut schema = SocialPost::response_schema();
        schema.schema = with_string_enum(schema.schema, "hashtags", settings.vocabulary.entries());
        Self {
            fetcher,
            llm,
            settings,
            schema,
        }
    }

    pub async fn generate(&self, record: &LinkRecord) -> Attempt {
        let mut usage = TokenUsage::default();
        let link = record.link.as_str();
        let fetcher = &self.fetcher;

        let page = match self
            .settings
            .fetch_retry
            .run("fetch", FetchError::is_retryable, move |_| fetcher.fetch(link))
            .await
        {
            Ok(p) => p,
            Err(e) => return Attempt::rejected(Rejection::Fetch(e), usage),
        };
        let page = page.trim();
        if page.is_empty() {
            return Attempt::rejected(Rejection::EmptyContent, usage);
        }
        let page: String = page.chars().take(MAX_PAGE_CHARS).collect();

        // ARTICLE_CHECK
        let check = LlmRequest::new(&self.settings.check_model, ARTICLE_CHECK_PROMPT, page).temperature(0.0);
        let article = match self.llm.call(&check).await {
            Ok(r) => {
                usage += r.usage;
                r.text
            }
            Err(e) => return Attempt::rejected(Rejection::ArticleCheck(e), usage),
        };
        let article = article.trim();
        if article.is_empty() {
            return Attempt::rejected(Rejection::EmptyContent, usage);
        }
        if article
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
            .eq_ignore_ascii_case("none")
        {
            return Attempt::rejected(Rejection::NotArticle, usage);
        }
        tracing::debug!(
            target: "generate",
            link,
            provider = self.llm.provider_name(),
            chars = article.len(),
            "article check passed"
        );

        // GENERATE
        let req = LlmRequest::new(
            &self.settings.generate_model,
            &self.settings.system_prompt,
            format!("Source: {link}\n\n{article}"),
        )
        .temperature(0.7)
        .schema(self.schema.clone());
        let reply = match self.llm.call(&req).await {
            Ok(r) => {
                usage += r.usage;
                r.text
            }
            Err(e) => return Attempt::rejected(Rejection::Llm(e), usage),
        };
        let parsed = match parse_structured::<SocialPost>(&reply) {
            Ok(p) => p,
            Err(e) => return Attempt::rejected(Rejection::ValidationFailed(e.to_string()), usage),
        };
        match validate_post(parsed, &self.settings.vocabulary) {
            Ok(post) => Attempt {
                outcome: Outcome::Accepted(Draft {
                    post_text: post.post_text,
                    hashtags: post.hashtags,
                    category: post.category,
                    article_text: article.to_string(),
                    prompt_used: self.settings.system_prompt.clone(),
                    model_name: self.settings.generate_model.clone(),
                }),
                usage,
            },
            Err(why) => Attempt::rejected(Rejection::ValidationFailed(why), usage),
        }
    }
}

/// Post-process and check a parsed reply: final post text must be non-empty
/// and every hashtag must be in `vocab` (canonical spelling, deduplicated).
pub fn validate_post(raw: SocialPost, vocab: &Vocabulary) -> Result<SocialPost, String> {
    let post_text = finalize_post_text(&raw.post_text);
    if post_text.is_empty() {
        return Err("post text is empty".into());
    }
    let mut hashtags: Vec<String> = Vec::with_capacity(raw.hashtags.len());
    for tag in &raw.hashtags {
        let canon = vocab
            .canonicalize(tag)
            .ok_or_else(|| format!("hashtag {tag:?} is outside the vocabulary"))?;
        if !hashtags.iter().any(|h| h == canon) {
            hashtags.push(canon.to_string());
        }
    }
    if hashtags.is_empty() {
        return Err("no hashtags".into());
    }
    Ok(SocialPost {
        post_text,
        hashtags,
        category: raw.category,
    })
}
