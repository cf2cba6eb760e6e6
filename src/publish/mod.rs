// src/publish/mod.rs
//! Batch publisher: one request per batch, strict one-to-one reconciliation
//! of returned document ids against submitted posts.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::pipeline::MAX_BATCH_SIZE;
use crate::error::PublishError;
use crate::generate::GeneratedPost;
use crate::ledger::LedgerEntry;
use crate::retry::RetryPolicy;

pub const AUDIENCE_PROFESSIONAL: &str = "Professional";
pub const AUDIENCE_GENERAL: &str = "General";

/// Downstream shape of one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub image_url: String,
    pub hashtags: Vec<String>,
    pub source: String,
    pub post: String,
    pub audience_tag: String,
}

#[derive(Debug, Serialize)]
pub struct PublishRequest<'a> {
    pub posts: &'a [PostPayload],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub document_ids: Vec<String>,
}

#[async_trait]
pub trait PublishTransport: Send + Sync {
    /// Submit the whole batch; returns the publisher's document ids as sent back.
    async fn send(&self, posts: &[PostPayload]) -> Result<Vec<String>, PublishError>;
}

/// Host part of a URL, lower-cased, without userinfo or port.
fn host_of(link: &str) -> String {
    let rest = link.trim();
    let rest = rest.split_once("://").map(|(_, r)| r).unwrap_or(rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    host.to_lowercase()
}

/// `Professional` when the link's host contains any configured domain.
pub fn audience_tag(link: &str, professional_domains: &[String]) -> &'static str {
    let host = host_of(link);
    if professional_domains
        .iter()
        .any(|d| !d.is_empty() && host.contains(d.as_str()))
    {
        AUDIENCE_PROFESSIONAL
    } else {
        AUDIENCE_GENERAL
    }
}

pub fn to_payload(post: &GeneratedPost, professional_domains: &[String]) -> PostPayload {
    let mut hashtags = Vec::with_capacity(post.hashtags.len() + 1);
    hashtags.push(post.category.as_hashtag().to_string());
    hashtags.extend(post.hashtags.iter().filter(|h| *h != post.category.as_hashtag()).cloned());
    let source = post
        .source_link
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&post.link)
        .to_string();
    PostPayload {
        image_url: post.image_url.clone(),
        hashtags,
        source,
        post: post.post_text.clone(),
        audience_tag: audience_tag(&post.link, professional_domains).to_string(),
    }
}

/// Pair each post with the id at the same position. Any count mismatch or
/// blank id fails the whole batch.
pub fn reconcile(posts: Vec<GeneratedPost>, ids: Vec<String>) -> Result<Vec<LedgerEntry>, PublishError> {
    if ids.len() != posts.len() {
        return Err(PublishError::CountMismatch {
            submitted: posts.len(),
            returned: ids.len(),
        });
    }
    if let Some(position) = ids.iter().position(|id| id.trim().is_empty()) {
        return Err(PublishError::BlankId { position });
    }
    Ok(posts
        .into_iter()
        .zip(ids)
        .map(|(post, id)| LedgerEntry::new(post, id.trim().to_string()))
        .collect())
}

pub struct BatchPublisher {
    transport: Arc<dyn PublishTransport>,
    professional_domains: Vec<String>,
    retry: RetryPolicy,
    cap: usize,
}

impl BatchPublisher {
    pub fn new(transport: Arc<dyn PublishTransport>, professional_domains: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            professional_domains,
            retry,
            cap: MAX_BATCH_SIZE,
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Publish in input order. On `Ok`, the entries are ready for the ledger.
    pub async fn publish(&self, mut posts: Vec<GeneratedPost>) -> Result<Vec<LedgerEntry>, PublishError> {
        if posts.len() > self.cap {
            tracing::warn!(target: "publish", dropped = posts.len() - self.cap, cap = self.cap, "batch over cap, truncating");
            posts.truncate(self.cap);
        }
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let payloads: Vec<PostPayload> = posts
            .iter()
            .map(|p| to_payload(p, &self.professional_domains))
            .collect();
        let transport = &self.transport;
        let batch = payloads.as_slice();
        let ids = self
            .retry
            .run("publish", PublishError::is_retryable, move |_| transport.send(batch))
            .await?;
        tracing::info!(target: "publish", submitted = posts.len(), returned = ids.len(), "publisher responded");
        reconcile(posts, ids)
    }
}
