// src/llm/mod.rs
//! LLM seam: request/response shapes, the provider trait, and the
//! rate-limit-aware caller used by every pipeline stage.

pub mod openai;
pub mod schema;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;
use crate::retry::RetryPolicy;

/// Strict JSON schema the response must follow.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_content: String,
    pub temperature: Option<f32>,
    pub response_schema: Option<ResponseSchema>,
}

impl LlmRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_content: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_content: user_content.into(),
            temperature: None,
            response_schema: None,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Estimated USD cost given per-million-token prices.
    pub fn cost(&self, input_per_million: f64, output_per_million: f64) -> f64 {
        (self.input_tokens as f64 * input_per_million + self.output_tokens as f64 * output_per_million)
            / 1_000_000.0
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One remote call. Free text when `req.response_schema` is `None`,
    /// otherwise JSON text conforming to the schema.
    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError>;
    fn name(&self) -> &'static str;
}

pub type DynLlm = Arc<dyn LlmClient>;

/// Wraps a client so rate limits wait-and-retry the same call, while other
/// retryable failures go through a [`RetryPolicy`].
#[derive(Clone)]
pub struct RateLimitedLlm {
    inner: DynLlm,
    policy: RetryPolicy,
    fallback_wait: Duration,
    max_wait: Duration,
    max_waits: u32,
}

impl RateLimitedLlm {
    pub fn new(inner: DynLlm, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            fallback_wait: Duration::from_secs(20),
            max_wait: Duration::from_secs(120),
            max_waits: 5,
        }
    }

    /// `fallback` is used when the server gives no hint; hints are capped at `max_wait`.
    pub fn with_rate_limit(mut self, fallback: Duration, max_wait: Duration, max_waits: u32) -> Self {
        self.fallback_wait = fallback;
        self.max_wait = max_wait;
        self.max_waits = max_waits;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.name()
    }

    pub async fn call(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let out = self
            .policy
            .run("llm", LlmError::is_retryable, move |_| async move {
                self.call_through_rate_limits(req).await
            })
            .await?;
        counter!("llm_tokens_total", "kind" => "input").increment(out.usage.input_tokens);
        counter!("llm_tokens_total", "kind" => "output").increment(out.usage.output_tokens);
        Ok(out)
    }

    async fn call_through_rate_limits(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut waits = 0u32;
        loop {
            match self.inner.complete(req).await {
                Err(LlmError::RateLimited { retry_after }) if waits < self.max_waits => {
                    waits += 1;
                    let wait = retry_after.unwrap_or(self.fallback_wait).min(self.max_wait);
                    counter!("llm_rate_limited_total").increment(1);
                    tracing::warn!(
                        target: "llm",
                        model = %req.model,
                        wait_ms = wait.as_millis() as u64,
                        server_hint = retry_after.is_some(),
                        waits,
                        "rate limited, waiting before retrying the same call"
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                }
                other => return other,
            }
        }
    }
}

static RE_TRY_AGAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)try again in\s+([0-9]+(?:\.[0-9]+)?)\s*(ms|s)\b").expect("static regex")
});

/// Server-suggested wait from a 429: `retry-after-ms`, then `retry-after`
/// (seconds), then a "try again in 1.5s" phrase in the body.
pub fn parse_retry_after(
    retry_after_ms: Option<&str>,
    retry_after: Option<&str>,
    body: &str,
) -> Option<Duration> {
    if let Some(ms) = retry_after_ms.and_then(|v| v.trim().parse::<f64>().ok()) {
        if ms.is_finite() && ms >= 0.0 {
            return Some(Duration::from_millis(ms.ceil() as u64));
        }
    }
    if let Some(secs) = retry_after.and_then(|v| v.trim().parse::<f64>().ok()) {
        if secs.is_finite() && secs >= 0.0 {
            return Some(secs_saturating(secs));
        }
    }
    let caps = RE_TRY_AGAIN.captures(body)?;
    let n: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2)?.as_str().to_ascii_lowercase().as_str() {
        "ms" => Some(Duration::from_millis(n.ceil() as u64)),
        _ => Some(secs_saturating(n)),
    }
}

/// Server hints are untrusted; oversized values saturate and are capped by the caller.
fn secs_saturating(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
