// src/error.rs
//! Error taxonomy shared across pipeline stages.
//!
//! Expected business outcomes (not an article, schema mismatch) are *not*
//! errors; they travel as [`crate::generate::Outcome`]. The types here cover
//! infrastructure failures and batch-level failures only.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by an [`crate::llm::LlmClient`].
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("llm http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("llm transport: {0}")]
    Transport(String),
    #[error("llm response unusable: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Worth another attempt under the `retry.llm` policy.
    /// Rate limits are handled separately by [`crate::llm::RateLimitedLlm`].
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Http { status, .. } => *status >= 500,
            LlmError::RateLimited { .. } | LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Errors fetching an article page.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("fetch http {status} for {url}")]
    Http { url: String, status: u16 },
    #[error("fetch transport for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Http { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Errors from the image step. None of these are memoized as link failures.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error("no unique image among {candidates} candidates for query {query:?}")]
    NoUniqueCandidate { query: String, candidates: usize },
    #[error("image prompt derivation failed: {0}")]
    Llm(#[from] LlmError),
    #[error("image service: {0}")]
    Service(String),
}

impl ImageError {
    /// Only service calls are retried; the LLM step has its own policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ImageError::Service(_))
    }
}

/// Errors from a batch publish. Any of these aborts the ledger write.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("publisher returned http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("publisher transport: {message}")]
    Transport { message: String, connect: bool },
    #[error("publisher response unreadable: {0}")]
    InvalidResponse(String),
    #[error("publisher returned {returned} ids for {submitted} posts")]
    CountMismatch { submitted: usize, returned: usize },
    #[error("publisher returned a blank id at position {position}")]
    BlankId { position: usize },
}

impl PublishError {
    /// Only failures where the request never reached the publisher are retried;
    /// anything else could duplicate downstream posts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transport { connect: true, .. })
    }
}

/// Ledger store failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger line {line} is not a valid entry: {message}")]
    Corrupt { line: usize, message: String },
    #[error("ledger backend: {0}")]
    Backend(String),
}

/// Run-level failures. These are the only errors that make the binary exit non-zero.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not read ledger: {0}")]
    Ledger(#[source] LedgerError),
    #[error("batch publish failed: {0}")]
    Publish(#[from] PublishError),
    #[error("published {published} posts but ledger append failed: {source}")]
    LedgerWrite {
        published: usize,
        #[source]
        source: LedgerError,
    },
}
