// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod failure_memory;
pub mod generate;
pub mod image;
pub mod ingest;
pub mod ledger;
pub mod llm;
pub mod pipeline;
pub mod publish;
pub mod retry;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::error::PipelineError;
pub use crate::generate::{GeneratedPost, Outcome, Rejection};
pub use crate::pipeline::{Clients, Pipeline, RunReport};
