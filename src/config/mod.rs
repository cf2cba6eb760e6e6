// src/config/mod.rs
pub mod pipeline;
pub mod vocabulary;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub use pipeline::PipelineConfig;

pub const ENV_CONFIG_PATH: &str = "SCRAPEGEN_CONFIG";

/// Locate and load the pipeline config:
/// 1) $SCRAPEGEN_CONFIG
/// 2) config/pipeline.toml
/// 3) config/pipeline.json
pub fn load_default() -> Result<PipelineConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return PipelineConfig::load_from_file(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for candidate in ["config/pipeline.toml", "config/pipeline.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return PipelineConfig::load_from_file(&pb);
        }
    }
    Err(anyhow!(
        "no pipeline config found (set {ENV_CONFIG_PATH} or create config/pipeline.toml)"
    ))
}
