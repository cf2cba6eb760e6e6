// src/image/fal.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ImageGenerator;
use crate::error::ImageError;

/// fal.ai synchronous text-to-image endpoint.
pub struct FalGenerator {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl FalGenerator {
    pub fn new(url: &str, api_key: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scrapegen/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Serialize)]
struct GenerateReq<'a> {
    prompt: &'a str,
    image_size: &'static str,
    num_images: u32,
}

#[derive(Deserialize)]
struct GenerateResp {
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    url: String,
}

#[async_trait]
impl ImageGenerator for FalGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ImageError> {
        let resp = self
            .http
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, format!("Key {}", self.api_key))
            .json(&GenerateReq {
                prompt,
                image_size: "landscape_16_9",
                num_images: 1,
            })
            .send()
            .await
            .map_err(|e| ImageError::Service(format!("fal transport: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ImageError::Service(format!("fal http {}", status.as_u16())));
        }
        let body: GenerateResp = resp
            .json()
            .await
            .map_err(|e| ImageError::Service(format!("fal body: {e}")))?;
        body.images
            .into_iter()
            .map(|i| i.url)
            .find(|u| !u.trim().is_empty())
            .ok_or_else(|| ImageError::Service("fal returned no image".into()))
    }
}
