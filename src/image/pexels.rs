// src/image/pexels.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::ImageSearch;
use crate::error::ImageError;

/// Pexels photo search (`GET {url}?query=..&per_page=..`, key in `Authorization`).
pub struct PexelsSearch {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl PexelsSearch {
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

#[derive(Deserialize)]
struct SearchResp {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    src: PhotoSrc,
}

#[derive(Deserialize)]
struct PhotoSrc {
    #[serde(default)]
    original: String,
}

fn candidates(body: SearchResp) -> Vec<String> {
    body.photos
        .into_iter()
        .map(|p| p.src.original)
        .filter(|u| !u.trim().is_empty())
        .collect()
}

#[async_trait]
impl ImageSearch for PexelsSearch {
    async fn search(&self, query: &str, per_page: u32) -> Result<Vec<String>, ImageError> {
        let per_page = per_page.to_string();
        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .query(&[("query", query), ("per_page", per_page.as_str())])
            .send()
            .await
            .map_err(|e| ImageError::Service(format!("pexels transport: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ImageError::Service(format!("pexels http {}", status.as_u16())));
        }
        let body: SearchResp = resp
            .json()
            .await
            .map_err(|e| ImageError::Service(format!("pexels body: {e}")))?;
        Ok(candidates(body))
    }
}
