// src/generate/fetch.rs
use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchError;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Page text for `link`. One attempt; callers own the retry policy.
    async fn fetch(&self, link: &str) -> Result<String, FetchError>;
}

/// Fetches pages through a text-extraction reader proxy (`{prefix}{link}`).
pub struct ReaderProxyFetcher {
    http: reqwest::Client,
    prefix: String,
}

impl ReaderProxyFetcher {
    pub fn new(prefix: impl Into<String>, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scrapegen/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            prefix: prefix.into(),
        }
    }

    pub fn url_for(&self, link: &str) -> String {
        format!("{}{}", self.prefix, link.trim())
    }
}

#[async_trait]
impl PageFetcher for ReaderProxyFetcher {
    async fn fetch(&self, link: &str) -> Result<String, FetchError> {
        let url = self.url_for(link);
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_url_is_prefix_plus_link() {
        let f = ReaderProxyFetcher::new("https://r.jina.ai/", 5);
        assert_eq!(f.url_for(" https://a.test/x "), "https://r.jina.ai/https://a.test/x");
    }
}
