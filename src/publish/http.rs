// src/publish/http.rs
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{PostPayload, PublishRequest, PublishResponse, PublishTransport};
use crate::error::PublishError;

/// `POST {endpoint}` with `{posts: [...]}` and a bearer token.
#[derive(Clone)]
pub struct HttpPublisher {
    endpoint: String,
    token: String,
    client: Client,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .user_agent(concat!("scrapegen/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            client,
        }
    }
}

#[async_trait]
impl PublishTransport for HttpPublisher {
    async fn send(&self, posts: &[PostPayload]) -> Result<Vec<String>, PublishError> {
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&PublishRequest { posts })
            .send()
            .await
            .map_err(|e| PublishError::Transport {
                message: e.to_string(),
                connect: e.is_connect(),
            })?;

        let status = res.status().as_u16();
        if status != 200 && status != 201 {
            let body: String = res.text().await.unwrap_or_default().chars().take(300).collect();
            return Err(PublishError::Http { status, body });
        }
        let body: PublishResponse = res
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        Ok(body.document_ids)
    }
}
