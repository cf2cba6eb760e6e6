// src/llm/openai.rs
//! OpenAI Chat Completions client. Structured calls use
//! `response_format: json_schema` in strict mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{parse_retry_after, LlmClient, LlmRequest, LlmResponse, TokenUsage};
use crate::error::LlmError;

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scrapegen/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonSchemaSpec<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaSpec<'a>,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn build_body(req: &LlmRequest) -> Req<'_> {
    Req {
        model: &req.model,
        messages: vec![
            Msg {
                role: "system",
                content: &req.system_prompt,
            },
            Msg {
                role: "user",
                content: &req.user_content,
            },
        ],
        temperature: req.temperature,
        response_format: req.response_schema.as_ref().map(|s| ResponseFormat {
            kind: "json_schema",
            json_schema: JsonSchemaSpec {
                name: &s.name,
                strict: true,
                schema: &s.schema,
            },
        }),
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(300).collect()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&build_body(req))
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let header = |name: &str| {
                resp.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let ms = header("retry-after-ms");
            let secs = header("retry-after");
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited {
                retry_after: parse_retry_after(ms.as_deref(), secs.as_deref(), &body),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let usage = body
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        let msg = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices".into()))?
            .message;
        if let Some(refusal) = msg.refusal.filter(|r| !r.trim().is_empty()) {
            return Err(LlmError::InvalidResponse(format!("refused: {}", excerpt(&refusal))));
        }
        Ok(LlmResponse {
            text: msg.content.unwrap_or_default(),
            usage,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
