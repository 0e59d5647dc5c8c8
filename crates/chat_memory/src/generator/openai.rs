use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatBackend, GenerationError};
use crate::config::AiConfig;
use crate::history::ChatTurn;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 兼容的 chat/completions 客户端（OpenAI / DeepSeek / 其它兼容服务都可）
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(config: &AiConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// 按状态码与响应内容归类失败原因
fn classify_failure(status: StatusCode, body: String) -> GenerationError {
    let lower = body.to_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS || lower.contains("rate limit") {
        GenerationError::RateLimited(body)
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lower.contains("api key")
        || lower.contains("authentication")
    {
        GenerationError::Unauthorized(body)
    } else {
        GenerationError::Api {
            status: status.as_u16(),
            body,
        }
    }
}

fn first_reply(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(GenerationError::NotConfigured)?;

        let req_body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        debug!("请求生成端: model={}, messages={}", self.model, messages.len());
        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&req_body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(classify_failure(status, body));
        }

        let resp: ChatResponse = res.json().await?;
        first_reply(resp)
    }
}
