use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::ChatConfig,
    core::capability::{ChatCapability, ChatRequest, ChatResponse},
    error::{AgentError, Result},
};

const MAX_RETRIES: usize = 3;

/// HTTP client for a Responses-style chat endpoint.
#[derive(Clone, Debug)]
pub struct ResponsesClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl ResponsesClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AgentError::Config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            http,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&ChatConfig::from_env()?)
    }

    /// POST a request body, retrying rate limits and server errors.
    pub async fn create(&self, body: &Value) -> Result<Value> {
        let url = build_responses_url(&self.base_url);
        let mut backoff = Duration::from_millis(250);

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await?;
            let status = response.status();
            let wait = retry_after(response.headers()).unwrap_or(backoff);
            let text = response.text().await?;

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < MAX_RETRIES {
                warn!(
                    target: "agentic_tools::client",
                    attempt,
                    %status,
                    wait_ms = wait.as_millis() as u64,
                    "retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
                continue;
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(AgentError::RateLimit {
                    retry_after: wait.as_secs().max(1),
                });
            }

            let parsed: Value = serde_json::from_str(&text)
                .map_err(|err| AgentError::Chat(format!("Failed to parse JSON ({status}): {err}")))?;
            if !status.is_success() {
                let message = api_error(&parsed).unwrap_or(text);
                return Err(AgentError::Chat(format!("HTTP {status} error: {message}")));
            }
            if let Some(message) = api_error(&parsed) {
                return Err(AgentError::Chat(format!("API error: {message}")));
            }

            debug!(target: "agentic_tools::client", attempt, "response received");
            return Ok(parsed);
        }
        Err(AgentError::Chat("retries exhausted".to_string()))
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// The `error` member of a response body, if set.
fn api_error(body: &Value) -> Option<String> {
    let error = body.get("error").filter(|error| !error.is_null())?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

#[async_trait]
impl ChatCapability for ResponsesClient {
    async fn respond(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = self.create(&request.to_body()).await?;
        Ok(ChatResponse::from_body(&body))
    }
}

fn build_responses_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/responses") {
        trimmed.to_string()
    } else {
        format!("{}/responses", trimmed)
    }
}
