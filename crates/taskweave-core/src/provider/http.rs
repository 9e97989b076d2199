//! HTTP reasoning provider
//!
//! OpenAI-compatible chat-completions client with request timeout and
//! bounded retry with exponential backoff on rate limits.

use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

use super::types::{
    ChatRequest, ChatResponse, ExecuteOptions, Message, PromptRequest, ProviderResponse,
};

/// Maximum number of attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

/// Remote chat-completions backend
#[derive(Clone)]
pub struct HttpProvider {
    http_client: HttpClient,
    config: ProviderConfig,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl HttpProvider {
    /// Create a provider from configuration and an API key
    pub fn new(config: ProviderConfig, api_key: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            http_client,
            config,
            api_key: api_key.into(),
            base_url,
        })
    }

    /// Execute a prompt, retrying on rate limits with exponential backoff
    pub async fn execute(
        &self,
        request: PromptRequest,
        options: ExecuteOptions,
    ) -> Result<ProviderResponse> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(request.prompt.clone()));

        let chat_request = ChatRequest {
            model,
            messages,
            temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
            max_tokens: Some(options.max_tokens.unwrap_or(self.config.max_tokens)),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let started = Instant::now();

            match self.send_request(&chat_request).await {
                Ok(mut response) => {
                    response.response_time_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        tokens = response.tokens_used,
                        elapsed_ms = response.response_time_ms,
                        "provider call completed"
                    );
                    return Ok(response);
                }
                Err(RequestError::RateLimited) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = BACKOFF_BASE_MS * 2u64.pow(attempts - 1);
                    warn!(attempt = attempts, wait_ms = backoff, "rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(RequestError::RateLimited) => {
                    return Err(Error::Provider("rate limited after retries".into()));
                }
                Err(RequestError::Other(e)) => return Err(e),
            }
        }
    }

    async fn send_request(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ProviderResponse, RequestError> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, messages = request.messages.len(), "sending chat completion request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| RequestError::Other(Error::Network(e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RequestError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Other(Error::Provider(format!(
                "API returned {status}: {body}"
            ))));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| RequestError::Other(Error::Provider(format!("parse response: {e}"))))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| RequestError::Other(Error::Provider("empty response".into())))?;

        let tokens_used = chat_response
            .usage
            .as_ref()
            .map(|u| {
                if u.total_tokens > 0 {
                    u.total_tokens
                } else {
                    u.prompt_tokens + u.completion_tokens
                }
            })
            .unwrap_or(0);

        let mut metadata = serde_json::Map::new();
        metadata.insert("model".into(), chat_response.model.clone().into());
        metadata.insert("completion_id".into(), chat_response.id.clone().into());

        Ok(ProviderResponse {
            content,
            tokens_used,
            cost: None,
            response_time_ms: 0,
            metadata,
        })
    }
}

enum RequestError {
    RateLimited,
    Other(Error),
}
