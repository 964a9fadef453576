//! DeepSeek API translation client.
//! Connection pooling via reqwest, simple token-bucket rate limiting,
//! retry ladder for 429/5xx/timeout. One chat-completions call per segment.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{TranslateError, Translator};
use crate::config::GatewayConfig;

/// System prompt pinned to the translation task.
const SYSTEM_PROMPT: &str = "You are a professional translator. Translate the following English text to Chinese. Only provide the translation, no explanations or additional text.";

/// DeepSeek chat/completions client.
pub struct DeepSeekClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Simple token-bucket: tracks the next allowed request time.
    next_allowed: tokio::sync::Mutex<Instant>,
    /// Minimum interval between requests.
    min_interval: Duration,
}

impl DeepSeekClient {
    /// Create a new client. Reads `DEEPSEEK_API_KEY` from the environment.
    pub fn new(config: &GatewayConfig) -> Result<Self, TranslateError> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").map_err(|_| {
            TranslateError::InvalidInput("DEEPSEEK_API_KEY environment variable not set".into())
        })?;

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout)
            .build()
            .map_err(|e| TranslateError::ApiError(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.clone(),
            next_allowed: tokio::sync::Mutex::new(Instant::now()),
            min_interval: config.min_interval,
        })
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    /// Send request with retry logic.
    /// 429: Retry-After or 1s/2s/4s (max 3).
    /// 5xx: exponential backoff (max 2).
    /// Timeout: immediate retry once.
    async fn send_with_retry(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, TranslateError> {
        let mut attempt: u32 = 0;
        let max_429_retries: u32 = 3;
        let max_5xx_retries: u32 = 2;
        let mut timeout_retried = false;

        loop {
            let result = self
                .http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp);
                }
                Ok(resp) if resp.status().as_u16() == 429 => {
                    if attempt >= max_429_retries {
                        return Err(TranslateError::RateLimited { retry_after_ms: 0 });
                    }
                    let wait = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Duration::from_secs(1 << attempt));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "429 rate limited, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= max_5xx_retries {
                        return Err(TranslateError::ApiError(format!(
                            "server error: {}",
                            resp.status()
                        )));
                    }
                    let wait = Duration::from_millis(500 * (1 << attempt));
                    warn!(
                        attempt,
                        status = resp.status().as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "5xx error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(TranslateError::ApiError(format!(
                        "unexpected status {}: {}",
                        status,
                        body_text.chars().take(200).collect::<String>()
                    )));
                }
                Err(e) if e.is_timeout() => {
                    if timeout_retried {
                        return Err(TranslateError::Timeout);
                    }
                    warn!("request timeout, retrying once");
                    timeout_retried = true;
                }
                Err(e) => {
                    return Err(TranslateError::ApiError(e.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl Translator for DeepSeekClient {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        self.rate_limit_wait().await;

        let body = serde_json::json!({
            "model": "deepseek-chat",
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": text}
            ],
            "temperature": 0.3,
            "max_tokens": 2000
        });

        let response = self.send_with_retry(&body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::ApiError(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| TranslateError::ApiError("empty completion".into()))?;

        Ok(content.trim().to_string())
    }
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
