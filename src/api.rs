//! LLM summarization with rate limiting and exponential backoff.
//!
//! # Architecture
//!
//! The adapter is assembled from small decorators around one trait:
//! - [`Summarize`]: turn article text into a summary
//! - [`ChatClient`]: OpenAI-compatible `chat/completions` backend
//! - [`Retrying`]: retries transient failures with exponential backoff
//! - [`RateLimited`]: spaces call starts to stay within a calls-per-minute budget
//!
//! [`build_summarizer`] wires them as `Retrying<RateLimited<ChatClient>>`:
//! the pacer sits under the retry loop, so every attempt, including
//! retries, waits for its slot in the rate budget.
//!
//! # Retry Strategy
//!
//! - `retry_attempts` total attempts
//! - delay before retry `n` is `min(base * 2^(n-1), max)` plus 0-250ms jitter
//! - permanent failures (missing key, client errors, unusable responses)
//!   are returned immediately

use crate::config::SummarizationSettings;
use crate::pacing::Pacer;
use crate::utils::{truncate_chars, truncate_for_log};
use rand::{Rng, rng};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("OPENAI_API_KEY not set")]
    MissingApiKey,
    #[error("summarization request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed API response: {0}")]
    MalformedResponse(String),
    #[error("API returned an empty summary")]
    EmptySummary,
}

impl SummarizeError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SummarizeError::Timeout | SummarizeError::Network(_) => true,
            SummarizeError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            SummarizeError::MissingApiKey
            | SummarizeError::MalformedResponse(_)
            | SummarizeError::EmptySummary => false,
        }
    }
}

impl From<reqwest::Error> for SummarizeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SummarizeError::Timeout
        } else if e.is_decode() {
            SummarizeError::MalformedResponse(e.to_string())
        } else {
            SummarizeError::Network(e)
        }
    }
}

/// Something that can condense article text into a summary.
pub trait Summarize {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;
}

/// Decorator adding bounded retries with exponential backoff.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct Retrying<T> {
    inner: T,
    /// Total attempts, including the first.
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl<T> Retrying<T>
where
    T: Summarize,
{
    pub fn new(inner: T, max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Disable the random jitter, for deterministic timing.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl<T> fmt::Debug for Retrying<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrying")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Summarize for Retrying<T>
where
    T: Summarize,
{
    #[instrument(level = "info", skip_all)]
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.summarize(text).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_retryable() || attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            retryable = e.is_retryable(),
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "summarize() giving up"
                        );
                        return Err(e);
                    }

                    let mut delay = self.backoff(attempt);
                    if self.jitter {
                        let jitter_ms: u64 = rng().random_range(0..=250);
                        delay += Duration::from_millis(jitter_ms);
                    }

                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "summarize() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Decorator keeping call starts at least `60s / calls_per_minute` apart.
#[derive(Debug)]
pub struct RateLimited<T> {
    inner: T,
    pacer: Pacer,
}

impl<T> RateLimited<T>
where
    T: Summarize,
{
    pub fn new(inner: T, calls_per_minute: u32) -> Self {
        Self::with_interval(inner, Duration::from_secs(60) / calls_per_minute.max(1))
    }

    pub fn with_interval(inner: T, interval: Duration) -> Self {
        Self {
            inner,
            pacer: Pacer::new(interval),
        }
    }
}

impl<T> Summarize for RateLimited<T>
where
    T: Summarize,
{
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        self.pacer.wait().await;
        self.inner.summarize(text).await
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completion backend.
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: String,
    max_input_chars: Option<usize>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ChatClient {
    pub fn new(
        settings: &SummarizationSettings,
        api_key: Option<String>,
        system_prompt: String,
    ) -> Result<Self, SummarizeError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(SummarizeError::Network)?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.api_base.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            system_prompt,
            max_input_chars: settings.max_input_chars,
        })
    }

    fn request<'a>(&'a self, text: &str) -> ChatRequest<'a> {
        let text = match self.max_input_chars {
            Some(max) => truncate_chars(text, max),
            None => text,
        };
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Article to summarize:\n\n{}", text),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Pull the first choice's text out of a completion response.
fn extract_summary(response: ChatResponse) -> Result<String, SummarizeError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SummarizeError::MalformedResponse("no choices".to_string()))?
        .message
        .content
        .unwrap_or_default();

    let summary = content.trim();
    if summary.is_empty() {
        return Err(SummarizeError::EmptySummary);
    }
    Ok(summary.to_string())
}

impl Summarize for ChatClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let api_key = self.api_key.as_deref().ok_or(SummarizeError::MissingApiKey)?;

        let t0 = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                status = status.as_u16(),
                body = %truncate_for_log(&body, 300),
                "API call failed"
            );
            return Err(SummarizeError::Api {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let summary = extract_summary(parsed)?;
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = summary.chars().count(),
            "Received summary"
        );
        Ok(summary)
    }
}

/// The production summarizer stack.
pub type Summarizer = Retrying<RateLimited<ChatClient>>;

/// Compose the rate-limited, retrying summarizer from settings.
pub fn build_summarizer(
    settings: &SummarizationSettings,
    api_key: Option<String>,
    system_prompt: String,
) -> Result<Summarizer, SummarizeError> {
    let client = ChatClient::new(settings, api_key, system_prompt)?;
    let limited = RateLimited::new(client, settings.rate_limit);
    Ok(Retrying::new(
        limited,
        settings.retry_attempts,
        settings.base_delay(),
        settings.max_delay(),
    ))
}
