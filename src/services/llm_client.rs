//! Chat-completion API client with bounded retries, capped exponential
//! backoff with jitter, and retriable/fatal error classification.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::Config;
use crate::models::internal::PromptSegment;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request timeout")]
    Timeout,
    #[error("cannot connect to completion API")]
    Connect,
    #[error("rate limit exceeded on completion API")]
    RateLimited,
    #[error("completion API server error: {0}")]
    Server(u16),
    #[error("invalid completion API key")]
    Auth,
    #[error("completion API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("HTTP error: {0}")]
    Http(String),
    /// Terminal error surfaced to callers once retries are exhausted or a
    /// fatal failure occurs. `retriable` carries the classification of the
    /// last underlying failure so the HTTP layer can signal "try again".
    #[error("{message}")]
    Unavailable { message: String, retriable: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retriable,
    Fatal,
}

/// Classify a per-attempt failure: network faults, upstream 5xx and 429 are
/// worth retrying; authentication and malformed responses are not.
pub fn classify(error: &LlmError) -> ErrorClass {
    match error {
        LlmError::Timeout
        | LlmError::Connect
        | LlmError::RateLimited
        | LlmError::Server(_) => ErrorClass::Retriable,
        _ => ErrorClass::Fatal,
    }
}

/// Outcome of one step of the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Retry { delay: Duration },
    GiveUp,
}

/// Pure retry state machine: Attempting(n) transitions to Retry(delay) for
/// retriable failures with attempts remaining, otherwise GiveUp. Keeping the
/// transition function free of I/O makes backoff and termination testable in
/// isolation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    pub fn next_step(&self, attempt: u32, class: ErrorClass) -> RetryStep {
        match class {
            ErrorClass::Fatal => RetryStep::GiveUp,
            ErrorClass::Retriable if attempt >= self.max_attempts => RetryStep::GiveUp,
            ErrorClass::Retriable => RetryStep::Retry {
                delay: self.backoff_delay(attempt),
            },
        }
    }

    /// `min(base * 2^(attempt-1), cap)`, before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.pow(exponent));
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tokens_used: u32,
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            max_tokens: 300,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            policy: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut client = Self::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        );
        client.max_tokens = config.llm_max_tokens;
        client.temperature = config.llm_temperature;
        client.timeout = Duration::from_millis(config.llm_timeout_ms);
        client.policy.max_attempts = config.llm_max_retries;
        client
    }

    /// Override the retry policy (short delays in tests).
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a completion for the ordered prompt segments, retrying
    /// retriable failures with capped exponential backoff plus jitter.
    pub async fn generate(&self, segments: &[PromptSegment]) -> Result<Completion, LlmError> {
        let mut attempt: u32 = 1;

        loop {
            match self.call_api(segments).await {
                Ok(completion) => {
                    tracing::info!(
                        model = %self.model,
                        tokens_used = completion.tokens_used,
                        attempt,
                        "LLM response generated successfully"
                    );
                    return Ok(completion);
                }
                Err(error) => {
                    let class = classify(&error);
                    match self.policy.next_step(attempt, class) {
                        RetryStep::Retry { delay } => {
                            let delay = delay + jitter();
                            tracing::warn!(
                                attempt,
                                max_attempts = self.policy.max_attempts,
                                backoff_ms = delay.as_millis() as u64,
                                error = %error,
                                "LLM call failed, retrying"
                            );
                            sleep(delay).await;
                            attempt += 1;
                        }
                        RetryStep::GiveUp => {
                            let retriable = class == ErrorClass::Retriable;
                            tracing::error!(
                                attempt,
                                error = %error,
                                retriable,
                                "LLM call failed"
                            );
                            return Err(LlmError::Unavailable {
                                message: format!(
                                    "AI service temporarily unavailable. Please try again. ({error})"
                                ),
                                retriable,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Single-attempt probe: true when the API answers with at least one
    /// completion choice.
    pub async fn health_check(&self) -> bool {
        let probe = [PromptSegment::new(
            crate::models::internal::MessageRole::User,
            "Hello",
        )];

        match self.call_api(&probe).await {
            Ok(_) => true,
            Err(error) => {
                tracing::error!(error = %error, "Completion API health check failed");
                false
            }
        }
    }

    async fn call_api(&self, segments: &[PromptSegment]) -> Result<Completion, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: segments,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else if e.is_connect() {
                    LlmError::Connect
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::Auth,
                429 => LlmError::RateLimited,
                code if code >= 500 => LlmError::Server(code),
                code => LlmError::Api { status: code, message },
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(LlmError::InvalidResponse(
                "no completion choices returned".to_string(),
            ));
        };

        let tokens_used = completion.usage.map(|u| u.total_tokens).unwrap_or(0);

        Ok(Completion {
            content: choice.message.content,
            tokens_used,
        })
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..=500))
}

// Request/Response Models

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptSegment],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct CompletionUsage {
    total_tokens: u32,
}
