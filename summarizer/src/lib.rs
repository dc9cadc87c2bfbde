//! Content summarization against an OpenAI-compatible chat API.
//!
//! Summarization is best-effort: every failure path degrades to a fixed
//! sentinel string so report generation never aborts because of the LLM.

use async_trait::async_trait;
use redlens_core::{CoreError, SummarizerConfig, SummarizerError, Summarize, SummaryKind};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const EMPTY_CONTENT_SENTINEL: &str = "No content available for summary.";
const RATE_LIMIT_SENTINEL: &str =
    "AI summary could not be generated due to rate limits. Please try again later.";
const AUTH_SENTINEL: &str = "AI summary could not be generated: Invalid API key.";
const CONNECTION_SENTINEL: &str = "AI summary could not be generated: Connection failed.";
const GENERIC_SENTINEL: &str = "AI summary could not be generated. Please try again later.";

// Rough approximation: one token per four characters, plus overhead for the
// system prompt and message structure.
const MAX_CONTENT_CHARS: usize = 4000 * 4;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
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

pub struct SummarizerService {
    client: Client,
    config: SummarizerConfig,
    api_key: String,
}

impl SummarizerService {
    pub fn new(config: SummarizerConfig) -> Result<Self, CoreError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            CoreError::Summarizer(SummarizerError::AuthenticationFailed {
                reason: "API key is required".to_string(),
            })
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CoreError::Network)?;

        info!(
            "Initialized summarizer with model {} (fallback {})",
            config.model, config.fallback_model
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn system_prompt(kind: SummaryKind) -> &'static str {
        match kind {
            SummaryKind::Post => {
                "Summarize the following article text concisely, focusing on key points and main ideas."
            }
            SummaryKind::Comments => {
                "Summarize the following Reddit comments, capturing the overall community sentiment and key discussion points."
            }
        }
    }

    fn truncate_content(content: &str) -> String {
        if content.len() <= MAX_CONTENT_CHARS {
            return content.to_string();
        }
        warn!(
            "Content truncated from {} to {} characters",
            content.len(),
            MAX_CONTENT_CHARS
        );
        let mut cut = MAX_CONTENT_CHARS;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &content[..cut])
    }

    async fn request_summary(
        &self,
        model: &str,
        content: &str,
        kind: SummaryKind,
    ) -> Result<String, SummarizerError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: Self::system_prompt(kind).to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: content.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizerError::RequestTimeout
                } else {
                    SummarizerError::ServiceUnavailable
                }
            })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SummarizerError::AuthenticationFailed {
                    reason: "provider rejected credentials".to_string(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(30);
                return Err(SummarizerError::RateLimitExceeded { retry_after });
            }
            StatusCode::NOT_FOUND => {
                return Err(SummarizerError::ModelNotAvailable {
                    model: model.to_string(),
                });
            }
            status if status.is_server_error() => {
                return Err(SummarizerError::ServiceUnavailable);
            }
            status => {
                return Err(SummarizerError::InvalidResponse {
                    details: format!("unexpected status {}", status),
                });
            }
        }

        let body: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| SummarizerError::InvalidResponse {
                    details: e.to_string(),
                })?;

        let summary = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| SummarizerError::InvalidResponse {
                details: "empty response".to_string(),
            })?;

        Ok(summary)
    }

    /// Retry with exponential backoff on the primary model, then once more on
    /// the fallback model before giving up.
    async fn summarize_with_retry(&self, content: &str, kind: SummaryKind) -> String {
        let mut models = vec![self.config.model.as_str()];
        if self.config.fallback_model != self.config.model {
            models.push(self.config.fallback_model.as_str());
        }

        let mut last_error: Option<SummarizerError> = None;

        for (model_attempt, model) in models.iter().enumerate() {
            for attempt in 0..self.config.max_retries {
                debug!(
                    "Summarization attempt {}/{} with model {}",
                    attempt + 1,
                    self.config.max_retries,
                    model
                );

                match self.request_summary(model, content, kind).await {
                    Ok(summary) => {
                        info!(
                            "Generated {} summary with model {} ({} chars)",
                            kind.as_str(),
                            model,
                            summary.len()
                        );
                        return summary;
                    }
                    Err(SummarizerError::AuthenticationFailed { reason }) => {
                        error!("Summarizer authentication failed: {}", reason);
                        return AUTH_SENTINEL.to_string();
                    }
                    Err(SummarizerError::ModelNotAvailable { model }) => {
                        // A missing model cannot recover by retrying; move on
                        // to the fallback immediately.
                        warn!("Model {} not available, trying fallback", model);
                        last_error = Some(SummarizerError::ModelNotAvailable { model });
                        break;
                    }
                    Err(e) if e.is_retryable() && attempt + 1 < self.config.max_retries => {
                        let delay = self.config.retry_delay_secs * 2f64.powi(attempt as i32);
                        debug!("Retryable summarizer error ({}), waiting {:.1}s", e, delay);
                        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                        last_error = Some(e);
                    }
                    Err(e) => {
                        last_error = Some(e);
                        break;
                    }
                }
            }

            if model_attempt + 1 < models.len() {
                debug!("Exhausted model {}, switching to fallback", model);
            }
        }

        match last_error {
            Some(SummarizerError::RateLimitExceeded { .. }) => {
                warn!("Rate limit exhausted for all models");
                RATE_LIMIT_SENTINEL.to_string()
            }
            Some(SummarizerError::RequestTimeout) | Some(SummarizerError::ServiceUnavailable) => {
                warn!("Summarizer unreachable for all models");
                CONNECTION_SENTINEL.to_string()
            }
            Some(e) => {
                warn!("Summarization failed: {}", e);
                GENERIC_SENTINEL.to_string()
            }
            None => GENERIC_SENTINEL.to_string(),
        }
    }
}

#[async_trait]
impl Summarize for SummarizerService {
    async fn summarize(&self, content: &str, kind: SummaryKind) -> String {
        if content.trim().is_empty() {
            warn!("Empty content provided for summarization");
            return EMPTY_CONTENT_SENTINEL.to_string();
        }

        let content = Self::truncate_content(content);
        self.summarize_with_retry(&content, kind).await
    }
}
