//! Language-model capability: grounded web search and schema-constrained
//! JSON generation.
//!
//! [`GeminiClient`] talks to the Gemini `generateContent` REST endpoint; the
//! sources and the extractor only see the [`LanguageModel`] trait.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;

use crate::matching::normalize_title;
use crate::rate_limit::{RateLimiters, Service};
use crate::retry::{Exhausted, RetryPolicy, Retryable};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SEARCH_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.5-flash";

/// Free text returned by a grounded generation, with the pages it cited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundedAnswer {
    pub text: String,
    pub sources: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("language model request timed out")]
    Timeout,
    #[error("language model connection failed: {0}")]
    Connect(String),
    #[error("language model rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("language model returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("language model returned no candidates")]
    EmptyResponse,
    #[error("malformed language model response: {0}")]
    Malformed(String),
}

impl Retryable for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::Connect(_) | LlmError::RateLimited { .. } => true,
            LlmError::Status { status, .. } => *status >= 500,
            LlmError::EmptyResponse | LlmError::Malformed(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_connect() {
            LlmError::Connect(e.to_string())
        } else {
            LlmError::Malformed(e.to_string())
        }
    }
}

/// A generative model that can answer with live web-search grounding and
/// produce JSON constrained by a response schema.
pub trait LanguageModel: Send + Sync {
    /// Name used for rate limiting and log fields.
    fn name(&self) -> &str;

    fn search_grounded<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<GroundedAnswer, LlmError>> + Send + 'a>>;

    fn generate_json<'a>(
        &'a self,
        prompt: &'a str,
        schema: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}

/// Run one model call under the shared model throttle and `retry`.
///
/// `call` is invoked once per attempt. A 429 slows the throttle for every
/// other caller as well.
pub(crate) async fn throttled<'a, T, F>(
    model: &dyn LanguageModel,
    retry: &RetryPolicy,
    rate_limiters: &RateLimiters,
    call: F,
) -> Result<T, Exhausted<LlmError>>
where
    F: Fn() -> Pin<Box<dyn Future<Output = Result<T, LlmError>> + Send + 'a>>,
{
    let throttle = rate_limiters.get(Service::LanguageModel);
    retry
        .run(model.name(), |_attempt| {
            let request = call();
            async move {
                if let Some(throttle) = throttle {
                    throttle.acquire().await;
                }
                let result = request.await;
                if let (Err(LlmError::RateLimited { .. }), Some(throttle)) = (&result, throttle) {
                    throttle.record_rate_limited();
                }
                result
            }
        })
        .await
}

/// Interpret a model's strict true/false answer.
///
/// The answer is normalized like a title, so "True.", "**TRUE**" and
/// "Answer: true" all count; anything else is `false`.
pub fn parse_boolean_verdict(answer: &str) -> bool {
    let normalized = normalize_title(answer);
    normalized.starts_with("true") || normalized.ends_with("true")
}

/// Gemini REST client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    search_model: String,
    extraction_model: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("search_model", &self.search_model)
            .field("extraction_model", &self.extraction_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            search_model: DEFAULT_SEARCH_MODEL.to_string(),
            extraction_model: DEFAULT_EXTRACTION_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_models(mut self, search: impl Into<String>, extraction: impl Into<String>) -> Self {
        self.search_model = search.into();
        self.extraction_model = extraction.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn generate(&self, model: &str, body: &Value) -> Result<Value, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            model
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(crate::http::parse_retry_after);
            return Err(LlmError::RateLimited { retry_after });
        }
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status,
                message: error_message(&message),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))
    }
}

/// Pull the human-readable message out of a Gemini error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Concatenated text parts of the first candidate.
fn candidate_text(response: &Value) -> Result<String, LlmError> {
    let parts = response["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| c["content"]["parts"].as_array())
        .ok_or(LlmError::EmptyResponse)?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

/// URIs of the web pages the first candidate was grounded on.
fn grounding_sources(response: &Value) -> Vec<String> {
    response["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| c["groundingMetadata"]["groundingChunks"].as_array())
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| chunk["web"]["uri"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn search_grounded<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<GroundedAnswer, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            let body = json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                "tools": [{ "google_search": {} }],
                "generationConfig": { "temperature": 0 },
            });
            let response = self.generate(&self.search_model, &body).await?;
            Ok(GroundedAnswer {
                text: candidate_text(&response)?,
                sources: grounding_sources(&response),
            })
        })
    }

    fn generate_json<'a>(
        &'a self,
        prompt: &'a str,
        schema: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            let body = json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": 0,
                    "responseMimeType": "application/json",
                    "responseSchema": schema,
                    "thinkingConfig": { "thinkingBudget": 0 },
                },
            });
            let response = self.generate(&self.extraction_model, &body).await?;
            candidate_text(&response)
        })
    }
}
