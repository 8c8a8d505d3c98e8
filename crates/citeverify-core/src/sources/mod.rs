//! Source adapters: independent evidence sources consulted by the cascade.
//!
//! Every adapter turns one [`Reference`] into one [`VerificationResult`].
//! Network or parse failures never escape an adapter; after the retry budget
//! is spent they degrade to `NotFound` with an explanation naming the source.

pub mod arxiv;
pub mod crossref;
pub mod semantic_scholar;
pub mod web_search;
pub mod webpage;
pub mod workshop;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::http::{FetchError, HttpFetch, HttpResponse};
use crate::llm::{GroundedAnswer, LanguageModel, LlmError, throttled};
use crate::rate_limit::{RateLimiters, Service};
use crate::retry::{Exhausted, RetryPolicy};
use crate::{Reference, VerificationResult};

pub use arxiv::Arxiv;
pub use crossref::Crossref;
pub use semantic_scholar::SemanticScholar;
pub use web_search::WebSearch;
pub use webpage::Webpage;
pub use workshop::Workshop;

/// An evidence source that can judge a single reference.
pub trait Source: Send + Sync {
    /// Canonical name used in explanations, logs and `disabled_sources`.
    fn name(&self) -> &str;

    fn verify<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>>;
}

/// Shared plumbing for adapters: HTTP capability, retry policy, rate limiters.
#[derive(Clone)]
pub struct SourceContext {
    pub http: Arc<dyn HttpFetch>,
    pub retry: RetryPolicy,
    pub rate_limiters: Arc<RateLimiters>,
    pub timeout: Duration,
}

impl SourceContext {
    pub fn new(
        http: Arc<dyn HttpFetch>,
        retry: RetryPolicy,
        rate_limiters: Arc<RateLimiters>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            retry,
            rate_limiters,
            timeout,
        }
    }

    /// GET with the default request timeout.
    pub async fn get(
        &self,
        service: Service,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, Exhausted<FetchError>> {
        self.get_with_timeout(service, url, query, headers, self.timeout)
            .await
    }

    /// GET under the service's throttle and the shared retry policy.
    ///
    /// Non-2xx statuses become errors; a 429 also slows the service's throttle.
    pub async fn get_with_timeout(
        &self,
        service: Service,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, Exhausted<FetchError>> {
        let throttle = self.rate_limiters.get(service);
        let http = &self.http;
        self.retry
            .run(service.name(), |_attempt| async move {
                if let Some(throttle) = throttle {
                    throttle.acquire().await;
                }
                let result = http
                    .get(url, query, headers, timeout)
                    .await
                    .and_then(HttpResponse::error_for_status);
                if let (Err(FetchError::RateLimited { .. }), Some(throttle)) = (&result, throttle) {
                    throttle.record_rate_limited();
                }
                result
            })
            .await
    }
}

/// Ask the model a grounded question.
pub(crate) async fn grounded_search(
    model: &dyn LanguageModel,
    retry: &RetryPolicy,
    rate_limiters: &RateLimiters,
    prompt: &str,
) -> Result<GroundedAnswer, Exhausted<LlmError>> {
    throttled(model, retry, rate_limiters, move || model.search_grounded(prompt)).await
}

/// The `NotFound` an adapter reports when its lookup itself failed.
pub(crate) fn lookup_failed(
    source: &str,
    reference: &Reference,
    error: impl std::fmt::Display,
) -> VerificationResult {
    tracing::warn!(source, title = %reference.title, error = %error, "lookup failed");
    VerificationResult::not_found(format!("{} lookup failed: {}.", source, error))
}
