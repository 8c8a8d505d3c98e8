//! HTTP GET capability consumed by the source adapters.
//!
//! Sources never touch `reqwest` directly; they go through [`HttpFetch`] so
//! the cascade can be exercised against canned responses.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::retry::Retryable;

/// Status code and body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into the matching [`FetchError`].
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        match self.status {
            200..=299 => Ok(self),
            429 => Err(FetchError::RateLimited {
                retry_after: self.retry_after,
            }),
            status => Err(FetchError::Status(status)),
        }
    }
}

/// Failure of a single request, classified for the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connect(_) | FetchError::RateLimited { .. } => true,
            FetchError::Status(status) => *status >= 500,
            FetchError::Malformed(_) | FetchError::Other(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if e.is_decode() || e.is_body() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

/// A capability that performs one HTTP GET with query parameters and extra
/// request headers.
///
/// Every status code is returned as a response; only transport failures are
/// errors. Callers decide which statuses they accept.
pub trait HttpFetch: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a str,
        query: &'a [(&'a str, String)],
        headers: &'a [(&'a str, String)],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, FetchError>> + Send + 'a>>;
}

/// [`HttpFetch`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client, crossref_mailto: Option<&str>) -> Self {
        let user_agent = match crossref_mailto {
            Some(email) => format!("citeverify/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email),
            None => format!("citeverify/{}", env!("CARGO_PKG_VERSION")),
        };
        Self { client, user_agent }
    }

    /// Build a client tuned for many small API requests.
    pub fn default_client() -> reqwest::Client {
        reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get<'a>(
        &'a self,
        url: &'a str,
        query: &'a [(&'a str, String)],
        headers: &'a [(&'a str, String)],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let mut request = self
                .client
                .get(url)
                .query(query)
                .header("User-Agent", &self.user_agent)
                .timeout(timeout);
            for (name, value) in headers {
                request = request.header(*name, value);
            }
            let resp = request.send().await?;

            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = resp.text().await?;

            Ok(HttpResponse {
                status,
                body,
                retry_after,
            })
        })
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: use a conservative fixed wait rather than parsing the date
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}
