use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::{Source, SourceContext};
use crate::matching::titles_match;
use crate::rate_limit::Service;
use crate::{Reference, VerificationResult};

const NAME: &str = "Webpage";

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// Website references: compare the page's `<title>` with the cited title.
///
/// Anything that prevents reading a title (no URL, fetch failure, no
/// `<title>` element) hands the reference to the fallback source.
pub struct Webpage {
    ctx: SourceContext,
    timeout: Duration,
    fallback: Option<Arc<dyn Source>>,
}

impl Webpage {
    pub fn new(ctx: SourceContext, timeout: Duration, fallback: Option<Arc<dyn Source>>) -> Self {
        Self {
            ctx,
            timeout,
            fallback,
        }
    }

    async fn fall_back(&self, reference: &Reference, reason: &str) -> VerificationResult {
        match &self.fallback {
            Some(source) => {
                tracing::debug!(title = %reference.title, reason, fallback = source.name(), "webpage check inconclusive");
                source.verify(reference).await
            }
            None => VerificationResult::not_found(format!("{}.", reason)),
        }
    }
}

/// Text of the document's first `<title>` element, if non-blank.
fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE_SELECTOR)
        .next()?
        .text()
        .collect::<String>();
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

impl Source for Webpage {
    fn name(&self) -> &str {
        NAME
    }

    fn verify<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>> {
        Box::pin(async move {
            let Some(url) = reference.url() else {
                return self.fall_back(reference, "No URL provided").await;
            };

            let body = match self
                .ctx
                .get_with_timeout(Service::Webpage, url, &[], &[], self.timeout)
                .await
            {
                Ok(resp) => resp.body,
                Err(e) => {
                    tracing::warn!(source = NAME, title = %reference.title, url, error = %e, "error accessing URL");
                    return self
                        .fall_back(reference, &format!("Could not access {}: {}", url, e))
                        .await;
                }
            };

            let Some(found) = page_title(&body) else {
                tracing::warn!(source = NAME, title = %reference.title, url, "no <title> tag found");
                return self
                    .fall_back(reference, &format!("No <title> found at {}", url))
                    .await;
            };

            let verdict = titles_match(&reference.title, &found);
            if verdict.is_verbatim() {
                VerificationResult::validated(format!(
                    "Webpage title matches reference title ({}).",
                    verdict.label()
                ))
            } else {
                VerificationResult::not_found(format!(
                    "Webpage title at {} does not match reference title.",
                    url
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::FetchError;
    use crate::rate_limit::RateLimiters;
    use crate::retry::RetryPolicy;
    use crate::sources::mock::{MockHttp, MockReply, MockSource};
    use crate::{ReferenceType, VerificationStatus};

    fn reference(url: Option<&str>) -> Reference {
        Reference {
            title: "Rust Release Notes".into(),
            first_author_surname: "Rust Project".into(),
            doi: None,
            url: url.map(String::from),
            year: 2024,
            ref_type: ReferenceType::NonAcademicWebsite,
            raw_normalized_text: String::new(),
        }
    }

    fn webpage(http: Arc<MockHttp>, fallback: Arc<MockSource>) -> Webpage {
        let ctx = SourceContext::new(
            http,
            RetryPolicy::default(),
            Arc::new(RateLimiters::unlimited()),
            Duration::from_secs(10),
        );
        let fallback: Arc<dyn Source> = fallback;
        Webpage::new(ctx, Duration::from_secs(5), Some(fallback))
    }

    fn web_search() -> Arc<MockSource> {
        Arc::new(MockSource::new(
            "Web Search",
            VerificationResult::validated("Web search found matching reference."),
        ))
    }

    #[test]
    fn extracts_trimmed_title() {
        let html = "<html><head><title>\n  Rust Release Notes | Rust  \n</title></head><body></body></html>";
        assert_eq!(page_title(html).as_deref(), Some("Rust Release Notes | Rust"));
        assert_eq!(page_title("<html><body>none</body></html>"), None);
        assert_eq!(page_title("<title>   </title>"), None);
    }

    #[tokio::test]
    async fn partial_title_validates_without_fallback() {
        let http = Arc::new(MockHttp::body(
            "<html><head><title>Rust Release Notes | Rust</title></head></html>",
        ));
        let fallback = web_search();
        let result = webpage(http, fallback.clone())
            .verify(&reference(Some("https://doc.rust-lang.org/releases.html")))
            .await;
        assert_eq!(result.status, VerificationStatus::Validated);
        assert_eq!(
            result.explanation,
            "Webpage title matches reference title (partial match)."
        );
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn mismatched_title_names_the_page() {
        let http = Arc::new(MockHttp::body("<title>Page Not Found</title>"));
        let fallback = web_search();
        let result = webpage(http, fallback.clone())
            .verify(&reference(Some("https://example.org/notes")))
            .await;
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert!(result.explanation.contains("https://example.org/notes"));
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_url_falls_back() {
        let http = Arc::new(MockHttp::body(""));
        let fallback = web_search();
        let result = webpage(http.clone(), fallback.clone())
            .verify(&reference(None))
            .await;
        assert_eq!(result.status, VerificationStatus::Validated);
        assert_eq!(fallback.call_count(), 1);
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_title_falls_back() {
        let http = Arc::new(MockHttp::body("<html><body>hello</body></html>"));
        let fallback = web_search();
        webpage(http, fallback.clone())
            .verify(&reference(Some("https://example.org")))
            .await;
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn client_error_falls_back_immediately() {
        let http = Arc::new(MockHttp::new(MockReply::Status(404)));
        let fallback = web_search();
        webpage(http.clone(), fallback.clone())
            .verify(&reference(Some("https://example.org/gone")))
            .await;
        assert_eq!(http.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_falls_back_after_retries() {
        let http = Arc::new(MockHttp::new(MockReply::Error(FetchError::Connect(
            "dns error".into(),
        ))));
        let fallback = web_search();
        let result = webpage(http.clone(), fallback.clone())
            .verify(&reference(Some("https://unreachable.invalid")))
            .await;
        assert_eq!(result.status, VerificationStatus::Validated);
        assert_eq!(http.call_count(), 3);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn no_fallback_reports_reason() {
        let http = Arc::new(MockHttp::body(""));
        let ctx = SourceContext::new(
            http,
            RetryPolicy::default(),
            Arc::new(RateLimiters::unlimited()),
            Duration::from_secs(10),
        );
        let result = Webpage::new(ctx, Duration::from_secs(5), None)
            .verify(&reference(None))
            .await;
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert_eq!(result.explanation, "No URL provided.");
    }
}
