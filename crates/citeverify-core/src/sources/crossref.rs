use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::{Source, SourceContext, lookup_failed};
use crate::matching::{authors_match, dois_match, normalize_title, normalized_titles_match};
use crate::rate_limit::Service;
use crate::{Reference, VerificationResult};

const NAME: &str = "Crossref";
const WORKS_URL: &str = "https://api.crossref.org/works";

/// Crossref catalog lookup by title, with DOI cross-checking.
///
/// The only source whose verdict can be `Invalid`: when both the reference
/// and a returned record carry a DOI, the DOI decides.
pub struct Crossref {
    ctx: SourceContext,
    mailto: Option<String>,
}

impl Crossref {
    pub fn new(ctx: SourceContext, mailto: Option<String>) -> Self {
        Self { ctx, mailto }
    }
}

impl Source for Crossref {
    fn name(&self) -> &str {
        NAME
    }

    fn verify<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>> {
        Box::pin(async move {
            let mut query = vec![
                ("query.title", reference.title.clone()),
                ("rows", "5".to_string()),
            ];
            if let Some(ref email) = self.mailto {
                query.push(("mailto", email.clone()));
            }

            let resp = match self.ctx.get(Service::Crossref, WORKS_URL, &query, &[]).await {
                Ok(resp) => resp,
                Err(e) => return lookup_failed(NAME, reference, e),
            };

            let data: Value = match serde_json::from_str(&resp.body) {
                Ok(data) => data,
                Err(e) => return lookup_failed(NAME, reference, format!("invalid JSON: {}", e)),
            };
            let items = data["message"]["items"]
                .as_array()
                .cloned()
                .unwrap_or_default();

            judge(reference, &items)
        })
    }
}

/// Apply the Crossref match rules to the returned records, in order.
fn judge(reference: &Reference, items: &[Value]) -> VerificationResult {
    let normalized_input = normalize_title(&reference.title);

    for item in items {
        let first_family = item["author"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|a| a["family"].as_str());
        let record_doi = item["DOI"].as_str().map(str::trim).filter(|d| !d.is_empty());

        if let (Some(ref_doi), Some(record_doi)) = (reference.doi(), record_doi) {
            if !dois_match(ref_doi, record_doi) {
                return VerificationResult::invalid(format!(
                    "DOI does not match Crossref record ({} vs {}).",
                    ref_doi, record_doi
                ));
            }
            match first_family {
                Some(family) if authors_match(&reference.first_author_surname, family) => {
                    return VerificationResult::validated(
                        "Author, title and DOI match Crossref record.",
                    );
                }
                Some(family) => {
                    return VerificationResult::invalid(format!(
                        "Author does not match Crossref record ({} vs {}).",
                        reference.first_author_surname, family
                    ));
                }
                None => {}
            }
        }

        let Some(family) = first_family else {
            continue;
        };
        if !authors_match(&reference.first_author_surname, family) {
            continue;
        }
        let Some(record_title) = item["title"]
            .as_array()
            .and_then(|t| t.first())
            .and_then(|t| t.as_str())
        else {
            continue;
        };
        let verdict = normalized_titles_match(&normalized_input, &normalize_title(record_title));
        if verdict.is_match() {
            return VerificationResult::validated(format!(
                "Author and title match Crossref record ({}).",
                verdict.label()
            ));
        }
    }

    VerificationResult::not_found("No matching record found in Crossref.")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::http::FetchError;
    use crate::rate_limit::RateLimiters;
    use crate::retry::RetryPolicy;
    use crate::sources::mock::{MockHttp, MockReply};
    use crate::{ReferenceType, VerificationStatus};

    fn vaswani(doi: Option<&str>) -> Reference {
        Reference {
            title: "Attention Is All You Need".into(),
            first_author_surname: "Vaswani".into(),
            doi: doi.map(String::from),
            url: None,
            year: 2017,
            ref_type: ReferenceType::ConferencePaper,
            raw_normalized_text: "Vaswani, A. et al. (2017). Attention Is All You Need.".into(),
        }
    }

    fn item(title: &str, family: &str, doi: Option<&str>) -> Value {
        let mut item = json!({
            "title": [title],
            "author": [{ "given": "A.", "family": family }],
        });
        if let Some(doi) = doi {
            item["DOI"] = json!(doi);
        }
        item
    }

    fn crossref(http: Arc<MockHttp>) -> Crossref {
        let ctx = SourceContext::new(
            http,
            RetryPolicy::default(),
            Arc::new(RateLimiters::unlimited()),
            Duration::from_secs(10),
        );
        Crossref::new(ctx, Some("me@example.org".into()))
    }

    #[test]
    fn exact_title_with_matching_author_validates() {
        let items = [item("Attention is All you Need", "Vaswani", None)];
        let result = judge(&vaswani(None), &items);
        assert_eq!(result.status, VerificationStatus::Validated);
        assert!(result.explanation.contains("Crossref"));
        assert!(result.explanation.contains("exact match"));
    }

    #[test]
    fn author_mismatch_without_doi_is_skipped() {
        let items = [
            item("Attention Is All You Need", "Smith", None),
            item("Attention Is All You Need: Revisited", "Vaswani", None),
        ];
        let result = judge(&vaswani(None), &items);
        assert_eq!(result.status, VerificationStatus::Validated);
        assert!(result.explanation.contains("partial match"));
    }

    #[test]
    fn equal_doi_and_author_validates() {
        let items = [item("Something Else Entirely", "Vaswani", Some("10.5555/3295222"))];
        let result = judge(&vaswani(Some("https://doi.org/10.5555/3295222")), &items);
        assert_eq!(result.status, VerificationStatus::Validated);
        assert_eq!(result.explanation, "Author, title and DOI match Crossref record.");
    }

    #[test]
    fn equal_doi_different_author_is_invalid() {
        let items = [item("Attention Is All You Need", "Shazeer", Some("10.5555/3295222"))];
        let result = judge(&vaswani(Some("10.5555/3295222")), &items);
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert!(result.explanation.contains("Author does not match"));
    }

    #[test]
    fn doi_mismatch_is_invalid_regardless_of_title() {
        let items = [
            item("Attention Is All You Need", "Vaswani", Some("10.1/other")),
            item("Attention Is All You Need", "Vaswani", Some("10.5555/3295222")),
        ];
        let result = judge(&vaswani(Some("10.5555/3295222")), &items);
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert!(result.explanation.contains("DOI does not match"));
    }

    #[test]
    fn record_without_doi_uses_title_rule() {
        let items = [item("Attention Is All You Need", "Vaswani", None)];
        let result = judge(&vaswani(Some("10.5555/3295222")), &items);
        assert_eq!(result.status, VerificationStatus::Validated);
    }

    #[test]
    fn no_items_not_found() {
        let result = judge(&vaswani(None), &[]);
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert_eq!(result.explanation, "No matching record found in Crossref.");
    }

    #[tokio::test(start_paused = true)]
    async fn sends_title_query_and_mailto() {
        let body = json!({ "message": { "items": [item("Attention Is All You Need", "Vaswani", None)] } });
        let http = Arc::new(MockHttp::body(&body.to_string()));
        let result = crossref(http.clone()).verify(&vaswani(None)).await;
        assert_eq!(result.status, VerificationStatus::Validated);

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        let (url, query) = &requests[0];
        assert_eq!(url, WORKS_URL);
        assert!(query.contains(&("query.title".into(), "Attention Is All You Need".into())));
        assert!(query.contains(&("rows".into(), "5".into())));
        assert!(query.contains(&("mailto".into(), "me@example.org".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_degrade_to_not_found() {
        let http = Arc::new(MockHttp::new(MockReply::Error(FetchError::Timeout)));
        let result = crossref(http.clone()).verify(&vaswani(None)).await;
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert!(result.explanation.starts_with("Crossref lookup failed"));
        assert_eq!(http.call_count(), 3);
    }

    #[tokio::test]
    async fn malformed_body_degrades_to_not_found() {
        let http = Arc::new(MockHttp::body("<html>oops</html>"));
        let result = crossref(http).verify(&vaswani(None)).await;
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert!(result.explanation.contains("invalid JSON"));
    }

    fn resnet() -> Reference {
        Reference {
            title: "Deep Residual Learning for Image Recognition".into(),
            first_author_surname: "He".into(),
            doi: None,
            url: None,
            year: 2016,
            ref_type: ReferenceType::ConferencePaper,
            raw_normalized_text: String::new(),
        }
    }

    #[tokio::test]
    async fn title_just_above_fuzzy_threshold_validates() {
        // similarity ~86
        let body = json!({ "message": { "items": [item("Deep Residual Networks for Image Recognition", "He", None)] } });
        let http = Arc::new(MockHttp::body(&body.to_string()));
        let result = crossref(http).verify(&resnet()).await;
        assert_eq!(result.status, VerificationStatus::Validated);
        assert_eq!(result.explanation, "Author and title match Crossref record (fuzzy match).");
    }

    #[tokio::test]
    async fn title_below_fuzzy_threshold_not_found() {
        // similarity 80
        let body = json!({ "message": { "items": [item("Deep Residual Nets for Visual Recognition", "He", None)] } });
        let http = Arc::new(MockHttp::body(&body.to_string()));
        let result = crossref(http).verify(&resnet()).await;
        assert_eq!(result.status, VerificationStatus::NotFound);
    }
}
