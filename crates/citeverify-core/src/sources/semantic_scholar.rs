use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::{Source, SourceContext, lookup_failed};
use crate::matching::{authors_match, surname_of, titles_match};
use crate::rate_limit::Service;
use crate::{Reference, VerificationResult};

const NAME: &str = "Semantic Scholar";
const SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";

/// Citation-graph search; only the top hit is considered.
pub struct SemanticScholar {
    ctx: SourceContext,
    api_key: Option<String>,
}

impl SemanticScholar {
    pub fn new(ctx: SourceContext, api_key: Option<String>) -> Self {
        Self { ctx, api_key }
    }
}

impl Source for SemanticScholar {
    fn name(&self) -> &str {
        NAME
    }

    fn verify<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>> {
        Box::pin(async move {
            let query = [
                ("query", reference.title.clone()),
                ("limit", "1".to_string()),
                ("fields", "title,authors,url".to_string()),
            ];
            let headers: Vec<(&str, String)> = self
                .api_key
                .iter()
                .map(|key| ("x-api-key", key.clone()))
                .collect();

            let resp = match self.ctx.get(Service::SemanticScholar, SEARCH_URL, &query, &headers).await {
                Ok(resp) => resp,
                Err(e) => return lookup_failed(NAME, reference, e),
            };
            let data: Value = match serde_json::from_str(&resp.body) {
                Ok(data) => data,
                Err(e) => return lookup_failed(NAME, reference, format!("invalid JSON: {}", e)),
            };

            match data["data"].as_array().and_then(|hits| hits.first()) {
                Some(hit) => judge(reference, hit),
                None => VerificationResult::not_found("No matching record found in Semantic Scholar."),
            }
        })
    }
}

/// First-author surname must agree and the title must match verbatim.
fn judge(reference: &Reference, hit: &Value) -> VerificationResult {
    let first_surname = hit["authors"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|a| a["name"].as_str())
        .map(surname_of);
    let title = hit["title"].as_str().unwrap_or("");

    if let Some(surname) = first_surname
        && authors_match(&reference.first_author_surname, surname)
    {
        let verdict = titles_match(&reference.title, title);
        if verdict.is_verbatim() {
            return VerificationResult::validated(format!(
                "Author and title match Semantic Scholar ({}).",
                verdict.label()
            ));
        }
    }

    VerificationResult::not_found("No matching record found in Semantic Scholar.")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::rate_limit::RateLimiters;
    use crate::retry::RetryPolicy;
    use crate::sources::mock::{MockHttp, MockReply};
    use crate::{ReferenceType, VerificationStatus};

    fn reference() -> Reference {
        Reference {
            title: "BERT: Pre-training of Deep Bidirectional Transformers for Language Understanding"
                .into(),
            first_author_surname: "Devlin".into(),
            doi: None,
            url: None,
            year: 2019,
            ref_type: ReferenceType::ConferencePaper,
            raw_normalized_text: String::new(),
        }
    }

    fn hit(title: &str, first_author: &str) -> Value {
        json!({
            "paperId": "df2b0e26d0599ce3e70df8a9da02e51594e0e992",
            "url": "https://www.semanticscholar.org/paper/df2b0e26",
            "title": title,
            "authors": [{ "authorId": "1", "name": first_author }, { "authorId": "2", "name": "Ming-Wei Chang" }],
        })
    }

    #[test]
    fn exact_title_and_surname_validates() {
        let result = judge(
            &reference(),
            &hit(
                "BERT: Pre-training of Deep Bidirectional Transformers for Language Understanding",
                "Jacob Devlin",
            ),
        );
        assert_eq!(result.status, VerificationStatus::Validated);
        assert_eq!(
            result.explanation,
            "Author and title match Semantic Scholar (exact match)."
        );
    }

    #[test]
    fn fuzzy_title_is_not_enough() {
        let result = judge(
            &reference(),
            &hit(
                "BERT: Pre-training of Deep Bidirectional Transformer for Language Understanding",
                "Jacob Devlin",
            ),
        );
        assert_eq!(result.status, VerificationStatus::NotFound);
    }

    #[test]
    fn different_first_author_not_found() {
        let result = judge(
            &reference(),
            &hit(
                "BERT: Pre-training of Deep Bidirectional Transformers for Language Understanding",
                "Kenton Lee",
            ),
        );
        assert_eq!(result.status, VerificationStatus::NotFound);
    }

    #[tokio::test]
    async fn empty_result_set_not_found() {
        let http = Arc::new(MockHttp::body(r#"{"total": 0, "offset": 0, "data": []}"#));
        let source = SemanticScholar::new(
            SourceContext::new(
                http.clone(),
                RetryPolicy::default(),
                Arc::new(RateLimiters::unlimited()),
                Duration::from_secs(10),
            ),
            None,
        );
        let result = source.verify(&reference()).await;
        assert_eq!(result.status, VerificationStatus::NotFound);
        let (_, query) = &http.requests()[0];
        assert!(query.contains(&("limit".into(), "1".into())));
        assert!(query.contains(&("fields".into(), "title,authors,url".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_then_success() {
        let body = json!({ "data": [hit(
            "BERT: Pre-training of Deep Bidirectional Transformers for Language Understanding",
            "Jacob Devlin",
        )] });
        let http = Arc::new(MockHttp::with_sequence(vec![
            MockReply::Status(429),
            MockReply::Body(body.to_string()),
        ]));
        let source = SemanticScholar::new(
            SourceContext::new(
                http.clone(),
                RetryPolicy::default(),
                Arc::new(RateLimiters::unlimited()),
                Duration::from_secs(10),
            ),
            Some("key".into()),
        );
        let result = source.verify(&reference()).await;
        assert_eq!(result.status, VerificationStatus::Validated);
        assert_eq!(http.call_count(), 2);
    }
}
