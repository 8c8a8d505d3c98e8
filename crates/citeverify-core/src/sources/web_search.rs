use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{Source, grounded_search, lookup_failed};
use crate::llm::{LanguageModel, parse_boolean_verdict};
use crate::rate_limit::RateLimiters;
use crate::retry::RetryPolicy;
use crate::{Reference, VerificationResult};

const NAME: &str = "Web Search";

/// Last-resort check: ask a search-grounded model whether a page with the
/// exact title and author exists.
pub struct WebSearch {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    rate_limiters: Arc<RateLimiters>,
}

impl WebSearch {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        retry: RetryPolicy,
        rate_limiters: Arc<RateLimiters>,
    ) -> Self {
        Self {
            model,
            retry,
            rate_limiters,
        }
    }
}

fn prompt(reference: &Reference) -> String {
    format!(
        "Please search for the reference on the web, compare with the search results, \
         and determine if it is genuine.\n\
         Return 'True' only if a website with the exact title and author is found. \
         Otherwise, return 'False'.\n\
         Return only 'True' or 'False', without any additional information.\n\n\
         Author: {}\n\
         Title: {}\n",
        reference.first_author_surname, reference.title
    )
}

impl Source for WebSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn verify<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>> {
        Box::pin(async move {
            let prompt = prompt(reference);
            let answer = match grounded_search(
                self.model.as_ref(),
                &self.retry,
                &self.rate_limiters,
                &prompt,
            )
            .await
            {
                Ok(answer) => answer,
                Err(e) => return lookup_failed(NAME, reference, e),
            };

            if parse_boolean_verdict(&answer.text) {
                tracing::debug!(title = %reference.title, sources = ?answer.sources, "web search confirmed");
                VerificationResult::validated("Web search found matching reference.")
            } else {
                VerificationResult::not_found("Web search did not find matching reference.")
            }
        })
    }
}
