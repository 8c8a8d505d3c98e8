use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{Source, grounded_search, lookup_failed};
use crate::llm::{LanguageModel, parse_boolean_verdict};
use crate::rate_limit::RateLimiters;
use crate::retry::RetryPolicy;
use crate::{Reference, VerificationResult};

const NAME: &str = "Workshop";

/// Substrings of the citation text that mark workshop-style venues.
pub const WORKSHOP_INDICATORS: [&str; 4] = ["workshop", "symposium", "proc.", "proceedings"];

/// Whether the citation text looks like a workshop or symposium paper.
pub fn is_likely_workshop(raw_text: &str) -> bool {
    let lower = raw_text.to_lowercase();
    WORKSHOP_INDICATORS.iter().any(|i| lower.contains(i))
}

/// Grounded search for workshop papers, which catalogs index poorly.
pub struct Workshop {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    rate_limiters: Arc<RateLimiters>,
}

impl Workshop {
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
        "Please search for this exact workshop paper and verify it exists:\n\
         Title: {}\n\
         Author: {}\n\
         Year: {}\n\n\
         This paper appears to be from a workshop or symposium. Check conferences, workshops, \
         and personal/university pages. Return 'True' only if you can find evidence this \
         specific workshop paper exists (exact title and author match). Return 'False' otherwise.\n\
         Return only 'True' or 'False', without any additional explanation.\n",
        reference.title, reference.first_author_surname, reference.year
    )
}

impl Source for Workshop {
    fn name(&self) -> &str {
        NAME
    }

    fn verify<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>> {
        Box::pin(async move {
            if !is_likely_workshop(&reference.raw_normalized_text) {
                return VerificationResult::not_found("Not a workshop paper.");
            }

            let prompt = prompt(reference);
            match grounded_search(
                self.model.as_ref(),
                &self.retry,
                &self.rate_limiters,
                &prompt,
            )
            .await
            {
                Ok(answer) if parse_boolean_verdict(&answer.text) => {
                    VerificationResult::validated("Workshop paper found via web search.")
                }
                Ok(_) => VerificationResult::not_found("Workshop paper not found via web search."),
                Err(e) => lookup_failed(NAME, reference, e),
            }
        })
    }
}
