//! Structured reference extraction from raw bibliography text.
//!
//! The language model normalises the (often mangled) PDF text and returns a
//! JSON array constrained by [`response_schema`]. Its output is treated as
//! untrusted: a structurally broken response fails the whole batch, while
//! individual records with implausible values are dropped and counted.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use thiserror::Error;

use crate::llm::{LanguageModel, LlmError, throttled};
use crate::rate_limit::RateLimiters;
use crate::retry::{Exhausted, RetryPolicy};
use crate::{Reference, ReferenceType};

const PROMPT: &str = "Process a reference list extracted from a PDF, where formatting may be corrupted.
Follow these steps to clean and extract key information:
1. Normalisation: Fix spacing errors, line breaks, and punctuation.
2. Extraction: For each reference, extract:
- Title (full title case)
- Author: First author's family name (If the author is an organization, use the organization name)
- DOI (include if explicitly stated; otherwise leave blank)
- URL (include if explicitly stated; otherwise leave blank)
- Year (4-digit publication year)
- Type (journal_article, preprint, conference_paper, book, book_chapter, OR non_academic_website. If the author is not a human but an organization, select non_academic_website)
- Bib: Normalised input bibliography (correct format, in one line)

";

const REQUIRED_FIELDS: [&str; 7] = ["title", "author", "DOI", "URL", "year", "type", "bib"];

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("language model call failed: {0}")]
    Model(#[from] Exhausted<LlmError>),
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response is not a JSON array")]
    NotAnArray,
    #[error("record {index} is missing field `{field}`")]
    MissingField { index: usize, field: &'static str },
}

/// Records dropped during extraction, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipStats {
    pub implausible_year: usize,
    pub unknown_type: usize,
    pub empty_title: usize,
}

impl SkipStats {
    pub fn total(&self) -> usize {
        self.implausible_year + self.unknown_type + self.empty_title
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub references: Vec<Reference>,
    pub skip_stats: SkipStats,
}

/// JSON schema for the model's response: an array of reference records.
pub fn response_schema() -> Value {
    let types: Vec<&str> = ReferenceType::ALL.iter().map(|t| t.as_str()).collect();
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" },
                "author": { "type": "STRING" },
                "DOI": { "type": "STRING" },
                "URL": { "type": "STRING" },
                "year": { "type": "INTEGER" },
                "type": { "type": "STRING", "enum": types },
                "bib": { "type": "STRING" },
            },
            "required": REQUIRED_FIELDS,
        }
    })
}

/// Ask the model to split and structure `bib_text` into references.
///
/// The call shares the model throttle with the verification sources, so
/// extracting one document while another is being verified stays in quota.
pub async fn extract_structured_references(
    bib_text: &str,
    model: &dyn LanguageModel,
    retry: &RetryPolicy,
    rate_limiters: &RateLimiters,
) -> Result<ExtractionResult, ExtractionError> {
    let prompt = format!("{}{}", PROMPT, bib_text);
    let prompt = prompt.as_str();
    let schema = &response_schema();

    let raw = throttled(model, retry, rate_limiters, move || {
        model.generate_json(prompt, schema)
    })
    .await?;

    let result = parse_records(&raw, current_year())?;
    tracing::info!(
        extracted = result.references.len(),
        skipped = result.skip_stats.total(),
        "references extracted"
    );
    Ok(result)
}

/// Validate the model's JSON and convert it into references.
fn parse_records(raw: &str, current_year: i32) -> Result<ExtractionResult, ExtractionError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;
    let records = value.as_array().ok_or(ExtractionError::NotAnArray)?;

    let mut result = ExtractionResult::default();
    for (index, record) in records.iter().enumerate() {
        for field in REQUIRED_FIELDS {
            if record.get(field).is_none_or(Value::is_null) {
                return Err(ExtractionError::MissingField { index, field });
            }
        }

        let text = |field: &str| record[field].as_str().unwrap_or("").trim().to_string();
        let optional = |field: &str| Some(text(field)).filter(|s| !s.is_empty());

        let title = text("title");
        if title.is_empty() {
            result.skip_stats.empty_title += 1;
            continue;
        }

        let year = match record["year"]
            .as_i64()
            .or_else(|| record["year"].as_str().and_then(|s| s.trim().parse().ok()))
            .and_then(|y| i32::try_from(y).ok())
        {
            Some(year) if (1000..=current_year + 1).contains(&year) => year,
            _ => {
                tracing::warn!(title = %title, year = %record["year"], "skipping record with implausible year");
                result.skip_stats.implausible_year += 1;
                continue;
            }
        };

        let Some(ref_type) = record["type"].as_str().and_then(ReferenceType::parse) else {
            tracing::warn!(title = %title, ref_type = %record["type"], "skipping record with unknown type");
            result.skip_stats.unknown_type += 1;
            continue;
        };

        result.references.push(Reference {
            first_author_surname: text("author"),
            doi: optional("DOI"),
            url: optional("URL"),
            year,
            ref_type,
            raw_normalized_text: text("bib"),
            title,
        });
    }

    Ok(result)
}

/// Calendar year (UTC) of the system clock.
fn current_year() -> i32 {
    let days = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / 86_400)
        .unwrap_or(0) as i64;
    year_from_days(days)
}

/// Proleptic Gregorian year of a day count since 1970-01-01.
fn year_from_days(days: i64) -> i32 {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let year = yoe + era * 400 + if mp >= 10 { 1 } else { 0 };
    year as i32
}
