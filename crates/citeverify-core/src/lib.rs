use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod bibliography;
pub mod cascade;
pub mod checker;
pub mod config_file;
pub mod extract;
pub mod http;
pub mod llm;
pub mod matching;
pub mod rate_limit;
pub mod retry;
pub mod sources;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use bibliography::{BibliographyError, find_bibliography_section};
pub use cascade::{Cascade, ShortCircuit, Stage};
pub use checker::CheckedReference;
pub use extract::{ExtractionError, ExtractionResult, SkipStats, extract_structured_references};
pub use http::{FetchError, HttpFetch, HttpResponse, ReqwestFetcher};
pub use llm::{GeminiClient, GroundedAnswer, LanguageModel, LlmError};
pub use matching::{TitleMatch, normalize_title, titles_match};
pub use rate_limit::{RateLimiters, Service, Throttle};
pub use retry::RetryPolicy;

/// Publication kind of a reference, as classified during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    JournalArticle,
    Preprint,
    ConferencePaper,
    Book,
    BookChapter,
    NonAcademicWebsite,
}

impl ReferenceType {
    pub const ALL: [ReferenceType; 6] = [
        ReferenceType::JournalArticle,
        ReferenceType::Preprint,
        ReferenceType::ConferencePaper,
        ReferenceType::Book,
        ReferenceType::BookChapter,
        ReferenceType::NonAcademicWebsite,
    ];

    /// Wire name used in the extraction schema and in exports.
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceType::JournalArticle => "journal_article",
            ReferenceType::Preprint => "preprint",
            ReferenceType::ConferencePaper => "conference_paper",
            ReferenceType::Book => "book",
            ReferenceType::BookChapter => "book_chapter",
            ReferenceType::NonAcademicWebsite => "non_academic_website",
        }
    }

    /// Human-readable label for reports.
    pub fn label(self) -> &'static str {
        match self {
            ReferenceType::JournalArticle => "Journal Article",
            ReferenceType::Preprint => "Preprint",
            ReferenceType::ConferencePaper => "Conference Paper",
            ReferenceType::Book => "Book",
            ReferenceType::BookChapter => "Book Chapter",
            ReferenceType::NonAcademicWebsite => "Website",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
    }
}

/// One structured bibliographic citation extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    /// First author's family name, or the organization name for non-human authors.
    pub first_author_surname: String,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub year: i32,
    pub ref_type: ReferenceType,
    /// The cleaned-up citation text as it should appear in output.
    pub raw_normalized_text: String,
}

impl Reference {
    /// The DOI, if present and non-blank.
    pub fn doi(&self) -> Option<&str> {
        self.doi.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    /// The URL, if present and non-blank.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Best link for a reader: the explicit URL, else a doi.org link.
    pub fn link(&self) -> Option<String> {
        if let Some(url) = self.url() {
            return Some(url.to_string());
        }
        self.doi().map(|doi| {
            if doi.starts_with("https://") || doi.starts_with("http://") {
                doi.to_string()
            } else {
                format!("https://doi.org/{}", doi)
            }
        })
    }
}

/// The trust status of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Independent evidence confirms the reference is real and matches.
    Validated,
    /// Independent evidence contradicts the reference (e.g. DOI resolves elsewhere).
    Invalid,
    /// No source could confirm or deny it.
    NotFound,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Validated => "validated",
            VerificationStatus::Invalid => "invalid",
            VerificationStatus::NotFound => "not_found",
        }
    }
}

/// Verdict for one reference plus the audit trail that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// Names the source and matching rule behind the status.
    pub explanation: String,
}

impl VerificationResult {
    pub fn validated(explanation: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Validated,
            explanation: explanation.into(),
        }
    }

    pub fn invalid(explanation: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Invalid,
            explanation: explanation.into(),
        }
    }

    pub fn not_found(explanation: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::NotFound,
            explanation: explanation.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("PDF backend error: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Bibliography(#[from] BibliographyError),
    #[error("reference extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Progress events emitted while a batch is being verified.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Checking {
        index: usize,
        total: usize,
        title: String,
    },
    Result {
        index: usize,
        total: usize,
        title: String,
        result: VerificationResult,
    },
    /// The batch was cancelled; `skipped` references were never started.
    Cancelled { skipped: usize },
}

/// Summary statistics for a checked document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckStats {
    pub total: usize,
    pub validated: usize,
    pub invalid: usize,
    pub not_found: usize,
    /// Raw citation text of every reference that was not validated.
    pub warnings: Vec<String>,
}

impl CheckStats {
    pub fn from_results(results: &[CheckedReference]) -> Self {
        let mut stats = CheckStats {
            total: results.len(),
            ..Default::default()
        };
        for checked in results {
            match checked.result.status {
                VerificationStatus::Validated => stats.validated += 1,
                VerificationStatus::Invalid => stats.invalid += 1,
                VerificationStatus::NotFound => stats.not_found += 1,
            }
            if checked.result.status != VerificationStatus::Validated {
                stats
                    .warnings
                    .push(checked.reference.raw_normalized_text.clone());
            }
        }
        stats
    }

    /// Invalid plus not-found references.
    pub fn warning_count(&self) -> usize {
        self.invalid + self.not_found
    }
}

/// Configuration for the verification cascade and batch driver.
#[derive(Clone)]
pub struct Config {
    /// Credential for the language-model-backed sources and extraction.
    pub gemini_api_key: Option<String>,
    pub search_model: String,
    pub extraction_model: String,
    pub s2_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
    pub num_workers: usize,
    pub request_timeout_secs: u64,
    pub webpage_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Source names to leave out of the cascade (case-insensitive).
    pub disabled_sources: Vec<String>,
    pub rate_limiters: Arc<RateLimiters>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "***"),
            )
            .field("search_model", &self.search_model)
            .field("extraction_model", &self.extraction_model)
            .field("s2_api_key", &self.s2_api_key.as_ref().map(|_| "***"))
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field("num_workers", &self.num_workers)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("webpage_timeout_secs", &self.webpage_timeout_secs)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("retry", &self.retry)
            .field("disabled_sources", &self.disabled_sources)
            .field("rate_limiters", &self.rate_limiters)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            search_model: llm::DEFAULT_SEARCH_MODEL.to_string(),
            extraction_model: llm::DEFAULT_EXTRACTION_MODEL.to_string(),
            s2_api_key: None,
            crossref_mailto: None,
            num_workers: 4,
            request_timeout_secs: 10,
            webpage_timeout_secs: 5,
            llm_timeout_secs: 60,
            retry: RetryPolicy::default(),
            disabled_sources: vec![],
            rate_limiters: Arc::new(RateLimiters::default()),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn webpage_timeout(&self) -> Duration {
        Duration::from_secs(self.webpage_timeout_secs)
    }

    pub fn is_disabled(&self, source: &str) -> bool {
        self.disabled_sources
            .iter()
            .any(|d| d.trim().eq_ignore_ascii_case(source))
    }

    /// The language-model credential, or a configuration error if it is missing.
    pub fn require_gemini_key(&self) -> Result<&str, CoreError> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                CoreError::Config(
                    "missing Gemini API key (set GEMINI_API_KEY or pass --gemini-key)".into(),
                )
            })
    }

    /// Build the Gemini client for this configuration.
    pub fn gemini_client(&self, client: reqwest::Client) -> Result<GeminiClient, CoreError> {
        let key = self.require_gemini_key()?;
        Ok(GeminiClient::new(client, key)
            .with_models(&self.search_model, &self.extraction_model)
            .with_timeout(Duration::from_secs(self.llm_timeout_secs)))
    }
}

/// Verify a list of references with a bounded pool of workers.
///
/// Results come back in input order. Progress events are emitted via the
/// callback. Cancellation is checked before each reference is started.
pub async fn check_references(
    refs: Vec<Reference>,
    cascade: Arc<Cascade>,
    num_workers: usize,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<CheckedReference> {
    checker::check_references(refs, cascade, num_workers, progress, cancel).await
}
