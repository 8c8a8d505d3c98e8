//! The verification cascade: an ordered list of sources, each with the rule
//! deciding whether its verdict ends the lookup.
//!
//! Website references take a separate path (page title, then web search);
//! everything else walks the academic stages in order.

use std::sync::Arc;

use crate::http::{HttpFetch, ReqwestFetcher};
use crate::llm::LanguageModel;
use crate::sources::{
    Arxiv, Crossref, SemanticScholar, Source, SourceContext, WebSearch, Webpage, Workshop,
};
use crate::{Config, CoreError, Reference, ReferenceType, VerificationResult, VerificationStatus};

/// Which verdicts of a stage end the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuit {
    /// Stop on `Validated` only.
    OnValidated,
    /// Stop on `Validated` or `Invalid`; used by authoritative sources.
    OnDefinitive,
}

impl ShortCircuit {
    pub fn stops(self, status: VerificationStatus) -> bool {
        match self {
            ShortCircuit::OnValidated => status == VerificationStatus::Validated,
            ShortCircuit::OnDefinitive => status != VerificationStatus::NotFound,
        }
    }
}

/// One step of the academic path.
#[derive(Clone)]
pub struct Stage {
    pub source: Arc<dyn Source>,
    pub rule: ShortCircuit,
}

impl Stage {
    pub fn new(source: Arc<dyn Source>, rule: ShortCircuit) -> Self {
        Self { source, rule }
    }
}

pub struct Cascade {
    website: Option<Arc<dyn Source>>,
    stages: Vec<Stage>,
}

impl std::fmt::Debug for Cascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cascade")
            .field("website", &self.website.as_ref().map(|s| s.name()))
            .field("stages", &self.source_names())
            .finish()
    }
}

impl Cascade {
    /// Assemble a cascade from explicit parts.
    pub fn new(website: Option<Arc<dyn Source>>, stages: Vec<Stage>) -> Self {
        Self { website, stages }
    }

    /// Build the standard cascade with real HTTP and Gemini clients.
    ///
    /// Fails with [`CoreError::Config`] when a language-model-backed source
    /// is enabled but no credential is configured.
    pub fn from_config(config: &Config) -> Result<Self, CoreError> {
        let client = ReqwestFetcher::default_client();
        let http: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(
            client.clone(),
            config.crossref_mailto.as_deref(),
        ));
        let model: Option<Arc<dyn LanguageModel>> = if needs_model(config) {
            Some(Arc::new(config.gemini_client(client)?))
        } else {
            None
        };
        Self::with_capabilities(config, http, model)
    }

    /// Build the standard cascade over the given capabilities.
    ///
    /// Order: Crossref, arXiv, workshop search, Semantic Scholar for academic
    /// references; page title with web-search fallback for websites.
    /// Sources named in `config.disabled_sources` are left out.
    pub fn with_capabilities(
        config: &Config,
        http: Arc<dyn HttpFetch>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self, CoreError> {
        let model = match model {
            Some(model) => Some(model),
            None if needs_model(config) => {
                return Err(CoreError::Config(
                    "web search and workshop sources need a language model".into(),
                ));
            }
            None => None,
        };

        let ctx = SourceContext::new(
            http,
            config.retry,
            config.rate_limiters.clone(),
            config.request_timeout(),
        );
        let enabled = |name: &str| !config.is_disabled(name);

        let mut stages = Vec::new();
        if enabled("Crossref") {
            stages.push(Stage::new(
                Arc::new(Crossref::new(ctx.clone(), config.crossref_mailto.clone())),
                ShortCircuit::OnDefinitive,
            ));
        }
        if enabled("arXiv") {
            stages.push(Stage::new(
                Arc::new(Arxiv::new(ctx.clone())),
                ShortCircuit::OnValidated,
            ));
        }
        if let Some(model) = model.as_ref().filter(|_| enabled("Workshop")) {
            stages.push(Stage::new(
                Arc::new(Workshop::new(
                    model.clone(),
                    config.retry,
                    config.rate_limiters.clone(),
                )),
                ShortCircuit::OnValidated,
            ));
        }
        if enabled("Semantic Scholar") {
            stages.push(Stage::new(
                Arc::new(SemanticScholar::new(
                    ctx.clone(),
                    config.s2_api_key.clone(),
                )),
                ShortCircuit::OnValidated,
            ));
        }

        let web_search: Option<Arc<dyn Source>> = model
            .filter(|_| enabled("Web Search"))
            .map(|model| {
                Arc::new(WebSearch::new(
                    model,
                    config.retry,
                    config.rate_limiters.clone(),
                )) as Arc<dyn Source>
            });
        let website = if enabled("Webpage") {
            Some(Arc::new(Webpage::new(ctx, config.webpage_timeout(), web_search)) as Arc<dyn Source>)
        } else {
            web_search
        };

        let cascade = Self::new(website, stages);
        tracing::info!(cascade = ?cascade, "verification cascade ready");
        Ok(cascade)
    }

    /// Names of the academic stages, in consultation order.
    pub fn source_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.source.name()).collect()
    }

    /// Verify one reference. Never fails; source failures surface as `NotFound`.
    pub async fn verify(&self, reference: &Reference) -> VerificationResult {
        if reference.ref_type == ReferenceType::NonAcademicWebsite {
            return match &self.website {
                Some(source) => source.verify(reference).await,
                None => VerificationResult::not_found("No evidence found in any source."),
            };
        }

        let mut first_not_found = None;
        for stage in &self.stages {
            let result = stage.source.verify(reference).await;
            tracing::debug!(
                source = stage.source.name(),
                title = %reference.title,
                status = result.status.as_str(),
                "source verdict"
            );
            if stage.rule.stops(result.status) {
                return result;
            }
            if first_not_found.is_none() && result.status == VerificationStatus::NotFound {
                first_not_found = Some(result);
            }
        }

        first_not_found
            .unwrap_or_else(|| VerificationResult::not_found("No evidence found in any source."))
    }
}

fn needs_model(config: &Config) -> bool {
    !config.is_disabled("Workshop") || !config.is_disabled("Web Search")
}
