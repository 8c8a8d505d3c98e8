use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub models: Option<ModelsConfig>,
    pub sources: Option<SourcesConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub gemini_api_key: Option<String>,
    pub s2_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub search: Option<String>,
    pub extraction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub disabled: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub webpage_timeout_secs: Option<u64>,
    pub llm_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
}

/// Platform config directory path: `<config_dir>/citeverify/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citeverify").join("config.toml"))
}

/// Load config by cascading CWD `.citeverify.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citeverify.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Field-wise choice: the overlay's value if set, else the base's.
fn pick<S, T: Clone>(
    base: &Option<S>,
    overlay: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let keys = |f: fn(&ApiKeysConfig) -> Option<String>| pick(&base.api_keys, &overlay.api_keys, f);
    let models = |f: fn(&ModelsConfig) -> Option<String>| pick(&base.models, &overlay.models, f);

    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            gemini_api_key: keys(|a| a.gemini_api_key.clone()),
            s2_api_key: keys(|a| a.s2_api_key.clone()),
            crossref_mailto: keys(|a| a.crossref_mailto.clone()),
        }),
        models: Some(ModelsConfig {
            search: models(|m| m.search.clone()),
            extraction: models(|m| m.extraction.clone()),
        }),
        sources: Some(SourcesConfig {
            disabled: pick(&base.sources, &overlay.sources, |s| s.disabled.clone()),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(&base.concurrency, &overlay.concurrency, |c| c.num_workers),
            request_timeout_secs: pick(&base.concurrency, &overlay.concurrency, |c| {
                c.request_timeout_secs
            }),
            webpage_timeout_secs: pick(&base.concurrency, &overlay.concurrency, |c| {
                c.webpage_timeout_secs
            }),
            llm_timeout_secs: pick(&base.concurrency, &overlay.concurrency, |c| {
                c.llm_timeout_secs
            }),
            max_attempts: pick(&base.concurrency, &overlay.concurrency, |c| c.max_attempts),
        }),
    }
}

impl ConfigFile {
    /// Copy every value set in this file onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(keys) = &self.api_keys {
            if let Some(key) = &keys.gemini_api_key {
                config.gemini_api_key = Some(key.clone());
            }
            if let Some(key) = &keys.s2_api_key {
                config.s2_api_key = Some(key.clone());
            }
            if let Some(mailto) = &keys.crossref_mailto {
                config.crossref_mailto = Some(mailto.clone());
            }
        }
        if let Some(models) = &self.models {
            if let Some(search) = &models.search {
                config.search_model = search.clone();
            }
            if let Some(extraction) = &models.extraction {
                config.extraction_model = extraction.clone();
            }
        }
        if let Some(disabled) = self.sources.as_ref().and_then(|s| s.disabled.as_ref()) {
            config.disabled_sources = disabled.clone();
        }
        if let Some(c) = &self.concurrency {
            if let Some(n) = c.num_workers {
                config.num_workers = n.max(1);
            }
            if let Some(secs) = c.request_timeout_secs {
                config.request_timeout_secs = secs;
            }
            if let Some(secs) = c.webpage_timeout_secs {
                config.webpage_timeout_secs = secs;
            }
            if let Some(secs) = c.llm_timeout_secs {
                config.llm_timeout_secs = secs;
            }
            if let Some(n) = c.max_attempts {
                config.retry.max_attempts = n.max(1);
            }
        }
    }
}
