//! TOML configuration for the service, the aggregator, and the providers.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. API keys are never stored in the file; providers
//! name the environment variable that holds them.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keywords::FALLBACK_COUNT;

#[derive(thiserror::Error, Debug)]
/// Errors raised while loading configuration.
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How the aggregator dispatches provider calls.
pub enum AggregationMode {
    /// One provider at a time, stopping once enough candidates are pooled.
    #[default]
    Sequential,
    /// All providers at once, joined before deduplication.
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// What the service does when the vision classifier fails.
pub enum ClassifierFailurePolicy {
    /// Continue with a safe default classification.
    #[default]
    Degrade,
    /// Fail the request.
    Propagate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Settings for the location aggregator.
pub struct AggregatorSettings {
    /// Candidates farther away than this are dropped.
    pub max_radius_km: f64,
    /// Maximum number of suggestions returned.
    pub max_results: usize,
    /// Sequential mode stops once this many distinct candidates are pooled.
    pub min_results: usize,
    /// Fallbacks are added until at least this many suggestions exist. At
    /// most two fallback places are available.
    pub min_suggestions: usize,
    /// Sequential or concurrent provider dispatch.
    pub mode: AggregationMode,
    /// Upper bound for a single provider call.
    pub provider_timeout_secs: u64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            max_radius_km: 25.0,
            max_results: 5,
            min_results: 3,
            min_suggestions: 2,
            mode: AggregationMode::Sequential,
            provider_timeout_secs: 10,
        }
    }
}

impl AggregatorSettings {
    /// Upper bound for a single provider call.
    #[must_use]
    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Settings for the vision classifier.
pub struct VisionSettings {
    /// Model name.
    pub model: String,
    /// API base URL.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Upper bound for a classification call.
    pub timeout_secs: u64,
    /// Behaviour when the classifier fails.
    pub on_failure: ClassifierFailurePolicy,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_owned(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            api_key_env: "GEMINI_API_KEY".to_owned(),
            timeout_secs: 15,
            on_failure: ClassifierFailurePolicy::Degrade,
        }
    }
}

impl VisionSettings {
    /// Upper bound for a classification call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key read from the configured environment variable.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Sliding-window rate limit per client.
pub struct RateLimitSettings {
    /// Window length.
    pub window_secs: u64,
    /// Requests allowed per window.
    pub max_requests: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 10,
        }
    }
}

impl RateLimitSettings {
    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Settings for the shared HTTP client.
pub struct HttpSettings {
    /// User agent sent with every request. Nominatim rejects anonymous clients.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "binbuddy/0.1".to_owned(),
            timeout_secs: 15,
        }
    }
}

impl HttpSettings {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One place provider entry.
pub struct ProviderSettings {
    /// Provider identifier (`overpass`, `nominatim`, `google`).
    pub id: String,
    /// Whether the provider takes part in lookups.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lookup order; lower values run first.
    pub priority: u32,
    /// Override for the provider's API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the provider's API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Minimum delay between consecutive requests to this provider.
    #[serde(default)]
    pub rate_limit_ms: u64,
    /// Maximum results requested per provider call.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl ProviderSettings {
    /// Settings for `id` with every optional field defaulted.
    #[must_use]
    pub fn new<S: Into<String>>(id: S, priority: u32) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            priority,
            base_url: None,
            api_key_env: None,
            rate_limit_ms: 0,
            limit: default_limit(),
        }
    }

    /// Configured base URL, or `fallback` when none is set.
    #[must_use]
    pub fn base_url_or<'url>(&'url self, fallback: &'url str) -> &'url str {
        self.base_url.as_deref().unwrap_or(fallback)
    }

    /// Configured API key variable, or `fallback` when none is set.
    #[must_use]
    pub fn api_key_env_or<'env>(&'env self, fallback: &'env str) -> &'env str {
        self.api_key_env.as_deref().unwrap_or(fallback)
    }

    /// API key read from [`ProviderSettings::api_key_env_or`]. Blank values
    /// count as missing.
    #[must_use]
    pub fn api_key_or(&self, fallback_env: &str) -> Option<String> {
        read_key(self.api_key_env_or(fallback_env))
    }

    /// Minimum delay between consecutive requests.
    #[must_use]
    pub const fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_limit() -> usize {
    10
}

fn read_key(var: &str) -> Option<String> {
    env::var(var).ok().filter(|key| !key.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Complete application configuration.
pub struct BinBuddyConfig {
    /// Location aggregator settings.
    pub aggregator: AggregatorSettings,
    /// Vision classifier settings.
    pub vision: VisionSettings,
    /// Per-client rate limit.
    pub rate_limit: RateLimitSettings,
    /// Shared HTTP client settings.
    pub http: HttpSettings,
    /// Place providers. Order in the file does not matter; `priority` does.
    pub providers: Vec<ProviderSettings>,
}

impl Default for BinBuddyConfig {
    fn default() -> Self {
        let nominatim = ProviderSettings {
            rate_limit_ms: 1000,
            ..ProviderSettings::new("nominatim", 2)
        };
        let google = ProviderSettings {
            api_key_env: Some("GOOGLE_PLACES_API_KEY".to_owned()),
            ..ProviderSettings::new("google", 3)
        };

        Self {
            aggregator: AggregatorSettings::default(),
            vision: VisionSettings::default(),
            rate_limit: RateLimitSettings::default(),
            http: HttpSettings::default(),
            providers: vec![ProviderSettings::new("overpass", 1), nominatim, google],
        }
    }
}

impl BinBuddyConfig {
    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] for malformed input and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise the
    /// errors of [`BinBuddyConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let agg = &self.aggregator;

        if !(agg.max_radius_km.is_finite() && agg.max_radius_km > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "aggregator.max_radius_km must be positive, got {}",
                agg.max_radius_km
            )));
        }
        if agg.max_results == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.max_results must be at least 1".to_owned(),
            ));
        }
        if agg.min_results == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.min_results must be at least 1".to_owned(),
            ));
        }
        if agg.min_suggestions > FALLBACK_COUNT {
            return Err(ConfigError::Invalid(format!(
                "aggregator.min_suggestions ({}) exceeds the {FALLBACK_COUNT} fallback places available",
                agg.min_suggestions
            )));
        }
        if agg.min_suggestions > agg.max_results {
            return Err(ConfigError::Invalid(format!(
                "aggregator.min_suggestions ({}) exceeds max_results ({})",
                agg.min_suggestions, agg.max_results
            )));
        }
        if agg.provider_timeout_secs == 0 || self.vision.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least 1s".to_owned()));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.window_secs and rate_limit.max_requests must be positive".to_owned(),
            ));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            if seen.contains(&provider.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider id `{}`",
                    provider.id
                )));
            }
            seen.push(&provider.id);
        }

        Ok(())
    }

    /// Enabled providers sorted by priority (ascending).
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<&ProviderSettings> {
        let mut providers: Vec<&ProviderSettings> = self
            .providers
            .iter()
            .filter(|provider| provider.enabled)
            .collect();
        providers.sort_by_key(|provider| provider.priority);
        providers
    }
}
