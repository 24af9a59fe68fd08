use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SearchError};

pub const SUPPORTED_FHIR_VERSIONS: [&str; 2] = ["4.0.1", "3.0.1"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Base URL of the FHIR service; absolute references on it are treated as local
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_fhir_version")]
    pub fhir_version: String,
    /// Append `.keyword` to exact-match fields (dynamic string mappings)
    #[serde(default = "default_true")]
    pub use_keyword_subfields: bool,
    #[serde(default)]
    pub limits: SearchLimits,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub subscriptions: SubscriptionSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_base_url() -> String {
    "http://localhost:8888".into()
}
fn default_fhir_version() -> String {
    "4.0.1".into()
}
fn default_true() -> bool {
    true
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            fhir_version: default_fhir_version(),
            use_keyword_subfields: true,
            limits: SearchLimits::default(),
            registry: RegistrySettings::default(),
            subscriptions: SubscriptionSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(format!("base_url is not a valid URL: {}", self.base_url));
        }
        if !SUPPORTED_FHIR_VERSIONS.contains(&self.fhir_version.as_str()) {
            return Err(format!(
                "fhir_version must be one of {SUPPORTED_FHIR_VERSIONS:?}, got {}",
                self.fhir_version
            ));
        }
        let limits = &self.limits;
        if limits.max_chained_params_result == 0 {
            return Err("limits.max_chained_params_result must be > 0".into());
        }
        if limits.max_inclusion_param_results == 0 {
            return Err("limits.max_inclusion_param_results must be > 0".into());
        }
        if limits.default_count == 0 {
            return Err("limits.default_count must be > 0".into());
        }
        if limits.default_count > limits.max_window_size {
            return Err("limits.default_count must be <= limits.max_window_size".into());
        }
        if self.subscriptions.refresh_interval_secs == 0 {
            return Err("subscriptions.refresh_interval_secs must be > 0".into());
        }
        Ok(())
    }

    /// Parse settings from TOML text and validate them.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(s).map_err(|e| SearchError::config(format!("invalid TOML: {e}")))?;
        settings.validate().map_err(SearchError::config)?;
        Ok(settings)
    }

    /// `base_url` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLimits {
    /// Matches allowed per intermediate step of a chained parameter
    #[serde(default = "default_max_chained")]
    pub max_chained_params_result: usize,
    /// Size of each `_include`/`_revinclude` query
    #[serde(default = "default_max_inclusion")]
    pub max_inclusion_param_results: usize,
    #[serde(default = "default_max_iterative_depth")]
    pub max_include_iterative_depth: usize,
    /// Highest `_getpagesoffset + _count` the index can page to
    #[serde(default = "default_max_window")]
    pub max_window_size: usize,
    #[serde(default = "default_count")]
    pub default_count: usize,
}

fn default_max_chained() -> usize {
    100
}
fn default_max_inclusion() -> usize {
    1000
}
fn default_max_iterative_depth() -> usize {
    5
}
fn default_max_window() -> usize {
    10_000
}
fn default_count() -> usize {
    20
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_chained_params_result: default_max_chained(),
            max_inclusion_param_results: default_max_inclusion(),
            max_include_iterative_depth: default_max_iterative_depth(),
            max_window_size: default_max_window(),
            default_count: default_count(),
        }
    }
}

/// Location of the compiled search parameter files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistrySettings {
    /// Compiled base FHIR search parameters; empty registry when unset
    #[serde(default)]
    pub base_path: Option<PathBuf>,
    /// Compiled implementation guide parameters, applied over the base ones
    #[serde(default)]
    pub implementation_guides_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    60
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl SubscriptionSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::SearchSettings;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "octofhir-search.toml";

    /// Load settings from a TOML file overlaid with environment variables.
    ///
    /// Environment overrides use the `OCTOFHIR_SEARCH__` prefix, e.g.
    /// `OCTOFHIR_SEARCH__LIMITS__MAX_WINDOW_SIZE=5000`. A missing file is
    /// skipped.
    pub fn load_settings(path: Option<&str>) -> Result<SearchSettings, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix("OCTOFHIR_SEARCH")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: SearchSettings = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
