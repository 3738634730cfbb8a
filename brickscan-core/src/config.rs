// Configuration for the brickscan pipeline and its two remote services

use crate::error::ConfigError;
use crate::types::Category;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

pub const BRICKOGNIZE_URL: &str = "https://api.brickognize.com";
pub const REBRICKABLE_URL: &str = "https://rebrickable.com/api/v3/lego";
pub const REBRICKABLE_KEY_ENV: &str = "REBRICKABLE_API_KEY";
pub const REBRICKABLE_KEY_FILE: &str = ".rebrickable_key";

/// Which predictions are looked up in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentScope {
    /// Only the rank-1 prediction of each piece
    #[default]
    TopRanked,
    /// Every retained prediction
    All,
}

/// Segmentation and identification settings for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Regions with a smaller contour area are noise or dust
    pub min_area: f64,
    /// Regions with a larger contour area are background or merged pieces
    pub max_area: f64,
    /// Pixels added around each region when cutting its crop
    pub padding: u32,
    /// Gaussian blur applied before thresholding
    pub blur_sigma: f32,
    /// Predictions retained per crop
    pub top_n: usize,
    pub category: Category,
    pub use_enrichment: bool,
    pub enrichment_scope: EnrichmentScope,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_area: 500.0,
            max_area: 100_000.0,
            padding: 10,
            blur_sigma: 1.0,
            top_n: 3,
            category: Category::Parts,
            use_enrichment: true,
            enrichment_scope: EnrichmentScope::TopRanked,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_area.is_finite() || self.min_area < 0.0 {
            return Err(ConfigError::Validation(
                "min_area must be a finite, non-negative number".to_string(),
            ));
        }
        if !self.max_area.is_finite() || self.max_area < self.min_area {
            return Err(ConfigError::Validation(
                "max_area must be finite and at least min_area".to_string(),
            ));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma <= 0.0 {
            return Err(ConfigError::Validation("blur_sigma must be > 0".to_string()));
        }
        if self.top_n == 0 || self.top_n > 100 {
            return Err(ConfigError::Validation(
                "top_n must be between 1 and 100".to_string(),
            ));
        }
        if self.padding > 1_000 {
            return Err(ConfigError::Validation("padding too large (max 1000)".to_string()));
        }
        Ok(())
    }
}

/// Retry configuration for outbound calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries > 10 {
            return Err(ConfigError::Validation("max_retries too large (max 10)".to_string()));
        }
        if self.initial_delay_ms > 60_000 {
            return Err(ConfigError::Validation(
                "initial_delay_ms too large (max 60000 ms)".to_string(),
            ));
        }
        if self.max_delay_ms > 300_000 {
            return Err(ConfigError::Validation(
                "max_delay_ms too large (max 300000 ms)".to_string(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Validation(
                "initial_delay_ms cannot be greater than max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Backoff before retry number `retry` (0-based), doubling up to the cap
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(63)).unwrap_or(u64::MAX);
        let delay = self
            .initial_delay_ms
            .checked_mul(factor)
            .map(|d| d.min(self.max_delay_ms))
            .unwrap_or(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Address, credential and politeness settings for one remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Minimum wall-clock gap between consecutive calls
    pub min_interval_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ServiceConfig {
    pub fn brickognize() -> Self {
        Self {
            base_url: BRICKOGNIZE_URL.to_string(),
            api_key: None,
            timeout_secs: 30,
            min_interval_ms: 1_000,
            retry: RetryConfig::default(),
        }
    }

    pub fn rebrickable() -> Self {
        Self {
            base_url: REBRICKABLE_URL.to_string(),
            api_key: None,
            timeout_secs: 10,
            min_interval_ms: 100,
            retry: RetryConfig::default(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL without the trailing slash
    pub fn endpoint(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "base_url must be an http(s) URL: '{}'",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 600 {
            return Err(ConfigError::Validation(
                "timeout_secs must be between 1 and 600".to_string(),
            ));
        }
        if self.min_interval_ms > 60_000 {
            return Err(ConfigError::Validation(
                "min_interval_ms too large (max 60000 ms)".to_string(),
            ));
        }
        self.retry.validate()
    }

    /// Fill `api_key` from the environment or a key file when not set
    pub fn resolve_api_key(&mut self, env_var: &str, key_file: Option<&Path>) {
        if self.api_key.as_deref().map(str::trim).is_some_and(|k| !k.is_empty()) {
            return;
        }
        self.api_key = std::env::var(env_var)
            .ok()
            .or_else(|| key_file.and_then(read_key_file))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
    }
}

fn read_key_file(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// A service section as written in a file; unset keys keep the service defaults
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceSection {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    min_interval_ms: Option<u64>,
    retry: Option<RetryConfig>,
}

impl ServiceSection {
    fn over(self, defaults: ServiceConfig) -> ServiceConfig {
        ServiceConfig {
            base_url: self.base_url.unwrap_or(defaults.base_url),
            api_key: self.api_key.or(defaults.api_key),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            min_interval_ms: self.min_interval_ms.unwrap_or(defaults.min_interval_ms),
            retry: self.retry.unwrap_or(defaults.retry),
        }
    }
}

fn identification_section<'de, D>(deserializer: D) -> Result<ServiceConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(ServiceSection::deserialize(deserializer)?.over(ServiceConfig::brickognize()))
}

fn catalog_section<'de, D>(deserializer: D) -> Result<ServiceConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(ServiceSection::deserialize(deserializer)?.over(ServiceConfig::rebrickable()))
}

/// Complete configuration of a brickscan run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrickscanConfig {
    pub pipeline: PipelineConfig,
    #[serde(deserialize_with = "identification_section")]
    pub identification: ServiceConfig,
    #[serde(deserialize_with = "catalog_section")]
    pub catalog: ServiceConfig,
}

impl Default for BrickscanConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            identification: ServiceConfig::brickognize(),
            catalog: ServiceConfig::rebrickable(),
        }
    }
}

impl BrickscanConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Io(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration, trying JSON, then TOML, then YAML
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<BrickscanConfig>(content) {
            return Ok(config);
        }

        let toml_err = match toml::from_str::<BrickscanConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        if let Ok(config) = serde_yaml::from_str::<BrickscanConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::Parse(format!(
            "not valid JSON, TOML or YAML ({})",
            toml_err.message()
        )))
    }

    /// Defaults overridden by `BRICKSCAN_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse::<f64>("BRICKSCAN_MIN_AREA") {
            self.pipeline.min_area = v;
        }
        if let Some(v) = env_parse::<f64>("BRICKSCAN_MAX_AREA") {
            self.pipeline.max_area = v;
        }
        if let Some(v) = env_parse::<usize>("BRICKSCAN_TOP_N") {
            self.pipeline.top_n = v;
        }
        if let Some(v) = env_parse::<Category>("BRICKSCAN_CATEGORY") {
            self.pipeline.category = v;
        }
        if let Ok(url) = std::env::var("BRICKSCAN_IDENTIFY_URL") {
            self.identification.base_url = url;
        }
        if let Ok(url) = std::env::var("BRICKSCAN_CATALOG_URL") {
            self.catalog.base_url = url;
        }
        self.catalog
            .resolve_api_key(REBRICKABLE_KEY_ENV, Some(Path::new(REBRICKABLE_KEY_FILE)));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.identification
            .validate()
            .map_err(|e| prefix("identification", e))?;
        self.catalog.validate().map_err(|e| prefix("catalog", e))?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn prefix(section: &str, err: ConfigError) -> ConfigError {
    match err {
        ConfigError::Validation(msg) => ConfigError::Validation(format!("{}: {}", section, msg)),
        other => other,
    }
}
