use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

use crate::models::metadata::MAX_TAG_COUNT;
use crate::services::analysis::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the batch runner.
    #[serde(default = "default_bind_addr")]
    #[garde(skip)]
    pub bind_addr: String,

    /// Gemini API key
    #[garde(length(min = 1))]
    pub gemini_api_key: String,

    /// Gemini model name
    #[serde(default = "default_gemini_model")]
    #[garde(length(min = 1))]
    pub gemini_model: String,

    /// Gemini API root, overridable for proxies and tests
    #[serde(default = "default_gemini_base_url")]
    #[garde(length(min = 1))]
    pub gemini_base_url: String,

    /// Ceiling on simultaneous analysis calls
    #[serde(default = "default_max_concurrent_requests")]
    #[garde(range(min = 1, max = 32))]
    pub max_concurrent_requests: usize,

    /// Per-call watchdog in seconds; 0 disables it
    #[serde(default = "default_analysis_timeout_secs")]
    #[garde(skip)]
    pub analysis_timeout_secs: u64,

    /// Maximum keywords stored per image
    #[serde(default = "default_tag_cap")]
    #[garde(range(min = 1, max = 50))]
    pub tag_cap: usize,

    /// Start analysis as soon as a batch is uploaded
    #[serde(default = "default_auto_start")]
    #[garde(skip)]
    pub auto_start: bool,

    /// Request body limit for batch uploads, in bytes
    #[serde(default = "default_max_upload_bytes")]
    #[garde(range(min = 1_048_576))]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_max_concurrent_requests() -> usize {
    3
}

fn default_analysis_timeout_secs() -> u64 {
    120
}

fn default_tag_cap() -> usize {
    MAX_TAG_COUNT
}

fn default_auto_start() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the config from explicit `(NAME, value)` pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn analysis_timeout(&self) -> Option<Duration> {
        match self.analysis_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
