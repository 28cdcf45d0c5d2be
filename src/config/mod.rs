use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

/// Client configuration, read from `MANGAMA_*` environment variables.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Base address of the translation service (e.g., "http://localhost:3000/api").
    #[serde(default = "default_service_url")]
    #[garde(length(min = 1))]
    pub service_url: String,

    /// Wall-clock limit for one translate call.
    #[serde(default = "default_translate_timeout_secs")]
    #[garde(range(min = 1))]
    pub translate_timeout_secs: u64,

    /// Wall-clock limit for one liveness probe.
    #[serde(default = "default_health_timeout_secs")]
    #[garde(range(min = 1))]
    pub health_timeout_secs: u64,

    /// Seconds between liveness probes.
    #[serde(default = "default_liveness_interval_secs")]
    #[garde(range(min = 1))]
    pub liveness_interval_secs: u64,

    /// Additional attempts after the first failed translate call.
    #[serde(default = "default_max_retries")]
    #[garde(range(max = 10))]
    pub max_retries: u32,

    /// Backoff unit; retry N waits N × unit.
    #[serde(default = "default_backoff_unit_ms")]
    #[garde(range(min = 1))]
    pub backoff_unit_ms: u64,

    #[serde(default = "default_max_payload_bytes")]
    #[garde(range(min = 1))]
    pub max_payload_bytes: usize,

    #[serde(default = "default_allowed_content_types")]
    #[garde(length(min = 1))]
    pub allowed_content_types: Vec<String>,

    /// Ask the service to run on GPU when it can.
    #[serde(default)]
    #[garde(skip)]
    pub use_accelerated: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),

    #[error("Invalid service URL {0}")]
    ServiceUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

fn default_service_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_translate_timeout_secs() -> u64 {
    120
}

fn default_health_timeout_secs() -> u64 {
    5
}

fn default_liveness_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_unit_ms() -> u64 {
    2000
}

fn default_max_payload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_content_types() -> Vec<String> {
    vec!["image/jpeg".to_string(), "image/png".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            translate_timeout_secs: default_translate_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            liveness_interval_secs: default_liveness_interval_secs(),
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_payload_bytes: default_max_payload_bytes(),
            allowed_content_types: default_allowed_content_types(),
            use_accelerated: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::prefixed("MANGAMA_").from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn translate_timeout(&self) -> Duration {
        Duration::from_secs(self.translate_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    /// Whether `content_type` is on the allow-list. `image/jpg` counts as `image/jpeg`.
    pub fn allows_content_type(&self, content_type: &str) -> bool {
        let normalized = match content_type.trim().to_ascii_lowercase().as_str() {
            "image/jpg" => "image/jpeg".to_string(),
            other => other.to_string(),
        };
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(&normalized))
    }
}
