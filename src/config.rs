//! Configuration management for docket.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::client::parse_endpoint;
use crate::error::{DocketError, Result};
use crate::ratelimit::{RateLimit, TimeWindow};

/// Environment variable prefix for overrides, e.g. `DOCKET__RATE_LIMIT__REQUESTS_PER_UNIT`.
const ENV_PREFIX: &str = "DOCKET";

/// Main configuration for docket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocketConfig {
    /// Document registration endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request rate ceiling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// HTTP transport configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            rate_limit: RateLimitConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_endpoint() -> String {
    "https://ismp.crpt.ru/api/v3/lk/documents/create".to_string()
}

/// Rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// The time unit the ceiling applies to
    #[serde(default = "default_unit")]
    pub unit: TimeWindow,

    /// Number of requests allowed per unit of time
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            requests_per_unit: default_requests_per_unit(),
        }
    }
}

impl RateLimitConfig {
    pub fn to_rate_limit(&self) -> Result<RateLimit> {
        RateLimit::per(self.unit, self.requests_per_unit)
    }
}

fn default_unit() -> TimeWindow {
    TimeWindow::Second
}

fn default_requests_per_unit() -> u32 {
    10
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds; unset means no timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,

    /// Worker threads for the dispatch runtime
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_timeout_secs() -> Option<u64> {
    Some(30)
}

fn default_worker_threads() -> usize {
    2
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl DocketConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: DocketConfig = serde_yaml::from_str(yaml)
            .map_err(|e| DocketError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables (`DOCKET__SECTION__KEY`) have the highest priority.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&DocketConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: DocketConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        parse_endpoint(&self.endpoint)?;
        self.rate_limit.to_rate_limit()?;

        if self.http.worker_threads == 0 {
            return Err(DocketError::Config(
                "http.worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
