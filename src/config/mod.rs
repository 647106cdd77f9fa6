//! Configuration loading and management

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the runtime mode
pub const MODE_ENV: &str = "APP_ENV";

/// Whether the service runs in production
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Production,
    #[default]
    Development,
}

impl RuntimeMode {
    /// `production` (any case) is production, anything else is development
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            RuntimeMode::Production
        } else {
            RuntimeMode::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == RuntimeMode::Production
    }
}

/// Listing defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page length when the client sends none
    pub default_length: u64,

    /// Field sorted on (descending) when the client sends no sort
    pub default_sort_field: String,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_length: 10,
            default_sort_field: "createdAt".to_string(),
        }
    }
}

/// Error boundary settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Request bodies up to this size are buffered and logged on failure
    pub max_logged_body_bytes: usize,

    /// Replacement for sensitive values in logged bodies and queries
    pub redaction_placeholder: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            max_logged_body_bytes: 64 * 1024,
            redaction_placeholder: "[REDACTED]".to_string(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub pagination: PaginationConfig,
    pub boundary: BoundaryConfig,

    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::default(),
            pagination: PaginationConfig::default(),
            boundary: BoundaryConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Defaults, with the mode taken from `APP_ENV`
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Override the mode from `APP_ENV` when it is set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(MODE_ENV) {
            self.mode = RuntimeMode::parse(&value);
        }
        self
    }

    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
