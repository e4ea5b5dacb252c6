//! Gate and PDP client configuration
//!
//! Loaded from YAML (`GateConfig::from_file`) or from environment
//! variables (`GateConfig::from_env`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Env var naming a YAML config file; takes precedence over the others.
pub const CONFIG_PATH_ENV: &str = "POLICY_GATE_CONFIG";
pub const PDP_URL_ENV: &str = "POLICY_GATE_PDP_URL";
pub const PDP_TIMEOUT_ENV: &str = "POLICY_GATE_PDP_TIMEOUT_MS";
pub const PLACEHOLDER_ID_ENV: &str = "POLICY_GATE_PLACEHOLDER_ID";

pub const DEFAULT_PDP_URL: &str = "http://localhost:3592";
pub const DEFAULT_PDP_TIMEOUT_MS: u64 = 2_000;
/// Resource id sent to the PDP when the caller did not name an instance.
pub const DEFAULT_PLACEHOLDER_RESOURCE_ID: &str = "id";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GateConfig {
    #[serde(default)]
    pub pdp: PdpConfig,
    #[serde(default = "default_placeholder")]
    pub placeholder_resource_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PdpConfig {
    #[serde(default = "default_pdp_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER_RESOURCE_ID.to_string()
}

fn default_pdp_url() -> String {
    DEFAULT_PDP_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PDP_TIMEOUT_MS
}

impl Default for PdpConfig {
    fn default() -> Self {
        Self {
            base_url: default_pdp_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PdpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            pdp: PdpConfig::default(),
            placeholder_resource_id: default_placeholder(),
        }
    }
}

impl GateConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: GateConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Resolve configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            tracing::info!(path = %path, "Loading policy gate configuration");
            return Self::from_file(path);
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let timeout_ms = match lookup(PDP_TIMEOUT_ENV) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{PDP_TIMEOUT_ENV} is not a number: '{raw}'"))
            })?,
            None => DEFAULT_PDP_TIMEOUT_MS,
        };

        let config = Self {
            pdp: PdpConfig {
                base_url: lookup(PDP_URL_ENV).unwrap_or_else(default_pdp_url),
                timeout_ms,
            },
            placeholder_resource_id: lookup(PLACEHOLDER_ID_ENV)
                .unwrap_or_else(default_placeholder),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pdp.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("pdp.base_url must not be empty".into()));
        }
        url::Url::parse(&self.pdp.base_url).map_err(|e| {
            ConfigError::Invalid(format!("pdp.base_url '{}': {e}", self.pdp.base_url))
        })?;
        if self.pdp.timeout_ms == 0 {
            return Err(ConfigError::Invalid("pdp.timeout_ms must be positive".into()));
        }
        if self.placeholder_resource_id.is_empty() {
            return Err(ConfigError::Invalid(
                "placeholder_resource_id must not be empty".into(),
            ));
        }
        Ok(())
    }
}
