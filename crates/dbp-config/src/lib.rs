use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// TLS settings for an endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub key_file: String,
}

/// Watchdog settings for a client endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_watchdog_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_watchdog_interval_secs(),
        }
    }
}

fn default_watchdog_interval_secs() -> u64 {
    5
}

fn default_retransmit_interval_secs() -> u64 {
    1
}

fn default_listen_addr() -> String {
    "0.0.0.0:3868".to_string()
}

/// Diameter endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndpointConfig {
    #[validate(length(min = 1))]
    pub origin_host: String,
    #[validate(length(min = 1))]
    pub origin_realm: String,
    pub vendor_id: u32,
    #[validate(length(min = 1))]
    pub product_name: String,
    #[serde(default)]
    pub origin_state_id: u32,
    #[serde(default)]
    pub firmware_revision: u32,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub max_retransmits: u32,
    #[serde(default = "default_retransmit_interval_secs")]
    pub retransmit_interval_secs: u64,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

/// Load configuration from file, with `DBP_` environment overrides.
pub fn load_config<T>(path: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("DBP"))
        .build()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?;

    config
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    Ok(config)
}

/// Load configuration from a YAML string (for testing).
pub fn load_from_yaml<T>(yaml: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::LoadError(e.to_string()))?;
    config
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    Ok(config)
}
