//! Configuration file for hosts running an MQTT session
//!
//! The library API takes [`SessionParams`] directly. This module lets a host
//! process keep those values in a TOML file instead.

use crate::session::retry::{DEFAULT_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS};
use crate::session::{RetryPolicy, SessionParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Session host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub session: SessionSection,
    pub broker: BrokerSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Session section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// MQTT client identifier (must match [a-zA-Z0-9._:-]+)
    pub client_id: String,
}

/// Broker endpoint and TLS material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub root_ca_path: Option<PathBuf>,
    pub device_cert_path: Option<PathBuf>,
    pub device_private_key_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    8883
}

/// Connect retry budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-attempt delays in milliseconds before falling back to the sustained delay
    #[serde(default)]
    pub backoff_ms: Vec<u64>,
    #[serde(default = "default_sustained_delay_ms")]
    pub sustained_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: Vec::new(),
            sustained_delay_ms: default_sustained_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_sustained_delay_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid client ID format: {0}")]
    InvalidClientId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_client_id(&self.session.client_id)?;

        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker host must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker port must be greater than 0".to_string(),
            ));
        }
        if self.broker.device_cert_path.is_some() != self.broker.device_private_key_path.is_some()
        {
            return Err(ConfigError::InvalidConfig(
                "device_cert_path and device_private_key_path must be set together".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build owned session parameters from this configuration
    pub fn session_params(&self) -> SessionParams {
        let mut params = SessionParams::new(
            self.session.client_id.clone(),
            self.broker.host.clone(),
            self.broker.port,
        );
        if let Some(path) = &self.broker.root_ca_path {
            params = params.with_root_ca(path);
        }
        if let Some(path) = &self.broker.device_cert_path {
            params = params.with_device_cert(path);
        }
        if let Some(path) = &self.broker.device_private_key_path {
            params = params.with_device_private_key(path);
        }
        params
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_pattern: self.retry.backoff_ms.clone(),
            sustained_delay_ms: self.retry.sustained_delay_ms,
        }
    }
}

/// Validate MQTT client ID format
pub fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    let valid_chars = client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'));

    if client_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidClientId(format!(
            "Client ID '{client_id}' must match pattern [a-zA-Z0-9._:-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
[session]
client_id = "dev1"

[broker]
host = "broker.example"
port = 8883
root_ca_path = "certs/root-ca.pem"
device_cert_path = "certs/device.pem.crt"
device_private_key_path = "certs/device.key"

[retry]
max_attempts = 5
backoff_ms = [100, 200]
sustained_delay_ms = 500
"#;

    #[test]
    fn test_full_config() {
        let config = SessionConfig::from_toml_str(FULL_CONFIG).unwrap();
        assert_eq!(config.session.client_id, "dev1");
        assert_eq!(config.broker.host, "broker.example");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(
            config.broker.root_ca_path.as_deref(),
            Some(Path::new("certs/root-ca.pem"))
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_ms, vec![100, 200]);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml_content = r#"
[session]
client_id = "sensor-01"

[broker]
host = "localhost"
"#;

        let config = SessionConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.broker.root_ca_path, None);
        assert_eq!(config.retry, RetrySection::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_invalid_client_id() {
        assert!(validate_client_id("invalid@device").is_err());
        assert!(validate_client_id("").is_err());
        assert!(validate_client_id("thing:valid-device_123.test").is_ok());
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let toml_content = r#"
[session]
client_id = "dev1"

[broker]
host = "localhost"
port = 1883

[retry]
max_attempts = 0
"#;

        let result = SessionConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_cert_without_key_rejected() {
        let toml_content = r#"
[session]
client_id = "dev1"

[broker]
host = "localhost"
device_cert_path = "certs/device.pem.crt"
"#;

        let result = SessionConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_session_params_conversion() {
        let config = SessionConfig::from_toml_str(FULL_CONFIG).unwrap();
        let params = config.session_params();
        assert_eq!(params.client_id(), "dev1");
        assert_eq!(params.host(), "broker.example");
        assert_eq!(params.port(), 8883);
        assert_eq!(params.device_private_key_path(), Some(Path::new("certs/device.key")));

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.calculate_backoff_delay(1), 100);
        assert_eq!(policy.calculate_backoff_delay(3), 500);
    }
}
