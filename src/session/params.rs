//! Session-owned connection parameters
//!
//! This module contains the owned configuration a session is created from
//! and the pure functions that derive engine init and connect parameters.

use crate::error::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// MQTT keep-alive interval sent on connect
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
/// Timeout for a single engine command such as a connect attempt
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(20_000);
/// Timeout for the TLS handshake of a connect attempt
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Connection parameters owned by a session
///
/// Every string is an owned copy; nothing here borrows from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    client_id: String,
    host: String,
    port: u16,
    root_ca_path: Option<PathBuf>,
    device_cert_path: Option<PathBuf>,
    device_private_key_path: Option<PathBuf>,
}

impl SessionParams {
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            root_ca_path: None,
            device_cert_path: None,
            device_private_key_path: None,
        }
    }

    /// Root CA used to verify the broker
    pub fn with_root_ca(mut self, path: impl AsRef<Path>) -> Self {
        self.root_ca_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Device certificate presented for mutual TLS
    pub fn with_device_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.device_cert_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Private key matching the device certificate
    pub fn with_device_private_key(mut self, path: impl AsRef<Path>) -> Self {
        self.device_private_key_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn root_ca_path(&self) -> Option<&Path> {
        self.root_ca_path.as_deref()
    }

    pub fn device_cert_path(&self) -> Option<&Path> {
        self.device_cert_path.as_deref()
    }

    pub fn device_private_key_path(&self) -> Option<&Path> {
        self.device_private_key_path.as_deref()
    }

    /// Reject parameters no engine could connect with
    pub fn validate(&self) -> SessionResult<()> {
        if self.client_id.is_empty() {
            return Err(SessionError::invalid_params("client id must not be empty"));
        }
        if self.host.is_empty() {
            return Err(SessionError::invalid_params("host must not be empty"));
        }
        if self.port == 0 {
            return Err(SessionError::invalid_params("port must be greater than 0"));
        }
        Ok(())
    }

    /// Engine init parameters. Auto-reconnect always starts disabled and is
    /// only switched on after the first successful connect.
    pub fn init_params(&self) -> InitParams {
        InitParams {
            client_id: self.client_id.clone(),
            host: self.host.clone(),
            port: self.port,
            root_ca_path: self.root_ca_path.clone(),
            device_cert_path: self.device_cert_path.clone(),
            device_private_key_path: self.device_private_key_path.clone(),
            command_timeout: COMMAND_TIMEOUT,
            tls_handshake_timeout: TLS_HANDSHAKE_TIMEOUT,
            hostname_verify: true,
            auto_reconnect: false,
        }
    }

    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams::default()
    }
}

/// Parameters handed to [`crate::engine::MqttEngine::init`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub root_ca_path: Option<PathBuf>,
    pub device_cert_path: Option<PathBuf>,
    pub device_private_key_path: Option<PathBuf>,
    pub command_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    pub hostname_verify: bool,
    pub auto_reconnect: bool,
}

impl InitParams {
    /// Client certificate and key, only when both are configured
    pub fn client_auth_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.device_cert_path, &self.device_private_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

/// Parameters handed to [`crate::engine::EngineClient::connect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub keep_alive: Duration,
    pub clean_session: bool,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            keep_alive: KEEP_ALIVE_INTERVAL,
            clean_session: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> SessionParams {
        SessionParams::new("dev1", "broker.example", 8883)
    }

    #[test]
    fn test_new_has_no_tls_material() {
        let params = test_params();
        assert_eq!(params.client_id(), "dev1");
        assert_eq!(params.host(), "broker.example");
        assert_eq!(params.port(), 8883);
        assert!(params.root_ca_path().is_none());
        assert!(params.device_cert_path().is_none());
        assert!(params.device_private_key_path().is_none());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(test_params().validate().is_ok());

        let result = SessionParams::new("", "broker.example", 8883).validate();
        assert!(matches!(result, Err(SessionError::InvalidParams { .. })));

        let result = SessionParams::new("dev1", "", 8883).validate();
        assert!(matches!(result, Err(SessionError::InvalidParams { .. })));

        let result = SessionParams::new("dev1", "broker.example", 0).validate();
        assert!(matches!(result, Err(SessionError::InvalidParams { .. })));
    }

    #[test]
    fn test_init_params_constants() {
        let init = test_params().with_root_ca("certs/ca.pem").init_params();

        assert_eq!(init.command_timeout, Duration::from_millis(20_000));
        assert_eq!(init.tls_handshake_timeout, Duration::from_millis(5_000));
        assert!(init.hostname_verify);
        assert!(!init.auto_reconnect);
        assert_eq!(init.root_ca_path, Some(PathBuf::from("certs/ca.pem")));
    }

    #[test]
    fn test_connect_params_defaults() {
        let connect = test_params().connect_params();
        assert_eq!(connect.keep_alive, Duration::from_secs(10));
        assert!(connect.clean_session);
    }

    #[test]
    fn test_client_auth_requires_cert_and_key() {
        let only_cert = test_params().with_device_cert("dev.crt").init_params();
        assert!(only_cert.client_auth_paths().is_none());

        let both = test_params()
            .with_device_cert("dev.crt")
            .with_device_private_key("dev.key")
            .init_params();
        let (cert, key) = both.client_auth_paths().unwrap();
        assert_eq!(cert, Path::new("dev.crt"));
        assert_eq!(key, Path::new("dev.key"));
    }
}
