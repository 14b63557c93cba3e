//! Boundary to the external MQTT engine
//!
//! The session never speaks the MQTT wire protocol itself. It drives an
//! engine through two traits so that the real `rumqttc` binding and the
//! in-memory test engine are interchangeable:
//!
//! - [`MqttEngine`] creates one [`EngineClient`] per session and registers the
//!   session's [`SessionHandler`] for disconnect notifications
//! - [`EngineClient`] exposes the connect, auto-reconnect and manual reconnect
//!   primitives for that one client

use crate::session::{ConnectParams, InitParams, SessionHandler};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod rumqtt;

pub use rumqtt::RumqttEngine;

/// Errors reported by an engine implementation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: &'static str, timeout_ms: u64 },
    #[error("TLS material could not be loaded from {path}")]
    Tls {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Request rejected by engine: {0}")]
    Rejected(String),
    #[error("Engine client already released")]
    Released,
}

/// Factory for engine clients
#[async_trait]
pub trait MqttEngine: Send + Sync {
    /// Create a client for one session.
    ///
    /// `handler` must be invoked by the engine whenever the client's transport
    /// drops, and after the engine's own auto-reconnect restored it.
    async fn init(
        &self,
        params: &InitParams,
        handler: SessionHandler,
    ) -> Result<Arc<dyn EngineClient>, EngineError>;
}

/// One engine-side MQTT client, owned by exactly one session
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Perform one connect attempt
    async fn connect(&self, params: &ConnectParams) -> Result<(), EngineError>;

    /// Toggle the engine's auto-reconnect machinery
    async fn set_auto_reconnect(&self, enabled: bool) -> Result<(), EngineError>;

    /// Whether the engine currently recovers dropped connections on its own
    fn is_auto_reconnect_enabled(&self) -> bool;

    /// Perform one manual reconnect attempt after a transport drop
    async fn attempt_reconnect(&self) -> Result<(), EngineError>;

    /// Release the engine-side client and any background work it owns.
    ///
    /// Must be safe to call more than once.
    fn release(&self);
}
