//! MQTT client session lifecycle
//!
//! This module provides the session state machine that wraps one engine
//! client: construction, connect with bounded retry, disconnect handling and
//! teardown. Pure logic is kept apart from the engine-driving code.
//!
//! - [`params`] - Owned connection parameters and fixed protocol constants
//! - [`retry`] - Pure retry policy and backoff decisions
//! - [`state`] - Pure state transitions and session metrics
//! - [`handler`] - Session-scoped disconnect callback
//! - [`client`] - Engine coordination: create, connect, destroy
//!
//! # Usage
//!
//! ```rust,no_run
//! use iot_session::engine::RumqttEngine;
//! use iot_session::session::{MqttSession, SessionParams};
//!
//! # tokio_test::block_on(async {
//! let params = SessionParams::new("dev1", "broker.example", 8883)
//!     .with_root_ca("certs/root-ca.pem")
//!     .with_device_cert("certs/device.pem.crt")
//!     .with_device_private_key("certs/device.key");
//!
//! let mut session = MqttSession::create(params, &RumqttEngine::new()).await?;
//! session.connect().await?;
//! session.destroy();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod handler;
pub mod params;
pub mod retry;
pub mod state;

// Re-export public types for convenience
pub use client::{ConnectReport, MqttSession};
pub use handler::{DisconnectOutcome, SessionHandler, SessionShared};
pub use params::{
    ConnectParams, InitParams, SessionParams, COMMAND_TIMEOUT, KEEP_ALIVE_INTERVAL,
    TLS_HANDSHAKE_TIMEOUT,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use state::{determine_next_state, MetricsSnapshot, SessionEvent, SessionMetrics, SessionState};
