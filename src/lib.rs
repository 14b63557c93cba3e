//! Managed MQTT client sessions for IoT devices
//!
//! This crate wraps an MQTT client engine in a small session lifecycle:
//! - Owned connection parameters with optional mutual-TLS material
//! - Connect with a bounded retry budget (10 attempts, 1000 ms apart by default)
//! - Engine auto-reconnect switched on after the first successful connect
//! - A per-session disconnect handler that falls back to one manual reconnect
//! - Idempotent teardown, also run on drop
//!
//! # Quick Start
//!
//! ```rust
//! use iot_session::session::{MqttSession, SessionParams, SessionState};
//! use iot_session::testing::MockEngine;
//!
//! # tokio_test::block_on(async {
//! let engine = MockEngine::new();
//! let params = SessionParams::new("dev1", "broker.example", 8883);
//!
//! let mut session = MqttSession::create(params, &engine).await.unwrap();
//! session.connect().await.unwrap();
//! assert_eq!(session.state(), SessionState::Connected);
//! assert!(session.is_auto_reconnect_enabled());
//!
//! session.destroy();
//! assert_eq!(session.state(), SessionState::Destroyed);
//! # });
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod observability;
pub mod session;
pub mod testing;

pub use config::{ConfigError, SessionConfig};
pub use engine::{EngineClient, EngineError, MqttEngine, RumqttEngine};
pub use error::{SessionError, SessionResult};
pub use session::{MqttSession, RetryPolicy, SessionParams, SessionState};
