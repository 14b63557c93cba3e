//! Error types for MQTT session operations
//!
//! Construction and connect failures are returned to the caller as
//! [`SessionError`]. Failures on the engine's disconnect-callback path have no
//! caller to receive them and only surface through logging and
//! [`crate::session::SessionMetrics`].

use crate::engine::EngineError;
use crate::session::SessionState;
use thiserror::Error;

/// Main error type for session lifecycle operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session parameters: {message}")]
    InvalidParams { message: String },

    #[error("Engine initialization failed")]
    EngineInit(#[source] EngineError),

    #[error("Connect retries exhausted after {attempts} attempts to {host}:{port}")]
    ConnectTimeout {
        attempts: u32,
        host: String,
        port: u16,
        #[source]
        last_error: EngineError,
    },

    #[error("Connected, but enabling auto-reconnect failed")]
    AutoReconnectSetup(#[source] EngineError),

    #[error("Connect cancelled after {attempts} attempts")]
    ConnectCancelled { attempts: u32 },

    #[error("Session is not usable in state {state:?}")]
    Destroyed { state: SessionState },
}

impl SessionError {
    /// Create invalid parameters error
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Whether the session can still be used after this error.
    ///
    /// Invalid parameters never produce a session and a destroyed session
    /// stays destroyed; everything else can be followed by another `connect`.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SessionError::InvalidParams { .. } | SessionError::Destroyed { .. }
        )
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
