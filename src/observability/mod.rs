//! Observability for MQTT sessions
//!
//! Structured logging setup and span macros. Session counters live with the
//! session itself in [`crate::session::SessionMetrics`].

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{engine_span, session_span};
