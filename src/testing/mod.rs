//! Testing utilities and mock implementations
//!
//! This module provides a mock MQTT engine for testing sessions
//! without requiring an MQTT broker.

pub mod mocks;

pub use mocks::*;
