//! Test helpers and utilities for integration tests

use iot_session::session::{MqttSession, RetryPolicy, SessionParams};
use iot_session::testing::MockEngine;

/// Parameters for the reference device
#[allow(dead_code)]
pub fn test_params() -> SessionParams {
    SessionParams::new("dev1", "broker.example", 8883)
}

/// Default attempt budget without sleeping between attempts
#[allow(dead_code)]
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::immediate(10)
}

/// Create a session on the mock engine and connect it
#[allow(dead_code)]
pub async fn connected_session(engine: &MockEngine) -> MqttSession {
    let mut session = MqttSession::create(test_params(), engine)
        .await
        .expect("Session creation should succeed")
        .with_retry_policy(fast_policy())
        .expect("Retry policy should be valid");
    session.connect().await.expect("Connect should succeed");
    session
}
