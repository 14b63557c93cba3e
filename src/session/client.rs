//! MQTT session lifecycle: create, connect with bounded retry, destroy
//!
//! This module coordinates the engine calls. Retry decisions, state
//! transitions and disconnect handling live in the sibling modules.

use super::handler::{SessionHandler, SessionShared};
use super::params::{ConnectParams, SessionParams};
use super::retry::{RetryDecision, RetryPolicy};
use super::state::{MetricsSnapshot, SessionEvent, SessionState};
use crate::engine::{EngineClient, MqttEngine};
use crate::error::{SessionError, SessionResult};
use crate::session_span;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

/// Result of a successful connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReport {
    /// Connect attempts used, 0 when the session was already connected
    pub attempts: u32,
}

/// One MQTT client session wrapping exactly one engine client
pub struct MqttSession {
    params: Option<SessionParams>,
    connect_params: ConnectParams,
    retry_policy: RetryPolicy,
    shared: Arc<SessionShared>,
    client: Option<Arc<dyn EngineClient>>,
}

impl MqttSession {
    /// Create a session and its engine client.
    ///
    /// The engine client starts with auto-reconnect disabled; it is switched
    /// on after the first successful connect.
    pub async fn create(params: SessionParams, engine: &dyn MqttEngine) -> SessionResult<Self> {
        params.validate()?;

        let shared = Arc::new(SessionShared::new(params.client_id()));
        let handler = SessionHandler::new(shared.clone());
        let init_params = params.init_params();

        info!(
            session_id = %shared.session_id(),
            client_id = %params.client_id(),
            "Creating MQTT session for {}:{}",
            params.host(),
            params.port()
        );

        let client = engine.init(&init_params, handler).await.map_err(|e| {
            error!("Engine init for {}:{} returned error: {}", params.host(), params.port(), e);
            SessionError::EngineInit(e)
        })?;

        Ok(Self {
            connect_params: params.connect_params(),
            params: Some(params),
            retry_policy: RetryPolicy::default(),
            shared,
            client: Some(client),
        })
    }

    /// Replace the default retry policy (10 attempts, fixed 1000ms)
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> SessionResult<Self> {
        policy.validate()?;
        self.retry_policy = policy;
        Ok(self)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id()
    }

    /// Owned parameters, `None` once the session is destroyed
    pub fn params(&self) -> Option<&SessionParams> {
        self.params.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch state changes, including those made by the disconnect handler
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.shared.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.shared.is_auto_reconnect_enabled()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics().snapshot()
    }

    /// Connect with the session's retry policy.
    ///
    /// Returns on the first successful attempt. When every attempt fails the
    /// session moves to [`SessionState::ConnectRetriesExhausted`] and
    /// [`SessionError::ConnectTimeout`] is returned.
    pub async fn connect(&mut self) -> SessionResult<ConnectReport> {
        self.run_connect(None).await
    }

    /// Like [`MqttSession::connect`], but a `true` on `shutdown_rx` stops the
    /// loop during a backoff wait with [`SessionError::ConnectCancelled`].
    pub async fn connect_cancellable(
        &mut self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> SessionResult<ConnectReport> {
        self.run_connect(Some(shutdown_rx)).await
    }

    async fn run_connect(
        &mut self,
        shutdown_rx: Option<watch::Receiver<bool>>,
    ) -> SessionResult<ConnectReport> {
        let span = session_span!(
            session_id = %self.shared.session_id(),
            client_id = %self.shared.client_id()
        );
        self.connect_loop(shutdown_rx).instrument(span).await
    }

    async fn connect_loop(
        &mut self,
        mut shutdown_rx: Option<watch::Receiver<bool>>,
    ) -> SessionResult<ConnectReport> {
        let (client, params) = match (&self.client, &self.params) {
            (Some(client), Some(params)) => (client.clone(), params),
            _ => {
                return Err(SessionError::Destroyed {
                    state: self.state(),
                })
            }
        };

        let start_state = self.shared.state();
        if start_state.is_connected() {
            debug!("Session already connected");
            return Ok(ConnectReport { attempts: 0 });
        }
        if !start_state.can_connect() {
            return Err(SessionError::Destroyed { state: start_state });
        }

        let host = params.host().to_string();
        let port = params.port();
        let max_attempts = self.retry_policy.max_attempts;
        let mut attempt = 1;

        loop {
            self.shared
                .transition(SessionEvent::ConnectAttemptStarted(attempt));
            self.shared.metrics().record_connect_attempt();

            let error = match client.connect(&self.connect_params).await {
                Ok(()) => break,
                Err(e) => e,
            };
            error!(
                "Error({}) connecting to {}:{} (attempt {}/{})",
                error, host, port, attempt, max_attempts
            );

            let cancel_requested = shutdown_rx.as_ref().is_some_and(|rx| *rx.borrow());
            match self.retry_policy.next_step(attempt, cancel_requested) {
                RetryDecision::Proceed {
                    attempt: next_attempt,
                    delay_ms,
                } => {
                    if !interruptible_sleep(shutdown_rx.as_mut(), delay_ms).await {
                        return Err(self.cancel(start_state, attempt));
                    }
                    attempt = next_attempt;
                }
                RetryDecision::AbortCancelled => {
                    return Err(self.cancel(start_state, attempt));
                }
                RetryDecision::AbortMaxAttemptsExceeded => {
                    self.shared.transition(SessionEvent::RetriesExhausted);
                    error!("Connect retry exceeded after {} attempts", attempt);
                    return Err(SessionError::ConnectTimeout {
                        attempts: attempt,
                        host,
                        port,
                        last_error: error,
                    });
                }
            }
        }

        self.shared.metrics().record_connected();
        self.shared.transition(SessionEvent::ConnectSucceeded);

        if !self.shared.is_auto_reconnect_enabled() {
            if let Err(e) = client.set_auto_reconnect(true).await {
                error!("Unable to set auto reconnect to true: {}", e);
                return Err(SessionError::AutoReconnectSetup(e));
            }
            self.shared.enable_auto_reconnect();
        }

        info!("Connected to {}:{} after {} attempt(s)", host, port, attempt);
        Ok(ConnectReport { attempts: attempt })
    }

    fn cancel(&self, previous: SessionState, attempts: u32) -> SessionError {
        info!("Connect cancelled after {} attempt(s)", attempts);
        self.shared.restore(previous);
        SessionError::ConnectCancelled { attempts }
    }

    /// Release the engine client and the owned parameters.
    ///
    /// Calling this again, or dropping the session afterwards, is a no-op.
    pub fn destroy(&mut self) {
        let Some(client) = self.client.take() else {
            debug!(session_id = %self.shared.session_id(), "Session already destroyed");
            return;
        };

        client.release();
        self.params = None;
        self.shared.transition(SessionEvent::Destroyed);
        info!(
            session_id = %self.shared.session_id(),
            client_id = %self.shared.client_id(),
            "Destroyed MQTT session"
        );
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Sleep between attempts, watching the optional shutdown signal.
/// Returns true if the sleep completed, false if shutdown was requested.
async fn interruptible_sleep(shutdown_rx: Option<&mut watch::Receiver<bool>>, delay_ms: u64) -> bool {
    let delay = tokio::time::sleep(Duration::from_millis(delay_ms));
    let Some(shutdown_rx) = shutdown_rx else {
        delay.await;
        return true;
    };

    tokio::pin!(delay);
    loop {
        tokio::select! {
            _ = &mut delay => return true,
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // Sender gone, no shutdown can arrive any more
                    (&mut delay).await;
                    return true;
                }
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received during connect backoff");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    fn test_params() -> SessionParams {
        SessionParams::new("dev1", "broker.example", 8883)
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        assert!(interruptible_sleep(None, 1).await);

        let (_tx, mut rx) = watch::channel(false);
        assert!(interruptible_sleep(Some(&mut rx), 1).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        let start = std::time::Instant::now();
        assert!(!interruptible_sleep(Some(&mut rx), 10_000).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_interruptible_sleep_ignores_false_signal() {
        let (tx, mut rx) = watch::channel(false);
        let _ = tx.send(false);
        assert!(interruptible_sleep(Some(&mut rx), 5).await);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_params() {
        let engine = MockEngine::new();
        let result = MqttSession::create(SessionParams::new("", "broker.example", 1883), &engine).await;
        assert!(matches!(result, Err(SessionError::InvalidParams { .. })));
        assert_eq!(engine.init_calls(), 0);
    }

    #[tokio::test]
    async fn test_with_retry_policy_validates() {
        let engine = MockEngine::new();
        let session = MqttSession::create(test_params(), &engine).await.unwrap();
        let result = session.with_retry_policy(RetryPolicy::immediate(0));
        assert!(matches!(result, Err(SessionError::InvalidParams { .. })));
    }

    #[tokio::test]
    async fn test_connect_when_already_connected_is_noop() {
        let engine = MockEngine::new();
        let mut session = MqttSession::create(test_params(), &engine).await.unwrap();

        session.connect().await.unwrap();
        let report = session.connect().await.unwrap();

        assert_eq!(report.attempts, 0);
        assert_eq!(engine.connect_calls(), 1);
        assert_eq!(engine.set_auto_reconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_after_destroy_fails() {
        let engine = MockEngine::new();
        let mut session = MqttSession::create(test_params(), &engine).await.unwrap();
        session.destroy();

        let result = session.connect().await;
        assert!(matches!(
            result,
            Err(SessionError::Destroyed {
                state: SessionState::Destroyed
            })
        ));
        assert_eq!(engine.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_restores_previous_state() {
        let engine = MockEngine::new().always_failing();
        let mut session = MqttSession::create(test_params(), &engine)
            .await
            .unwrap()
            .with_retry_policy(RetryPolicy::fixed(10, Duration::from_secs(30)))
            .unwrap();

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });

        let result = session.connect_cancellable(rx).await;

        assert!(matches!(
            result,
            Err(SessionError::ConnectCancelled { attempts: 1 })
        ));
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(engine.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_resumes_after_abandoned_connect() {
        let engine = MockEngine::new().succeeding_on_attempt(2);
        let mut session = MqttSession::create(test_params(), &engine)
            .await
            .unwrap()
            .with_retry_policy(RetryPolicy::fixed(10, Duration::from_secs(30)))
            .unwrap();

        // Caller gives up during the first backoff wait
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), session.connect()).await;
        assert!(abandoned.is_err());
        assert_eq!(session.state(), SessionState::Connecting(1));

        let report = session.connect().await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(engine.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_drop_releases_engine_client() {
        let engine = MockEngine::new();
        {
            let _session = MqttSession::create(test_params(), &engine).await.unwrap();
        }
        assert_eq!(engine.release_calls(), 1);
    }
}
