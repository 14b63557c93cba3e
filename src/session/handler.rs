//! Session-scoped disconnect handling
//!
//! Every session registers its own [`SessionHandler`] with the engine at
//! construction. The handler shares only [`SessionShared`] with the session,
//! so several sessions can live side by side on one engine.

use super::state::{determine_next_state, SessionEvent, SessionMetrics, SessionState};
use crate::engine::EngineClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// State shared between a session and the engine task that calls its handler
#[derive(Debug)]
pub struct SessionShared {
    session_id: Uuid,
    client_id: String,
    auto_reconnect: AtomicBool,
    state_tx: watch::Sender<SessionState>,
    metrics: SessionMetrics,
}

impl SessionShared {
    pub(crate) fn new(client_id: &str) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Created);
        Self {
            session_id: Uuid::new_v4(),
            client_id: client_id.to_string(),
            auto_reconnect: AtomicBool::new(false),
            state_tx,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect.load(Ordering::Acquire)
    }

    pub(crate) fn enable_auto_reconnect(&self) {
        self.auto_reconnect.store(true, Ordering::Release);
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Apply an event to the current state and publish the result
    pub(crate) fn transition(&self, event: SessionEvent) -> SessionState {
        let mut next = SessionState::Destroyed;
        self.state_tx.send_modify(|state| {
            *state = determine_next_state(state, event);
            next = state.clone();
        });
        next
    }

    /// Overwrite the state, used to roll back a cancelled connect
    pub(crate) fn restore(&self, state: SessionState) {
        self.state_tx.send_modify(|current| {
            if *current != SessionState::Destroyed {
                *current = state;
            }
        });
    }
}

/// What the handler did about a transport drop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Auto-reconnect is on; recovery is left to the engine
    AutoReconnectPending,
    /// Manual reconnect attempt restored the link
    ManualReconnected,
    /// Manual reconnect attempt failed; the session stays disconnected
    ManualReconnectFailed,
    /// The session was already destroyed
    Ignored,
}

/// Disconnect callback bound to one session
#[derive(Debug, Clone)]
pub struct SessionHandler {
    shared: Arc<SessionShared>,
}

impl SessionHandler {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id()
    }

    /// Called by the engine whenever the client's transport drops.
    ///
    /// Never returns an error: a failed manual reconnect has no caller to go
    /// to and is only logged and counted.
    pub async fn on_disconnect(&self, client: &dyn EngineClient, reason: &str) -> DisconnectOutcome {
        let shared = &self.shared;
        if shared.state() == SessionState::Destroyed {
            return DisconnectOutcome::Ignored;
        }

        warn!(
            session_id = %shared.session_id(),
            client_id = %shared.client_id(),
            "MQTT disconnect"
        );
        shared.metrics().record_disconnect();
        shared.transition(SessionEvent::TransportDropped(reason.to_string()));

        if shared.is_auto_reconnect_enabled() {
            info!(
                client_id = %shared.client_id(),
                "Auto reconnect is enabled, reconnecting attempt will start now"
            );
            return DisconnectOutcome::AutoReconnectPending;
        }

        warn!(
            client_id = %shared.client_id(),
            "Auto reconnect not enabled, starting manual reconnect"
        );
        match client.attempt_reconnect().await {
            Ok(()) => {
                shared.metrics().record_manual_reconnect(true);
                shared.transition(SessionEvent::Reconnected);
                info!(client_id = %shared.client_id(), "Manual reconnect successful");
                DisconnectOutcome::ManualReconnected
            }
            Err(e) => {
                shared.metrics().record_manual_reconnect(false);
                warn!(client_id = %shared.client_id(), "Manual reconnect failed: {}", e);
                DisconnectOutcome::ManualReconnectFailed
            }
        }
    }

    /// Called by the engine after its auto-reconnect restored the link
    pub fn on_reconnected(&self) {
        let shared = &self.shared;
        if shared.state() == SessionState::Destroyed {
            return;
        }
        shared.metrics().record_auto_reconnect();
        shared.transition(SessionEvent::Reconnected);
        info!(client_id = %shared.client_id(), "Auto reconnect restored the connection");
    }
}
