//! Pure session state transitions and session metrics
//!
//! State changes are computed by [`determine_next_state`] and published on a
//! `tokio::sync::watch` channel by the session and its disconnect handler.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lifecycle state of an MQTT session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Engine client initialized, never connected
    Created,
    /// Connect loop running (attempt count)
    Connecting(u32),
    /// Connected to the broker
    Connected,
    /// Transport dropped with reason
    Disconnected(String),
    /// Connect loop spent its retry budget without a successful attempt
    ConnectRetriesExhausted,
    /// Engine client and owned parameters released
    Destroyed,
}

impl SessionState {
    /// States from which `connect` may start a new connect loop.
    ///
    /// `Connecting` is included: connect takes `&mut self`, so a session seen
    /// in that state at entry was left there by a dropped connect future.
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            SessionState::Created
                | SessionState::Connecting(_)
                | SessionState::Disconnected(_)
                | SessionState::ConnectRetriesExhausted
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connect attempt number n started
    ConnectAttemptStarted(u32),
    /// A connect attempt succeeded
    ConnectSucceeded,
    /// All connect attempts failed
    RetriesExhausted,
    /// The engine reported a transport drop
    TransportDropped(String),
    /// Auto-reconnect or a manual reconnect restored the link
    Reconnected,
    /// The session was destroyed
    Destroyed,
}

/// Determine next state after a session event (pure function)
///
/// `Destroyed` is terminal: engine callbacks that race with teardown cannot
/// bring a destroyed session back.
pub fn determine_next_state(current: &SessionState, event: SessionEvent) -> SessionState {
    if *current == SessionState::Destroyed {
        debug!("Ignoring {:?} for destroyed session", event);
        return SessionState::Destroyed;
    }

    match event {
        SessionEvent::ConnectAttemptStarted(attempt) => SessionState::Connecting(attempt),
        SessionEvent::ConnectSucceeded => {
            info!("MQTT session connected");
            SessionState::Connected
        }
        SessionEvent::RetriesExhausted => {
            error!("Connect retry budget exhausted");
            SessionState::ConnectRetriesExhausted
        }
        SessionEvent::TransportDropped(reason) => {
            warn!("MQTT transport dropped: {}", reason);
            SessionState::Disconnected(reason)
        }
        SessionEvent::Reconnected => {
            info!("MQTT session reconnected");
            SessionState::Connected
        }
        SessionEvent::Destroyed => SessionState::Destroyed,
    }
}

/// Counters shared between the session and its disconnect handler
#[derive(Debug, Default)]
pub struct SessionMetrics {
    connect_attempts: AtomicU32,
    connects: AtomicU32,
    disconnects: AtomicU32,
    auto_reconnects: AtomicU32,
    manual_reconnects_succeeded: AtomicU32,
    manual_reconnects_failed: AtomicU32,
    last_connected_at: Mutex<Option<DateTime<Utc>>>,
    last_disconnected_at: Mutex<Option<DateTime<Utc>>>,
}

impl SessionMetrics {
    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        Self::stamp(&self.last_connected_at);
    }

    pub(crate) fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        Self::stamp(&self.last_disconnected_at);
    }

    pub(crate) fn record_auto_reconnect(&self) {
        self.auto_reconnects.fetch_add(1, Ordering::Relaxed);
        Self::stamp(&self.last_connected_at);
    }

    pub(crate) fn record_manual_reconnect(&self, succeeded: bool) {
        if succeeded {
            self.manual_reconnects_succeeded
                .fetch_add(1, Ordering::Relaxed);
            Self::stamp(&self.last_connected_at);
        } else {
            self.manual_reconnects_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stamp(slot: &Mutex<Option<DateTime<Utc>>>) {
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(Utc::now());
        }
    }

    fn read(slot: &Mutex<Option<DateTime<Utc>>>) -> Option<DateTime<Utc>> {
        slot.lock().ok().and_then(|guard| *guard)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            auto_reconnects: self.auto_reconnects.load(Ordering::Relaxed),
            manual_reconnects_succeeded: self.manual_reconnects_succeeded.load(Ordering::Relaxed),
            manual_reconnects_failed: self.manual_reconnects_failed.load(Ordering::Relaxed),
            last_connected_at: Self::read(&self.last_connected_at),
            last_disconnected_at: Self::read(&self.last_disconnected_at),
        }
    }
}

/// Point-in-time copy of [`SessionMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connect_attempts: u32,
    pub connects: u32,
    pub disconnects: u32,
    pub auto_reconnects: u32,
    pub manual_reconnects_succeeded: u32,
    pub manual_reconnects_failed: u32,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
}
