//! MQTT engine backed by rumqttc
//!
//! This module binds the session to the `rumqttc` MQTT 3.1.1 client. The
//! event loop is created lazily on the first connect. After a connect
//! succeeds, a supervisor task keeps polling it and reports transport drops
//! to the session's [`SessionHandler`].

use super::{EngineClient, EngineError, MqttEngine};
use crate::engine_span;
use crate::session::{ConnectParams, DisconnectOutcome, InitParams, SessionHandler};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Transport};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Standard MQTT over TLS port
pub const MQTTS_PORT: u16 = 8883;

/// rumqttc-backed engine
#[derive(Debug, Clone)]
pub struct RumqttEngine {
    channel_capacity: usize,
    auto_reconnect_delay: Duration,
}

impl Default for RumqttEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RumqttEngine {
    pub fn new() -> Self {
        Self {
            channel_capacity: 10,
            auto_reconnect_delay: Duration::from_millis(1000),
        }
    }

    /// Pause between event loop polls while auto-reconnect restores a link
    pub fn with_auto_reconnect_delay(mut self, delay: Duration) -> Self {
        self.auto_reconnect_delay = delay;
        self
    }

    /// Create a concrete client. [`MqttEngine::init`] wraps this for sessions.
    pub async fn create_client(
        &self,
        params: &InitParams,
        handler: SessionHandler,
    ) -> Result<RumqttClient, EngineError> {
        let options = configure_mqtt_options(params).await?;
        if !params.hostname_verify {
            warn!("rumqttc always verifies the broker hostname over TLS");
        }

        let (shutdown_tx, _) = watch::channel(false);
        debug!("Initialized rumqttc client for {}:{}", params.host, params.port);
        Ok(RumqttClient {
            inner: Arc::new(Inner {
                options,
                channel_capacity: self.channel_capacity,
                command_timeout: params.command_timeout,
                handshake_timeout: params.tls_handshake_timeout,
                auto_reconnect_delay: self.auto_reconnect_delay,
                handler,
                auto_reconnect: AtomicBool::new(params.auto_reconnect),
                link_up: AtomicBool::new(false),
                released: AtomicBool::new(false),
                event_loop: Mutex::new(None),
                async_client: std::sync::Mutex::new(None),
                supervisor: std::sync::Mutex::new(None),
                shutdown_tx,
            }),
        })
    }
}

#[async_trait]
impl MqttEngine for RumqttEngine {
    async fn init(
        &self,
        params: &InitParams,
        handler: SessionHandler,
    ) -> Result<Arc<dyn EngineClient>, EngineError> {
        let client = self.create_client(params, handler).await?;
        Ok(Arc::new(client))
    }
}

/// Build MQTT options from init parameters, loading TLS material from disk
pub async fn configure_mqtt_options(params: &InitParams) -> Result<MqttOptions, EngineError> {
    let mut options = MqttOptions::new(&params.client_id, &params.host, params.port);
    if let Some(transport) = configure_transport(params).await? {
        options.set_transport(transport);
    }
    Ok(options)
}

/// Pick the transport for the configured TLS material.
///
/// A root CA enables TLS with that CA, with client auth when both device
/// certificate and key are given. Without a CA the MQTTS port gets TLS with
/// the platform roots and any other port stays on plain TCP.
async fn configure_transport(params: &InitParams) -> Result<Option<Transport>, EngineError> {
    let Some(ca_path) = &params.root_ca_path else {
        if params.port == MQTTS_PORT {
            return Ok(Some(Transport::tls_with_default_config()));
        }
        return Ok(None);
    };

    let ca = read_tls_file(ca_path).await?;
    let client_auth = match params.client_auth_paths() {
        Some((cert_path, key_path)) => Some((
            read_tls_file(cert_path).await?,
            read_tls_file(key_path).await?,
        )),
        None => None,
    };
    Ok(Some(Transport::tls(ca, client_auth, None)))
}

async fn read_tls_file(path: &Path) -> Result<Vec<u8>, EngineError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| EngineError::Tls {
            path: path.display().to_string(),
            source,
        })
}

struct Inner {
    options: MqttOptions,
    channel_capacity: usize,
    command_timeout: Duration,
    handshake_timeout: Duration,
    auto_reconnect_delay: Duration,
    handler: SessionHandler,
    auto_reconnect: AtomicBool,
    /// Set on every ConnAck, whoever polled it; cleared when a drop is reported
    link_up: AtomicBool,
    released: AtomicBool,
    event_loop: Mutex<Option<EventLoop>>,
    async_client: std::sync::Mutex<Option<AsyncClient>>,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Engine client created by [`RumqttEngine`]
#[derive(Clone)]
pub struct RumqttClient {
    inner: Arc<Inner>,
}

impl RumqttClient {
    fn check_released(&self) -> Result<(), EngineError> {
        if self.inner.released.load(Ordering::Acquire) {
            Err(EngineError::Released)
        } else {
            Ok(())
        }
    }

    /// Poll the event loop until ConnAck, bounded by the command timeout
    async fn wait_for_connack(&self, event_loop: &mut EventLoop) -> Result<(), EngineError> {
        let timeout = self.inner.command_timeout;
        let result = tokio::time::timeout(timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(EngineError::Connection(e.to_string())),
                }
            }
        })
        .await;

        let result = result.unwrap_or(Err(EngineError::Timeout {
            operation: "ConnAck",
            timeout_ms: timeout.as_millis() as u64,
        }));
        if result.is_ok() {
            self.inner.link_up.store(true, Ordering::Release);
        }
        result
    }

    /// Whether the background event loop supervisor is still running
    pub fn is_supervising(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    async fn poll_once(&self) -> Result<Event, EngineError> {
        let mut guard = self.inner.event_loop.lock().await;
        match guard.as_mut() {
            Some(event_loop) => event_loop
                .poll()
                .await
                .map_err(|e| EngineError::Connection(e.to_string())),
            None => Err(EngineError::Released),
        }
    }

    fn start_supervisor(&self) {
        let Ok(mut slot) = self.inner.supervisor.lock() else {
            return;
        };
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let span = engine_span!(
            session_id = %self.inner.handler.session_id(),
            broker = %self.inner.options.broker_address().0
        );
        *slot = Some(tokio::spawn(
            self.clone().supervise(shutdown_rx).instrument(span),
        ));
    }

    async fn supervise(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Starting MQTT event loop supervisor");

        loop {
            let event = tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                event = self.poll_once() => event,
            };

            let reason = match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if !self.inner.link_up.swap(true, Ordering::AcqRel) {
                        self.inner.handler.on_reconnected();
                    }
                    continue;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => "Broker disconnected".to_string(),
                Ok(_) => continue,
                Err(EngineError::Released) => break,
                Err(e) => e.to_string(),
            };

            // Only the first failure after a ConnAck is a new drop
            if self.inner.link_up.swap(false, Ordering::AcqRel) {
                match self.inner.handler.on_disconnect(&self, &reason).await {
                    DisconnectOutcome::AutoReconnectPending => {}
                    DisconnectOutcome::ManualReconnected => continue,
                    DisconnectOutcome::ManualReconnectFailed | DisconnectOutcome::Ignored => break,
                }
            } else {
                debug!("Reconnect poll failed: {}", reason);
            }

            if !self.is_auto_reconnect_enabled() {
                info!("Auto reconnect disabled on engine client, not polling a dead link");
                break;
            }
            tokio::time::sleep(self.inner.auto_reconnect_delay).await;
        }
        info!("MQTT event loop supervisor stopped");
    }
}

#[async_trait]
impl EngineClient for RumqttClient {
    async fn connect(&self, params: &ConnectParams) -> Result<(), EngineError> {
        self.check_released()?;

        let mut guard = self.inner.event_loop.lock().await;
        let event_loop = guard.get_or_insert_with(|| {
            let mut options = self.inner.options.clone();
            options
                .set_keep_alive(params.keep_alive)
                .set_clean_session(params.clean_session);
            let (async_client, mut event_loop) =
                AsyncClient::new(options, self.inner.channel_capacity);
            // rumqttc bounds TCP connect and TLS handshake together, in whole seconds
            event_loop
                .network_options
                .set_connection_timeout(self.inner.handshake_timeout.as_secs().max(1));
            if let Ok(mut slot) = self.inner.async_client.lock() {
                *slot = Some(async_client);
            }
            event_loop
        });

        self.wait_for_connack(event_loop).await?;
        drop(guard);

        self.start_supervisor();
        Ok(())
    }

    async fn set_auto_reconnect(&self, enabled: bool) -> Result<(), EngineError> {
        self.check_released()?;
        self.inner.auto_reconnect.store(enabled, Ordering::Release);
        Ok(())
    }

    fn is_auto_reconnect_enabled(&self) -> bool {
        self.inner.auto_reconnect.load(Ordering::Acquire)
    }

    async fn attempt_reconnect(&self) -> Result<(), EngineError> {
        self.check_released()?;

        let mut guard = self.inner.event_loop.lock().await;
        let event_loop = guard
            .as_mut()
            .ok_or_else(|| EngineError::Connection("client was never connected".to_string()))?;
        self.wait_for_connack(event_loop).await
    }

    fn release(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.shutdown_tx.send_replace(true);
        if let Some(async_client) = self.inner.async_client.lock().ok().and_then(|mut c| c.take()) {
            // Best effort, the event loop may already be gone
            let _ = async_client.try_disconnect();
        }
        if let Some(handle) = self.inner.supervisor.lock().ok().and_then(|mut h| h.take()) {
            handle.abort();
        }
        debug!("Released rumqttc client");
    }
}
