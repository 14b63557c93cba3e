//! Mock engine for testing
//!
//! Provides a scriptable in-memory MQTT engine so session behavior can be
//! exercised without a broker.

use crate::engine::{EngineClient, EngineError, MqttEngine};
use crate::session::{ConnectParams, DisconnectOutcome, InitParams, SessionHandler};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// How connect attempts of a mock client turn out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectScript {
    /// Fail until attempt n (1-based), then succeed
    SucceedOnAttempt(u32),
    /// Never succeed
    AlwaysFail,
}

#[derive(Debug, Default)]
struct CallCounters {
    init: AtomicU32,
    connect: AtomicU32,
    set_auto_reconnect: AtomicU32,
    manual_reconnect: AtomicU32,
    release: AtomicU32,
}

type RegisteredClient = (Arc<MockClient>, SessionHandler);

/// Mock engine for testing
#[derive(Debug, Clone)]
pub struct MockEngine {
    connect_script: ConnectScript,
    fail_init: bool,
    fail_auto_reconnect: bool,
    fail_manual_reconnect: bool,
    counters: Arc<CallCounters>,
    clients: Arc<Mutex<Vec<RegisteredClient>>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Engine whose clients connect on the first attempt
    pub fn new() -> Self {
        Self {
            connect_script: ConnectScript::SucceedOnAttempt(1),
            fail_init: false,
            fail_auto_reconnect: false,
            fail_manual_reconnect: false,
            counters: Arc::new(CallCounters::default()),
            clients: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding_on_attempt(mut self, attempt: u32) -> Self {
        self.connect_script = ConnectScript::SucceedOnAttempt(attempt);
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.connect_script = ConnectScript::AlwaysFail;
        self
    }

    pub fn with_init_failure(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn with_auto_reconnect_failure(mut self) -> Self {
        self.fail_auto_reconnect = true;
        self
    }

    pub fn with_manual_reconnect_failure(mut self) -> Self {
        self.fail_manual_reconnect = true;
        self
    }

    pub fn init_calls(&self) -> u32 {
        self.counters.init.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> u32 {
        self.counters.connect.load(Ordering::SeqCst)
    }

    /// Number of `set_auto_reconnect(true)` calls
    pub fn set_auto_reconnect_calls(&self) -> u32 {
        self.counters.set_auto_reconnect.load(Ordering::SeqCst)
    }

    pub fn manual_reconnect_calls(&self) -> u32 {
        self.counters.manual_reconnect.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> u32 {
        self.counters.release.load(Ordering::SeqCst)
    }

    /// Number of clients created by `init`
    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or(0)
    }

    /// Init parameters of the most recently created client
    pub fn last_init_params(&self) -> Option<InitParams> {
        self.last_client().map(|(client, _)| client.init_params.clone())
    }

    /// Whether the most recent client currently has a live mock transport
    pub fn is_client_connected(&self) -> bool {
        self.last_client()
            .is_some_and(|(client, _)| client.connected.load(Ordering::SeqCst))
    }

    fn last_client(&self) -> Option<RegisteredClient> {
        self.clients.lock().ok()?.last().cloned()
    }

    /// Drop the transport of the most recent client and run its handler
    pub async fn simulate_disconnect(&self, reason: &str) -> Option<DisconnectOutcome> {
        let (client, handler) = self.last_client()?;
        client.connected.store(false, Ordering::SeqCst);
        Some(handler.on_disconnect(&*client, reason).await)
    }

    /// Let the engine's auto-reconnect restore the most recent client.
    /// Returns false when auto-reconnect is off for that client.
    pub fn simulate_auto_reconnect(&self) -> bool {
        let Some((client, handler)) = self.last_client() else {
            return false;
        };
        if !client.is_auto_reconnect_enabled() {
            return false;
        }
        client.connected.store(true, Ordering::SeqCst);
        handler.on_reconnected();
        true
    }
}

#[async_trait]
impl MqttEngine for MockEngine {
    async fn init(
        &self,
        params: &InitParams,
        handler: SessionHandler,
    ) -> Result<Arc<dyn EngineClient>, EngineError> {
        self.counters.init.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(EngineError::Rejected("mock init failure".to_string()));
        }

        let client = Arc::new(MockClient {
            init_params: params.clone(),
            connect_script: self.connect_script,
            fail_auto_reconnect: self.fail_auto_reconnect,
            fail_manual_reconnect: self.fail_manual_reconnect,
            counters: self.counters.clone(),
            attempts: AtomicU32::new(0),
            auto_reconnect: AtomicBool::new(params.auto_reconnect),
            connected: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });
        if let Ok(mut clients) = self.clients.lock() {
            clients.push((client.clone(), handler));
        }
        Ok(client)
    }
}

/// Client created by [`MockEngine`]
#[derive(Debug)]
pub struct MockClient {
    init_params: InitParams,
    connect_script: ConnectScript,
    fail_auto_reconnect: bool,
    fail_manual_reconnect: bool,
    counters: Arc<CallCounters>,
    attempts: AtomicU32,
    auto_reconnect: AtomicBool,
    connected: AtomicBool,
    released: AtomicBool,
}

impl MockClient {
    fn check_released(&self) -> Result<(), EngineError> {
        if self.released.load(Ordering::SeqCst) {
            Err(EngineError::Released)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EngineClient for MockClient {
    async fn connect(&self, _params: &ConnectParams) -> Result<(), EngineError> {
        self.check_released()?;
        self.counters.connect.fetch_add(1, Ordering::SeqCst);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        match self.connect_script {
            ConnectScript::SucceedOnAttempt(n) if attempt >= n => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(EngineError::Connection(format!(
                "mock connect failure on attempt {attempt}"
            ))),
        }
    }

    async fn set_auto_reconnect(&self, enabled: bool) -> Result<(), EngineError> {
        self.check_released()?;
        if enabled {
            self.counters.set_auto_reconnect.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_auto_reconnect {
            return Err(EngineError::Rejected("mock auto-reconnect failure".to_string()));
        }
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn is_auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    async fn attempt_reconnect(&self) -> Result<(), EngineError> {
        self.check_released()?;
        self.counters.manual_reconnect.fetch_add(1, Ordering::SeqCst);
        if self.fail_manual_reconnect {
            return Err(EngineError::Connection("mock reconnect failure".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.counters.release.fetch_add(1, Ordering::SeqCst);
        }
    }
}
