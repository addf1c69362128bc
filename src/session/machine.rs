//! Per-session driver task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::config::{ConnectionMode, SessionConfig, Timings};
use super::handle::SessionHandle;
use super::pairing::{AuthPrompt, LogPrompt, PairingCode, PairingRequest};
use super::state::ConnectionState;
use crate::bus::{
    CallReceived, Connected, ContactsUpdated, Disconnected, EventBus, GroupUpdated,
    MessageReceived,
};
use crate::contacts::ContactBook;
use crate::engine::{
    ConnectionUpdate, DisconnectReason, EngineConnection, EngineEvent, EngineSocket, LinkState,
    ProtocolEngine,
};
use crate::error::Result;
use crate::normalize::{normalize, MessageKey, RawMessageBatch};
use crate::store::{CredentialStore, Credentials};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collaborators shared by every session of a registry.
#[derive(Clone)]
pub struct SessionContext {
    /// Opens sockets
    pub engine: Arc<dyn ProtocolEngine>,
    /// Persists credentials
    pub store: Arc<dyn CredentialStore>,
    /// Receives lifecycle and message events
    pub bus: EventBus,
    /// Contacts reported by any session
    pub contacts: ContactBook,
    /// Shows QR payloads and pairing codes
    pub prompt: Arc<dyn AuthPrompt>,
    /// Settle delay and reconnect backoff
    pub timings: Timings,
}

impl SessionContext {
    /// Context with default timings and a logging prompt.
    pub fn new(
        engine: Arc<dyn ProtocolEngine>,
        store: Arc<dyn CredentialStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            engine,
            store,
            bus,
            contacts: ContactBook::new(),
            prompt: Arc::new(LogPrompt),
            timings: Timings::default(),
        }
    }

    /// Set timings
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Set auth prompt sink
    pub fn with_prompt(mut self, prompt: Arc<dyn AuthPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Set contact book
    pub fn with_contacts(mut self, contacts: ContactBook) -> Self {
        self.contacts = contacts;
        self
    }
}

/// Drives one session through connect, authenticate, and reconnect.
///
/// The driver runs on its own tokio task and owns at most one engine socket
/// at a time: a new socket is only requested after the previous event stream
/// has ended and the backoff has elapsed.
///
/// Each `start` and `abort` bumps a generation counter. A driver only
/// publishes a socket or handle while its own generation is current, so a
/// driver that was mid-poll when aborted closes what it opened instead.
pub struct ConnectionStateMachine {
    config: SessionConfig,
    ctx: SessionContext,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU64,
    generation: AtomicU64,
    socket: Mutex<Option<Arc<dyn EngineSocket>>>,
    handle: Mutex<Option<SessionHandle>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionStateMachine {
    /// Validate `config` and build an idle machine.
    pub fn new(config: SessionConfig, ctx: SessionContext) -> Result<Arc<Self>> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Idle);
        Ok(Arc::new(Self {
            config,
            ctx,
            state,
            attempts: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            socket: Mutex::new(None),
            handle: Mutex::new(None),
            driver: Mutex::new(None),
        }))
    }

    /// Spawn the driver task. Returns false if it is already running.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut driver = lock(&self.driver);
        if driver.as_ref().is_some_and(|d| !d.is_finished()) {
            return false;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let machine = Arc::clone(self);
        *driver = Some(tokio::spawn(machine.drive(generation)));
        true
    }

    /// Stop the driver and close the live socket, if any.
    ///
    /// No `disconnected` event is published for a deliberate stop.
    pub fn abort(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
        }
        if let Some(socket) = lock(&self.socket).take() {
            socket.close();
        }
        lock(&self.handle).take();
        self.set_state(ConnectionState::Closed);
        tracing::info!(session = %self.config.session_name, "session stopped");
    }

    /// Check if the driver task is alive
    pub fn is_running(&self) -> bool {
        lock(&self.driver)
            .as_ref()
            .is_some_and(|d| !d.is_finished())
    }

    /// Session name
    pub fn session_name(&self) -> &str {
        &self.config.session_name
    }

    /// Startup configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connection attempts started so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Handle for the open socket, `None` unless the state is `Open`
    pub fn handle(&self) -> Option<SessionHandle> {
        lock(&self.handle).clone()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "state transition");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn drive(self: Arc<Self>, generation: u64) {
        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let span = tracing::info_span!(
                "session",
                name = %self.config.session_name,
                attempt,
                connection = %Uuid::new_v4(),
            );
            let Some(reason) = self.run_attempt(generation).instrument(span).await else {
                break;
            };

            if reason.is_terminal() {
                tracing::warn!(
                    session = %self.config.session_name,
                    %reason,
                    "session logged out, not reconnecting"
                );
                break;
            }
            tracing::info!(
                session = %self.config.session_name,
                %reason,
                backoff_ms = self.ctx.timings.reconnect_backoff.as_millis() as u64,
                "reconnecting after backoff"
            );
            tokio::time::sleep(self.ctx.timings.reconnect_backoff).await;
        }
    }

    /// One pass of the startup sequence and event loop.
    ///
    /// Returns `None` when the machine was stopped while connecting.
    async fn run_attempt(&self, generation: u64) -> Option<DisconnectReason> {
        let name = self.session_name();
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.ctx.store.prepare(name) {
            tracing::warn!("credential container setup failed: {e}");
        }
        let credentials = match self.ctx.store.load(name) {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                tracing::error!("stored credentials unreadable, starting unregistered: {e}");
                Credentials::default()
            },
        };
        let registered = credentials.registered;
        let mut me = credentials.me.clone();

        let connection = match self.ctx.engine.connect(name, credentials).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(engine = self.ctx.engine.name(), "connect failed: {e}");
                return Some(self.closed(DisconnectReason::ConnectionClosed));
            },
        };
        let EngineConnection { socket, mut events } = connection;
        {
            let mut slot = lock(&self.socket);
            if !self.is_current(generation) {
                drop(slot);
                socket.close();
                if !self.is_running() {
                    self.set_state(ConnectionState::Closed);
                }
                tracing::debug!("stopped while connecting, socket discarded");
                return None;
            }
            *slot = Some(Arc::clone(&socket));
        }
        tracing::info!(engine = self.ctx.engine.name(), registered, "socket opened");

        if !registered && self.config.connection_mode == ConnectionMode::Pairing {
            self.request_pairing(&*socket).await;
        }

        let reason = loop {
            let Some(event) = events.recv().await else {
                tracing::debug!("event stream ended without close");
                break DisconnectReason::ConnectionLost;
            };
            if let Some(reason) = self.handle_event(event, &socket, &mut me, generation).await {
                break reason;
            }
        };

        drop(events);
        socket.close();
        {
            let mut slot = lock(&self.socket);
            if !self.is_current(generation) {
                if slot.as_ref().is_some_and(|live| Arc::ptr_eq(live, &socket)) {
                    slot.take();
                }
                tracing::debug!(%reason, "stopped, socket closed");
                return None;
            }
            slot.take();
        }
        lock(&self.handle).take();
        Some(self.closed(reason))
    }

    fn closed(&self, reason: DisconnectReason) -> DisconnectReason {
        self.set_state(ConnectionState::Closed);
        tracing::info!(%reason, "connection closed");
        self.ctx.bus.emit::<Disconnected>(self.session_name(), reason);
        reason
    }

    async fn request_pairing(&self, socket: &dyn EngineSocket) {
        let Some(phone) = self.config.phone_number() else {
            return;
        };
        self.set_state(ConnectionState::AwaitingPairing);
        tokio::time::sleep(self.ctx.timings.pairing_settle_delay).await;

        let code = match socket.request_pairing_code(phone).await {
            Ok(raw) => PairingCode::parse(&raw),
            Err(e) => Err(e),
        };
        match code {
            Ok(code) => {
                tracing::info!(phone, %code, "pairing code issued");
                let request = PairingRequest {
                    phone_number: phone.to_string(),
                    code,
                };
                self.ctx.prompt.pairing_code(self.session_name(), &request);
            },
            Err(e) => tracing::warn!(phone, "pairing code request failed: {e}"),
        }
    }

    /// Returns the close reason when `event` ends the connection.
    async fn handle_event(
        &self,
        event: EngineEvent,
        socket: &Arc<dyn EngineSocket>,
        me: &mut Option<String>,
        generation: u64,
    ) -> Option<DisconnectReason> {
        let name = self.session_name();
        match event {
            EngineEvent::CredentialsUpdate(credentials) => {
                if credentials.me.is_some() {
                    me.clone_from(&credentials.me);
                }
                match self.ctx.store.save(name, &credentials) {
                    Ok(()) => tracing::debug!(registered = credentials.registered, "credentials saved"),
                    Err(e) => tracing::error!("failed to persist credentials: {e}"),
                }
            },
            EngineEvent::Connection(update) => {
                return self.handle_connection(update, socket, me.as_deref(), generation);
            },
            EngineEvent::MessagesUpsert(batch) => self.handle_messages(&batch, socket, me.as_deref()),
            EngineEvent::ContactsUpdate(contacts) => {
                self.ctx.contacts.upsert_all(&contacts).await;
                self.ctx.bus.emit::<ContactsUpdated>(name, contacts);
            },
            EngineEvent::GroupParticipantsUpdate(raw) => match raw.validate() {
                Some(update) => {
                    self.ctx.bus.emit::<GroupUpdated>(name, update);
                },
                None => tracing::debug!(?raw, "dropping incomplete group participants update"),
            },
            EngineEvent::Call(calls) => {
                self.ctx.bus.emit::<CallReceived>(name, calls);
            },
        }
        None
    }

    fn handle_connection(
        &self,
        update: ConnectionUpdate,
        socket: &Arc<dyn EngineSocket>,
        me: Option<&str>,
        generation: u64,
    ) -> Option<DisconnectReason> {
        let name = self.session_name();
        if let Some(qr) = update.qr {
            match self.config.connection_mode {
                ConnectionMode::Qr => {
                    self.set_state(ConnectionState::AwaitingQr);
                    self.ctx.prompt.qr(name, &qr);
                },
                ConnectionMode::Pairing => tracing::debug!("ignoring QR payload in pairing mode"),
            }
        }

        match update.connection? {
            LinkState::Connecting => None,
            LinkState::Open => {
                let handle = SessionHandle::new(
                    name,
                    me.map(str::to_string),
                    Arc::clone(socket),
                    self.ctx.contacts.clone(),
                );
                {
                    let mut slot = lock(&self.handle);
                    if !self.is_current(generation) {
                        return Some(DisconnectReason::ConnectionClosed);
                    }
                    *slot = Some(handle.clone());
                }
                self.set_state(ConnectionState::Open);
                tracing::info!(me, "session open");
                self.ctx.bus.emit::<Connected>(name, handle);
                None
            },
            LinkState::Close(reason) => Some(reason),
        }
    }

    fn handle_messages(
        &self,
        batch: &RawMessageBatch,
        socket: &Arc<dyn EngineSocket>,
        me: Option<&str>,
    ) {
        let message = match normalize(batch, me) {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!(kind = ?batch.kind, "filtered upsert");
                return;
            },
            Err(e) => {
                tracing::warn!("dropping message: {e}");
                return;
            },
        };

        if self.config.auto_acknowledge_reads {
            acknowledge(Arc::clone(socket), message.key.clone());
        }
        self.ctx.bus.emit::<MessageReceived>(self.session_name(), message);
    }
}

/// Send a read receipt without holding up the event loop.
fn acknowledge(socket: Arc<dyn EngineSocket>, key: MessageKey) {
    tokio::spawn(
        async move {
            if let Err(e) = socket.read_messages(std::slice::from_ref(&key)).await {
                tracing::warn!(message_id = %key.id, "read receipt failed: {e}");
            }
        }
        .in_current_span(),
    );
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("session", &self.config.session_name)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelEngine;
    use crate::store::MemoryCredentialStore;
    use std::time::Duration;

    fn context(engine: &ChannelEngine, store: &Arc<MemoryCredentialStore>) -> SessionContext {
        SessionContext::new(
            Arc::new(engine.clone()),
            Arc::clone(store) as Arc<dyn CredentialStore>,
            EventBus::new(),
        )
        .with_timings(
            Timings::default()
                .with_pairing_settle_delay(Duration::from_millis(10))
                .with_reconnect_backoff(Duration::from_millis(10)),
        )
    }

    async fn wait_for(machine: &ConnectionStateMachine, target: ConnectionState) {
        let mut rx = machine.subscribe_state();
        rx.wait_for(|s| *s == target).await.unwrap();
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let config = SessionConfig::new("work").with_mode(ConnectionMode::Pairing);
        assert!(ConnectionStateMachine::new(config, context(&engine, &store)).is_err());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let machine =
            ConnectionStateMachine::new(SessionConfig::new("work"), context(&engine, &store))
                .unwrap();

        assert_eq!(machine.state(), ConnectionState::Idle);
        assert!(machine.start());
        assert!(!machine.start());
        engine.wait_for_connects("work", 1).await;
        assert!(machine.is_running());
        assert_eq!(engine.overlapping_connects("work"), 0);
        machine.abort();
    }

    #[tokio::test]
    async fn test_open_exposes_handle() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let machine =
            ConnectionStateMachine::new(SessionConfig::new("work"), context(&engine, &store))
                .unwrap();
        machine.start();
        engine.wait_for_connects("work", 1).await;

        engine
            .emit("work", EngineEvent::Connection(ConnectionUpdate::open()))
            .await
            .unwrap();
        wait_for(&machine, ConnectionState::Open).await;
        let handle = machine.handle().unwrap();
        assert_eq!(handle.session_name(), "work");
        machine.abort();
        assert!(machine.handle().is_none());
        assert!(!engine.is_open("work"));
    }

    #[tokio::test]
    async fn test_driver_aborted_mid_connect_closes_its_socket() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let machine =
            ConnectionStateMachine::new(SessionConfig::new("work"), context(&engine, &store))
                .unwrap();

        // An attempt still in flight when the machine is stopped
        let stale = machine.generation.load(Ordering::SeqCst);
        machine.abort();
        assert!(machine.run_attempt(stale).await.is_none());

        assert_eq!(engine.connect_count("work"), 1);
        assert!(!engine.is_open("work"));
        assert!(lock(&machine.socket).is_none());
        assert_eq!(machine.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_stale_open_does_not_publish_handle() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let machine =
            ConnectionStateMachine::new(SessionConfig::new("work"), context(&engine, &store))
                .unwrap();

        let stale = machine.generation.load(Ordering::SeqCst);
        let attempt = {
            let machine = Arc::clone(&machine);
            tokio::spawn(async move { machine.run_attempt(stale).await })
        };
        engine.wait_for_connects("work", 1).await;
        machine.generation.fetch_add(1, Ordering::SeqCst);
        engine
            .emit("work", EngineEvent::Connection(ConnectionUpdate::open()))
            .await
            .unwrap();

        assert!(attempt.await.unwrap().is_none());
        assert!(machine.handle().is_none());
        assert!(lock(&machine.socket).is_none());
        assert!(!engine.is_open("work"));
    }

    #[tokio::test]
    async fn test_credentials_update_tracks_me() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let machine =
            ConnectionStateMachine::new(SessionConfig::new("work"), context(&engine, &store))
                .unwrap();
        machine.start();
        engine.wait_for_connects("work", 1).await;

        let creds = Credentials::registered("628@s.example", vec![1, 2, 3]);
        engine
            .emit("work", EngineEvent::CredentialsUpdate(creds.clone()))
            .await
            .unwrap();
        engine
            .emit("work", EngineEvent::Connection(ConnectionUpdate::open()))
            .await
            .unwrap();
        wait_for(&machine, ConnectionState::Open).await;

        assert_eq!(store.load("work").unwrap(), Some(creds));
        assert_eq!(machine.handle().unwrap().me(), Some("628@s.example"));
        machine.abort();
    }

    #[tokio::test]
    async fn test_qr_ignored_in_pairing_mode() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let machine = ConnectionStateMachine::new(
            SessionConfig::pairing("work", "628123"),
            context(&engine, &store),
        )
        .unwrap();
        machine.start();
        engine.wait_for_connects("work", 1).await;
        wait_for(&machine, ConnectionState::AwaitingPairing).await;

        engine
            .emit("work", EngineEvent::Connection(ConnectionUpdate::qr("2@abc")))
            .await
            .unwrap();
        engine
            .emit("work", EngineEvent::Connection(ConnectionUpdate::open()))
            .await
            .unwrap();
        wait_for(&machine, ConnectionState::Open).await;
        assert_eq!(engine.pairing_requests("work"), vec!["628123".to_string()]);
        machine.abort();
    }

    #[tokio::test]
    async fn test_registered_pairing_session_skips_code() {
        let engine = ChannelEngine::new();
        let store = Arc::new(
            MemoryCredentialStore::new()
                .with_credentials("work", Credentials::registered("628@s.example", vec![9])),
        );
        let machine = ConnectionStateMachine::new(
            SessionConfig::pairing("work", "628123"),
            context(&engine, &store),
        )
        .unwrap();
        machine.start();
        engine.wait_for_connects("work", 1).await;

        engine
            .emit("work", EngineEvent::Connection(ConnectionUpdate::open()))
            .await
            .unwrap();
        wait_for(&machine, ConnectionState::Open).await;
        assert!(engine.pairing_requests("work").is_empty());
        assert!(engine.connect_credentials("work")[0].registered);
        machine.abort();
    }

    #[tokio::test]
    async fn test_prepare_failure_does_not_block_connect() {
        let engine = ChannelEngine::new();
        let store = Arc::new(MemoryCredentialStore::new().with_prepare_failure());
        let machine =
            ConnectionStateMachine::new(SessionConfig::new("work"), context(&engine, &store))
                .unwrap();
        machine.start();
        engine.wait_for_connects("work", 1).await;
        assert_eq!(engine.connect_credentials("work"), vec![Credentials::default()]);
        machine.abort();
    }
}
