//! In-process engine driven through channels.
//!
//! Every `connect` opens a fresh bounded event channel for the session. The
//! owner pushes events with [`ChannelEngine::emit`] and can inspect what the
//! session asked of the socket (pairing requests, read receipts).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Notify};

use super::{EngineConnection, EngineEvent, EngineSocket, ProtocolEngine};
use crate::error::{Result, SessionError};
use crate::normalize::{MediaReference, MessageKey};
use crate::store::Credentials;

/// Per-connection event buffer.
pub const EVENT_BUFFER: usize = 256;

/// Pairing code handed out unless configured otherwise.
pub const DEFAULT_PAIRING_CODE: &str = "ABCD1234";

/// Channel-backed [`ProtocolEngine`]. Clones share state.
#[derive(Clone)]
pub struct ChannelEngine {
    shared: Arc<Shared>,
}

struct Shared {
    lines: Mutex<HashMap<String, Line>>,
    media: Mutex<HashMap<String, Bytes>>,
    pairing_code: Mutex<String>,
    connected: Notify,
}

/// Bookkeeping for one session name.
#[derive(Default)]
struct Line {
    sender: Option<mpsc::Sender<EngineEvent>>,
    generation: u64,
    connects: usize,
    overlapping: usize,
    pending_failures: usize,
    credentials: Vec<Credentials>,
    pairing_requests: Vec<String>,
    acknowledged: Vec<MessageKey>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ChannelEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEngine {
    /// Create engine with no sessions
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                lines: Mutex::new(HashMap::new()),
                media: Mutex::new(HashMap::new()),
                pairing_code: Mutex::new(DEFAULT_PAIRING_CODE.to_string()),
                connected: Notify::new(),
            }),
        }
    }

    /// Set the raw code returned by pairing requests
    pub fn with_pairing_code(self, code: impl Into<String>) -> Self {
        *lock(&self.shared.pairing_code) = code.into();
        self
    }

    /// Register downloadable media under its URL or direct path
    pub fn insert_media(&self, location: impl Into<String>, data: impl Into<Bytes>) {
        lock(&self.shared.media).insert(location.into(), data.into());
    }

    /// Make the next `n` connects for `session` fail.
    pub fn fail_next_connects(&self, session: &str, n: usize) {
        lock(&self.shared.lines)
            .entry(session.to_string())
            .or_default()
            .pending_failures += n;
    }

    fn with_line<R>(&self, session: &str, f: impl FnOnce(&Line) -> R) -> Option<R> {
        lock(&self.shared.lines).get(session).map(f)
    }

    /// Connect attempts made for `session`, failed ones included
    pub fn connect_count(&self, session: &str) -> usize {
        self.with_line(session, |l| l.connects).unwrap_or(0)
    }

    /// Connects made while a previous socket for the session was still live
    pub fn overlapping_connects(&self, session: &str) -> usize {
        self.with_line(session, |l| l.overlapping).unwrap_or(0)
    }

    /// Credentials passed to each connect, oldest first
    pub fn connect_credentials(&self, session: &str) -> Vec<Credentials> {
        self.with_line(session, |l| l.credentials.clone())
            .unwrap_or_default()
    }

    /// Phone numbers pairing codes were requested for
    pub fn pairing_requests(&self, session: &str) -> Vec<String> {
        self.with_line(session, |l| l.pairing_requests.clone())
            .unwrap_or_default()
    }

    /// Keys acknowledged as read
    pub fn acknowledged(&self, session: &str) -> Vec<MessageKey> {
        self.with_line(session, |l| l.acknowledged.clone())
            .unwrap_or_default()
    }

    /// Check if the session has a live socket
    pub fn is_open(&self, session: &str) -> bool {
        self.with_line(session, |l| l.sender.as_ref().is_some_and(|s| !s.is_closed()))
            .unwrap_or(false)
    }

    /// Wait until at least `n` connect attempts were made for `session`.
    pub async fn wait_for_connects(&self, session: &str, n: usize) {
        loop {
            let notified = self.shared.connected.notified();
            if self.connect_count(session) >= n {
                return;
            }
            notified.await;
        }
    }

    /// Push an event onto the session's live socket.
    pub async fn emit(&self, session: &str, event: EngineEvent) -> Result<()> {
        let sender = self
            .with_line(session, |l| l.sender.clone())
            .flatten()
            .ok_or_else(|| SessionError::Engine(format!("No open socket for {session}")))?;
        sender
            .send(event)
            .await
            .map_err(|_| SessionError::Engine(format!("Socket for {session} is closed")))
    }

    /// End the session's event stream without a close event.
    pub fn drop_connection(&self, session: &str) {
        if let Some(line) = lock(&self.shared.lines).get_mut(session) {
            line.sender = None;
        }
    }
}

impl ProtocolEngine for ChannelEngine {
    fn connect<'a>(
        &'a self,
        session: &'a str,
        credentials: Credentials,
    ) -> BoxFuture<'a, Result<EngineConnection>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(EVENT_BUFFER);
            let opened = {
                let mut lines = lock(&self.shared.lines);
                let line = lines.entry(session.to_string()).or_default();
                line.connects += 1;
                line.credentials.push(credentials);

                if line.pending_failures > 0 {
                    line.pending_failures -= 1;
                    None
                } else {
                    if line.sender.as_ref().is_some_and(|s| !s.is_closed()) {
                        line.overlapping += 1;
                    }
                    line.generation += 1;
                    line.sender = Some(tx);
                    Some(line.generation)
                }
            };
            self.shared.connected.notify_waiters();

            let generation = opened.ok_or_else(|| {
                SessionError::Engine(format!("Connect refused for {session}"))
            })?;

            Ok(EngineConnection {
                socket: Arc::new(ChannelSocket {
                    shared: Arc::clone(&self.shared),
                    session: session.to_string(),
                    generation,
                }),
                events: rx,
            })
        })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

struct ChannelSocket {
    shared: Arc<Shared>,
    session: String,
    generation: u64,
}

impl ChannelSocket {
    fn record(&self, f: impl FnOnce(&mut Line)) {
        if let Some(line) = lock(&self.shared.lines).get_mut(&self.session) {
            f(line);
        }
    }
}

impl EngineSocket for ChannelSocket {
    fn request_pairing_code<'a>(&'a self, phone_number: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.record(|line| line.pairing_requests.push(phone_number.to_string()));
            Ok(lock(&self.shared.pairing_code).clone())
        })
    }

    fn read_messages<'a>(&'a self, keys: &'a [MessageKey]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(|line| line.acknowledged.extend_from_slice(keys));
            Ok(())
        })
    }

    fn download_media<'a>(&'a self, media: &'a MediaReference) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            let store = lock(&self.shared.media);
            [media.url.as_deref(), media.direct_path.as_deref()]
                .into_iter()
                .flatten()
                .find_map(|location| store.get(location).cloned())
                .ok_or_else(|| SessionError::Engine("Media not found".to_string()))
        })
    }

    fn close(&self) {
        let generation = self.generation;
        self.record(|line| {
            if line.generation == generation {
                line.sender = None;
            }
        });
    }
}
