//! Session registry.
//!
//! Owns one [`ConnectionStateMachine`] per session name and guarantees at most
//! one running driver, and therefore at most one engine socket, per name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bus::EventBus;
use crate::contacts::ContactBook;
use crate::engine::ProtocolEngine;
use crate::error::{Result, SessionError};
use crate::session::{AuthPrompt, ConnectionStateMachine, SessionConfig, SessionContext, Timings};
use crate::store::CredentialStore;

/// Registry of live sessions. Constructed explicitly; clones share sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<ConnectionStateMachine>>>>,
    ctx: SessionContext,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(
        engine: Arc<dyn ProtocolEngine>,
        store: Arc<dyn CredentialStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ctx: SessionContext::new(engine, store, bus),
        }
    }

    /// Set timings for sessions started afterwards
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.ctx = self.ctx.with_timings(timings);
        self
    }

    /// Set the auth prompt sink for sessions started afterwards
    pub fn with_prompt(mut self, prompt: Arc<dyn AuthPrompt>) -> Self {
        self.ctx = self.ctx.with_prompt(prompt);
        self
    }

    /// Start a session, or return the one already running under that name.
    ///
    /// The config is validated before the registry or the engine is touched.
    /// A session whose driver has exited (logged out) is replaced.
    pub async fn start(&self, config: SessionConfig) -> Result<Arc<ConnectionStateMachine>> {
        config.validate()?;

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&config.session_name) {
            if existing.is_running() {
                tracing::debug!(session = %config.session_name, "session already running");
                return Ok(Arc::clone(existing));
            }
        }

        let name = config.session_name.clone();
        let machine = ConnectionStateMachine::new(config, self.ctx.clone())?;
        machine.start();
        sessions.insert(name.clone(), Arc::clone(&machine));
        tracing::info!(session = %name, mode = %machine.config().connection_mode, "session started");
        Ok(machine)
    }

    /// Start every config in order, stopping at the first invalid one.
    pub async fn start_all(
        &self,
        configs: impl IntoIterator<Item = SessionConfig>,
    ) -> Result<Vec<Arc<ConnectionStateMachine>>> {
        let mut started = Vec::new();
        for config in configs {
            started.push(self.start(config).await?);
        }
        Ok(started)
    }

    /// Get session by name
    pub async fn get(&self, name: &str) -> Option<Arc<ConnectionStateMachine>> {
        self.sessions.read().await.get(name).cloned()
    }

    /// Check if a session is registered
    pub async fn contains(&self, name: &str) -> bool {
        self.sessions.read().await.contains_key(name)
    }

    /// Registered session names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get session count
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Stop and unregister a session.
    pub async fn remove(&self, name: &str) -> Result<Arc<ConnectionStateMachine>> {
        let machine = self
            .sessions
            .write()
            .await
            .remove(name)
            .ok_or_else(|| SessionError::SessionNotFound(name.to_string()))?;
        machine.abort();
        Ok(machine)
    }

    /// Stop every session and empty the registry.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, machine) in &drained {
            machine.abort();
        }
        tracing::info!(sessions = drained.len(), "registry shut down");
    }

    /// Contacts shared by all sessions
    pub fn contacts(&self) -> &ContactBook {
        &self.ctx.contacts
    }

    /// Event bus shared by all sessions
    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    /// Credential store shared by all sessions
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.ctx.store
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("engine", &self.ctx.engine.name())
            .field("timings", &self.ctx.timings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelEngine;
    use crate::session::ConnectionMode;
    use crate::store::{FileCredentialStore, MemoryCredentialStore};

    fn registry(engine: &ChannelEngine) -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(engine.clone()),
            Arc::new(MemoryCredentialStore::new()),
            EventBus::new(),
        )
    }

    #[tokio::test]
    async fn test_start_registers_session() {
        let engine = ChannelEngine::new();
        let registry = registry(&engine);

        registry.start(SessionConfig::new("work")).await.unwrap();
        assert!(registry.contains("work").await);
        assert_eq!(registry.count().await, 1);
        assert_eq!(registry.names().await, vec!["work".to_string()]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_returns_same_machine() {
        let engine = ChannelEngine::new();
        let registry = registry(&engine);

        let first = registry.start(SessionConfig::new("work")).await.unwrap();
        let second = registry.start(SessionConfig::new("work")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.count().await, 1);

        engine.wait_for_connects("work", 1).await;
        tokio::task::yield_now().await;
        assert_eq!(engine.connect_count("work"), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_not_registered() {
        let engine = ChannelEngine::new();
        let registry = registry(&engine);

        let config = SessionConfig::new("work")
            .with_mode(ConnectionMode::Pairing)
            .with_phone_number("   ");
        let err = registry.start(config).await.unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(!registry.contains("work").await);
        assert_eq!(engine.connect_count("work"), 0);
    }

    #[tokio::test]
    async fn test_path_like_name_fails_before_connect() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ChannelEngine::new();
        let registry = SessionRegistry::new(
            Arc::new(engine.clone()),
            Arc::new(FileCredentialStore::new(dir.path())),
            EventBus::new(),
        );

        for name in ["team/work", ".."] {
            let err = registry.start(SessionConfig::new(name)).await.unwrap_err();
            assert!(matches!(err, SessionError::Config(_)));
            assert!(!registry.contains(name).await);
            assert_eq!(engine.connect_count(name), 0);
        }
    }

    #[tokio::test]
    async fn test_remove() {
        let engine = ChannelEngine::new();
        let registry = registry(&engine);
        registry.start(SessionConfig::new("work")).await.unwrap();
        engine.wait_for_connects("work", 1).await;

        let machine = registry.remove("work").await.unwrap();
        assert!(!machine.is_running());
        assert!(!engine.is_open("work"));
        assert!(matches!(
            registry.remove("work").await,
            Err(SessionError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_start_all_stops_at_invalid() {
        let engine = ChannelEngine::new();
        let registry = registry(&engine);
        let configs = vec![
            SessionConfig::new("a"),
            SessionConfig::new(""),
            SessionConfig::new("b"),
        ];
        assert!(registry.start_all(configs).await.is_err());
        assert_eq!(registry.names().await, vec!["a".to_string()]);
        registry.shutdown().await;
        assert_eq!(registry.count().await, 0);
    }
}
