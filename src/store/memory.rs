//! In-memory credential store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{CredentialStore, Credentials};
use crate::error::{Result, SessionError};

/// Credentials held in process memory. Replacement is a single map insert.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    creds: Mutex<HashMap<String, Credentials>>,
    saves: AtomicUsize,
    fail_prepare: AtomicBool,
}

impl MemoryCredentialStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session with existing credentials.
    pub fn with_credentials(self, session: impl Into<String>, credentials: Credentials) -> Self {
        self.creds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.into(), credentials);
        self
    }

    /// Make every `prepare` call fail.
    pub fn with_prepare_failure(self) -> Self {
        self.fail_prepare.store(true, Ordering::Relaxed);
        self
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn prepare(&self, session: &str) -> Result<()> {
        if self.fail_prepare.load(Ordering::Relaxed) {
            return Err(SessionError::Credentials(format!(
                "Cannot prepare container for {session}"
            )));
        }
        Ok(())
    }

    fn load(&self, session: &str) -> Result<Option<Credentials>> {
        Ok(self
            .creds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .cloned())
    }

    fn save(&self, session: &str, credentials: &Credentials) -> Result<()> {
        self.creds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.to_string(), credentials.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self, session: &str) -> Result<()> {
        self.creds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load("work").unwrap().is_none());

        store.save("work", &Credentials::default()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load("work").unwrap(), Some(Credentials::default()));

        store.clear("work").unwrap();
        assert!(store.load("work").unwrap().is_none());
    }

    #[test]
    fn test_prepare_failure() {
        let store = MemoryCredentialStore::new().with_prepare_failure();
        assert!(store.prepare("work").is_err());
    }
}
