//! Process-wide contact book.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Contact record as reported by the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Account id
    pub id: String,
    /// Name saved in the address book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Self-chosen display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
    /// Verified business name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_name: Option<String>,
}

impl Contact {
    /// Contact with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Best available display name
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.verified_name.as_deref())
            .or(self.notify.as_deref())
    }
}

/// Shared id → contact mapping. Last write wins per id.
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    contacts: Arc<RwLock<HashMap<String, Contact>>>,
}

impl ContactBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of updates under one write lock.
    pub async fn upsert_all(&self, updates: &[Contact]) {
        let mut contacts = self.contacts.write().await;
        for update in updates {
            contacts.insert(update.id.clone(), update.clone());
        }
    }

    /// Get contact by id
    pub async fn get(&self, id: &str) -> Option<Contact> {
        self.contacts.read().await.get(id).cloned()
    }

    /// Get contact count
    pub async fn len(&self) -> usize {
        self.contacts.read().await.len()
    }

    /// Check if no contacts are known
    pub async fn is_empty(&self) -> bool {
        self.contacts.read().await.is_empty()
    }

    /// Copy of every known contact
    pub async fn snapshot(&self) -> Vec<Contact> {
        self.contacts.read().await.values().cloned().collect()
    }
}
