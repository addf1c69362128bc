//! Raw events emitted by a protocol engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DisconnectReason;
use crate::contacts::Contact;
use crate::normalize::RawMessageBatch;
use crate::store::Credentials;

/// Socket lifecycle as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Handshake in progress
    Connecting,
    /// Authenticated and ready
    Open,
    /// Socket closed
    Close(DisconnectReason),
}

/// `connection.update` payload. Fields arrive independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionUpdate {
    /// New link state, if it changed
    pub connection: Option<LinkState>,
    /// Fresh QR payload to display
    pub qr: Option<String>,
}

impl ConnectionUpdate {
    /// Link opened
    pub fn open() -> Self {
        Self {
            connection: Some(LinkState::Open),
            qr: None,
        }
    }

    /// Link closed with reason
    pub fn close(reason: DisconnectReason) -> Self {
        Self {
            connection: Some(LinkState::Close(reason)),
            qr: None,
        }
    }

    /// New QR payload
    pub fn qr(payload: impl Into<String>) -> Self {
        Self {
            connection: None,
            qr: Some(payload.into()),
        }
    }
}

/// `group-participants.update` payload as received. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGroupUpdate {
    /// Group id
    #[serde(default)]
    pub id: Option<String>,
    /// Affected participants
    #[serde(default)]
    pub participants: Option<Vec<String>>,
    /// Action name (add, remove, promote, demote)
    #[serde(default)]
    pub action: Option<String>,
}

impl RawGroupUpdate {
    /// Complete update, `None` when any field is missing or empty.
    pub fn validate(&self) -> Option<GroupUpdate> {
        let id = self.id.clone().filter(|s| !s.is_empty())?;
        let participants = self.participants.clone().filter(|p| !p.is_empty())?;
        let action = self.action.as_deref().filter(|s| !s.is_empty())?;
        Some(GroupUpdate {
            id,
            participants,
            action: GroupAction::from(action),
        })
    }
}

/// Group membership change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupAction {
    /// Participants joined or were added
    Add,
    /// Participants left or were removed
    Remove,
    /// Participants became admins
    Promote,
    /// Participants lost admin
    Demote,
    /// Unmapped action
    Other(String),
}

impl From<&str> for GroupAction {
    fn from(action: &str) -> Self {
        match action.to_lowercase().as_str() {
            "add" => Self::Add,
            "remove" => Self::Remove,
            "promote" => Self::Promote,
            "demote" => Self::Demote,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Validated `group-update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdate {
    /// Group id
    pub id: String,
    /// Affected participants
    pub participants: Vec<String>,
    /// What happened
    pub action: GroupAction,
}

/// Event emitted by an engine connection, in network order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Replacement credentials to persist
    CredentialsUpdate(Credentials),
    /// Lifecycle/QR update
    Connection(ConnectionUpdate),
    /// Inbound messages
    MessagesUpsert(RawMessageBatch),
    /// Contact changes
    ContactsUpdate(Vec<Contact>),
    /// Group membership change
    GroupParticipantsUpdate(RawGroupUpdate),
    /// Incoming call offers
    Call(Vec<Value>),
}
