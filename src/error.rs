//! Chatwire error types.
//!
//! Only [`SessionError::Config`] is surfaced to callers of
//! [`SessionRegistry::start`](crate::registry::SessionRegistry::start) as a hard
//! failure. Every other variant is produced by a collaborator (engine, store,
//! normalizer, listener) and is logged and absorbed by the session driver.

use thiserror::Error;

/// Chatwire errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Invalid session or file configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// The protocol engine failed an operation.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Loading or persisting credentials failed.
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// A raw inbound event could not be decoded.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// An event bus listener rejected a payload.
    #[error("Listener error: {0}")]
    Listener(String),

    /// The named session is not registered.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for chatwire operations
pub type Result<T> = std::result::Result<T, SessionError>;

impl From<toml::de::Error> for SessionError {
    fn from(err: toml::de::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}

impl From<base64::DecodeError> for SessionError {
    fn from(err: base64::DecodeError) -> Self {
        SessionError::Credentials(format!("Base64 decode error: {err}"))
    }
}

impl From<tempfile::PersistError> for SessionError {
    fn from(err: tempfile::PersistError) -> Self {
        SessionError::Credentials(format!("Atomic replace failed: {}", err.error))
    }
}
