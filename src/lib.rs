//! # Chatwire - Chat Network Session Manager
//!
//! Keeps named bot sessions on a multi-device chat network connected,
//! authenticated, and talking to the rest of the application through a typed
//! event bus.
//!
//! ## Features
//!
//! - **Connection lifecycle**: QR or pairing-code authentication, credential
//!   persistence, automatic reconnect with a fixed backoff
//! - **Message normalization**: raw deeply nested upserts become flat
//!   [`NormalizedMessage`] records with a single content tag
//! - **Typed event bus**: `message`, `connected`, `disconnected`, `call`,
//!   `group-update`, `contacts-update`
//! - **Session registry**: one driver (and one socket) per session name
//!
//! The wire protocol itself is out of scope; an engine is plugged in through
//! [`ProtocolEngine`].
//!
//! ### Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────────────┐
//!  SessionConfig ──> │ SessionRegistry                          │
//!                    │   name → ConnectionStateMachine (task)   │
//!                    └───────┬───────────────┬──────────────────┘
//!                            │ connect       │ save / load
//!                            v               v
//!                   ┌────────────────┐  ┌─────────────────┐
//!                   │ ProtocolEngine │  │ CredentialStore │
//!                   └───────┬────────┘  └─────────────────┘
//!                           │ EngineEvent
//!                           v
//!                   normalize() ──> EventBus ──> listeners
//! ```
//!
//! ### Disconnect Reasons
//!
//! | Reason              | Code | Reconnect |
//! |---------------------|------|-----------|
//! | LoggedOut           | 401  | no        |
//! | ConnectionLost      | 408  | yes       |
//! | ConnectionClosed    | 428  | yes       |
//! | ConnectionReplaced  | 440  | yes       |
//! | RestartRequired     | 515  | yes       |
//! | any other           | -    | yes       |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chatwire::{EventBus, FileCredentialStore, SessionConfig, SessionRegistry};
//! use chatwire::bus::MessageReceived;
//!
//! let bus = EventBus::new();
//! bus.subscribe::<MessageReceived, _>(|event| {
//!     println!("[{}] {:?}", event.session, event.content.text());
//!     Ok(())
//! });
//!
//! let registry = SessionRegistry::new(
//!     Arc::new(my_engine),
//!     Arc::new(FileCredentialStore::new("./sessions")),
//!     bus,
//! );
//! registry.start(SessionConfig::pairing("work", "628123456789")).await?;
//! ```

pub mod bus;
pub mod config;
pub mod contacts;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use bus::{Delivery, Event, EventBus, SubscriptionId, Topic};
pub use config::Config;
pub use contacts::{Contact, ContactBook};
pub use engine::{
    ChannelEngine, DisconnectReason, EngineConnection, EngineEvent, EngineSocket, ProtocolEngine,
};
pub use error::{Result, SessionError};
pub use normalize::{normalize, Content, MessageKey, NormalizedMessage, QuotedReference};
pub use registry::SessionRegistry;
pub use session::{
    AuthPrompt, ConnectionMode, ConnectionState, ConnectionStateMachine, PairingCode,
    SessionConfig, SessionHandle, Timings,
};
pub use store::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
