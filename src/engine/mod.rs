//! Protocol engine seam.
//!
//! The wire protocol, encryption, and transport live behind
//! [`ProtocolEngine`]. Chatwire only needs three things from an engine:
//!
//! - open a socket for a session given its credentials
//! - stream raw [`EngineEvent`]s from that socket in network order
//! - a few request primitives on the open socket ([`EngineSocket`])
//!
//! ```text
//! ConnectionStateMachine
//!        │ connect(session, creds)
//!        v
//! ┌──────────────────┐   EngineEvent stream    ┌──────────────┐
//! │  ProtocolEngine  │ ──────────────────────> │ driver loop  │
//! └──────────────────┘                         └──────────────┘
//!        │ EngineSocket
//!        v
//! request_pairing_code / read_messages / download_media / close
//! ```
//!
//! [`ChannelEngine`] is an in-process engine fed through channels, used by the
//! test suite and by embedders that bridge an engine running elsewhere.

pub mod channel;
mod event;
mod reason;

pub use channel::ChannelEngine;
pub use event::{
    ConnectionUpdate, EngineEvent, GroupAction, GroupUpdate, LinkState, RawGroupUpdate,
};
pub use reason::DisconnectReason;

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::normalize::{MediaReference, MessageKey};
use crate::store::Credentials;

/// An open engine socket plus its event stream.
pub struct EngineConnection {
    /// Request primitives
    pub socket: Arc<dyn EngineSocket>,
    /// Raw events; the stream ending means the socket is gone
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Engine capable of opening network sockets.
pub trait ProtocolEngine: Send + Sync {
    /// Open a socket for `session`, authenticated with `credentials`.
    ///
    /// Errors are treated as a disconnect by the caller, not surfaced.
    fn connect<'a>(
        &'a self,
        session: &'a str,
        credentials: Credentials,
    ) -> BoxFuture<'a, Result<EngineConnection>>;

    /// Engine name for logging
    fn name(&self) -> &'static str;
}

/// Request primitives on an open socket.
pub trait EngineSocket: Send + Sync {
    /// Ask the network for a raw 8-character pairing code.
    fn request_pairing_code<'a>(&'a self, phone_number: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Send read receipts.
    fn read_messages<'a>(&'a self, keys: &'a [MessageKey]) -> BoxFuture<'a, Result<()>>;

    /// Fetch and decrypt media bytes.
    fn download_media<'a>(&'a self, media: &'a MediaReference) -> BoxFuture<'a, Result<Bytes>>;

    /// Close the socket. The event stream ends afterwards.
    fn close(&self);
}
