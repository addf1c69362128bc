//! Live session handle.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use super::pairing::PairingCode;
use crate::contacts::ContactBook;
use crate::engine::EngineSocket;
use crate::error::Result;
use crate::normalize::{MediaReference, MessageKey, NormalizedMessage};

/// Handle to an open session, delivered with `connected`.
///
/// Cheap to clone. It stays bound to the socket it was created for; after a
/// reconnect, a new handle is published and requests through the old one go
/// to a closed socket and fail.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<str>,
    me: Option<String>,
    socket: Arc<dyn EngineSocket>,
    contacts: ContactBook,
}

impl SessionHandle {
    pub(crate) fn new(
        session: &str,
        me: Option<String>,
        socket: Arc<dyn EngineSocket>,
        contacts: ContactBook,
    ) -> Self {
        Self {
            session: Arc::from(session),
            me,
            socket,
            contacts,
        }
    }

    /// Session name
    pub fn session_name(&self) -> &str {
        &self.session
    }

    /// Own account id, once known
    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    /// Underlying engine socket
    pub fn socket(&self) -> &Arc<dyn EngineSocket> {
        &self.socket
    }

    /// Contacts shared by every session in the registry
    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }

    /// Send read receipts for `keys`.
    pub async fn read_messages(&self, keys: &[MessageKey]) -> Result<()> {
        self.socket.read_messages(keys).await
    }

    /// Download the media attached to a message.
    pub async fn download_media(&self, media: &MediaReference) -> Result<Bytes> {
        self.socket.download_media(media).await
    }

    /// Download the media of the message `message` quotes.
    ///
    /// `Ok(None)` when nothing is quoted or the quoted message has no media.
    pub async fn download_quoted_media(&self, message: &NormalizedMessage) -> Result<Option<Bytes>> {
        let Some(media) = message.quoted.as_ref().and_then(|q| q.media.as_ref()) else {
            return Ok(None);
        };
        self.download_media(media).await.map(Some)
    }

    /// Request and validate a pairing code for `phone_number`.
    pub async fn request_pairing_code(&self, phone_number: &str) -> Result<PairingCode> {
        let raw = self.socket.request_pairing_code(phone_number.trim()).await?;
        PairingCode::parse(&raw)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &self.session)
            .field("me", &self.me)
            .finish_non_exhaustive()
    }
}
