//! Raw inbound payloads as emitted by the protocol engine.
//!
//! The shapes mirror the network's JSON encoding (camelCase, every field
//! optional). Unknown content fields are kept in [`RawContent::other`] so the
//! decoder can tell unsupported content apart from empty housekeeping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of message upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// New message delivered live
    #[default]
    Notify,
    /// Message appended from another device or history
    Append,
    /// Anything else
    #[serde(other)]
    Unknown,
}

/// One `messages.upsert` batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessageBatch {
    /// Messages in delivery order
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    /// Upsert kind
    #[serde(rename = "type", default)]
    pub kind: UpsertKind,
}

impl RawMessageBatch {
    /// Live batch holding a single message.
    pub fn notify(message: RawMessage) -> Self {
        Self {
            messages: vec![message],
            kind: UpsertKind::Notify,
        }
    }
}

/// Message envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Addressing key
    #[serde(default)]
    pub key: Option<RawKey>,
    /// Content payload, absent for stubs
    #[serde(default)]
    pub message: Option<RawContent>,
    /// Unix seconds
    #[serde(default)]
    pub message_timestamp: Option<RawNumber>,
    /// Sender's display name
    #[serde(default)]
    pub push_name: Option<String>,
    /// Group sender when not carried in the key
    #[serde(default)]
    pub participant: Option<String>,
    /// Stub type for content-less notifications
    #[serde(default)]
    pub message_stub_type: Option<Value>,
    /// Stub parameters
    #[serde(default)]
    pub message_stub_parameters: Option<Vec<String>>,
}

/// Addressing key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawKey {
    /// Chat id
    #[serde(default)]
    pub remote_jid: Option<String>,
    /// Message id
    #[serde(default)]
    pub id: Option<String>,
    /// Sent by this account
    #[serde(default)]
    pub from_me: Option<bool>,
    /// Group sender
    #[serde(default)]
    pub participant: Option<String>,
}

/// Numeric field that may arrive as a number, a string, or a split 64-bit long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    /// Plain JSON number
    Int(i64),
    /// Decimal string
    Text(String),
    /// `{ low, high }` long
    Long {
        /// Low 32 bits
        low: i64,
        /// High 32 bits
        #[serde(default)]
        high: i64,
    },
}

impl RawNumber {
    /// Numeric value, `None` for unparseable text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Long { low, high } => Some((high << 32) | (low & 0xFFFF_FFFF)),
        }
    }
}

/// Content payload. Several fields may be populated at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContent {
    /// Plain text
    #[serde(default)]
    pub conversation: Option<String>,
    /// Text with context (replies, links)
    #[serde(default)]
    pub extended_text_message: Option<RawExtendedText>,
    /// Image
    #[serde(default)]
    pub image_message: Option<RawMedia>,
    /// Video
    #[serde(default)]
    pub video_message: Option<RawMedia>,
    /// Audio / voice note
    #[serde(default)]
    pub audio_message: Option<RawMedia>,
    /// Document
    #[serde(default)]
    pub document_message: Option<RawMedia>,
    /// Sticker
    #[serde(default)]
    pub sticker_message: Option<RawMedia>,
    /// Reaction to another message
    #[serde(default)]
    pub reaction_message: Option<RawReaction>,
    /// Protocol notice (revoke, edit, history sync...)
    #[serde(default)]
    pub protocol_message: Option<RawProtocol>,
    /// Disappearing-message wrapper
    #[serde(default)]
    pub ephemeral_message: Option<Box<RawWrapper>>,
    /// View-once wrapper
    #[serde(default)]
    pub view_once_message: Option<Box<RawWrapper>>,
    /// View-once wrapper, second revision
    #[serde(default)]
    pub view_once_message_v2: Option<Box<RawWrapper>>,
    /// Captioned document wrapper
    #[serde(default)]
    pub document_with_caption_message: Option<Box<RawWrapper>>,
    /// Group key distribution, housekeeping
    #[serde(default)]
    pub sender_key_distribution_message: Option<Value>,
    /// Device metadata, housekeeping
    #[serde(default)]
    pub message_context_info: Option<Value>,
    /// Fields with no dedicated decoder
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RawContent {
    /// Plain text content.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            conversation: Some(body.into()),
            ..Default::default()
        }
    }

    /// The inner payload of the first populated wrapper.
    pub fn wrapped(&self) -> Option<&RawContent> {
        [
            &self.ephemeral_message,
            &self.view_once_message,
            &self.view_once_message_v2,
            &self.document_with_caption_message,
        ]
        .into_iter()
        .flatten()
        .find_map(|w| w.message.as_ref())
    }
}

/// Envelope wrapping another content payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawWrapper {
    /// Wrapped content
    #[serde(default)]
    pub message: Option<RawContent>,
}

/// Extended text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExtendedText {
    /// Body
    #[serde(default)]
    pub text: Option<String>,
    /// Reply context
    #[serde(default)]
    pub context_info: Option<RawContextInfo>,
}

/// Media attachment metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMedia {
    /// Download URL
    #[serde(default)]
    pub url: Option<String>,
    /// CDN path
    #[serde(default)]
    pub direct_path: Option<String>,
    /// MIME type
    #[serde(default)]
    pub mimetype: Option<String>,
    /// Decryption key (base64)
    #[serde(default)]
    pub media_key: Option<String>,
    /// Caption
    #[serde(default)]
    pub caption: Option<String>,
    /// Document file name
    #[serde(default)]
    pub file_name: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub file_length: Option<RawNumber>,
    /// Duration for audio/video
    #[serde(default)]
    pub seconds: Option<u32>,
    /// Reply context
    #[serde(default)]
    pub context_info: Option<RawContextInfo>,
}

/// Reaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReaction {
    /// Message reacted to
    #[serde(default)]
    pub key: Option<RawKey>,
    /// Emoji, empty when the reaction is withdrawn
    #[serde(default)]
    pub text: Option<String>,
}

/// Protocol message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProtocol {
    /// Numeric or symbolic protocol type
    #[serde(rename = "type", default)]
    pub kind: Option<Value>,
    /// Message the notice applies to
    #[serde(default)]
    pub key: Option<RawKey>,
}

/// Reply context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContextInfo {
    /// Quoted message id
    #[serde(default)]
    pub stanza_id: Option<String>,
    /// Quoted message sender
    #[serde(default)]
    pub participant: Option<String>,
    /// Quoted message chat, when different from the reply's
    #[serde(default)]
    pub remote_jid: Option<String>,
    /// Copy of the quoted content
    #[serde(default)]
    pub quoted_message: Option<Box<RawContent>>,
}
