//! Message normalization.
//!
//! Converts one raw `messages.upsert` batch into at most one
//! [`NormalizedMessage`]. Normalization is pure: no network access, no
//! shared state.
//!
//! # Pipeline
//!
//! ```text
//! RawMessageBatch
//!     │ first message
//!     v
//! peel wrappers (ephemeral, view-once, captioned document)
//!     │
//!     v
//! detect tag in CONTENT_PRIORITY order ──none──> known kind?   ──no──> filtered
//!     │                                              │ yes
//!     v                                              v
//! Text | Media | Reaction | SystemNotice        Unsupported
//!     │
//!     v
//! key + sender + timestamp + quoted reference
//! ```
//!
//! "Filtered" (`Ok(None)`) is not an error: protocol housekeeping such as
//! key distribution or history sync notices has nothing to forward.

mod decoder;
pub mod raw;

pub use decoder::{
    decode, detect, unwrap_envelope, ContentTag, Decoded, CONTENT_PRIORITY, MAX_WRAPPER_DEPTH,
    UNSUPPORTED_KINDS,
};
pub use raw::{RawContent, RawMessage, RawMessageBatch, UpsertKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};
use raw::RawContextInfo;

/// Stable message identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    /// Chat the message belongs to
    pub chat_id: String,
    /// Message id, unique within the chat
    pub id: String,
    /// Sent by this account
    pub from_me: bool,
}

impl MessageKey {
    /// Create key
    pub fn new(chat_id: impl Into<String>, id: impl Into<String>, from_me: bool) -> Self {
        Self {
            chat_id: chat_id.into(),
            id: id.into(),
            from_me,
        }
    }
}

/// Kind of media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Image
    Image,
    /// Video
    Video,
    /// Audio or voice note
    Audio,
    /// Document
    Document,
    /// Sticker
    Sticker,
}

/// Pointer to downloadable media. Holds no bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    /// Media kind
    pub kind: MediaKind,
    /// Download URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// CDN path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_path: Option<String>,
    /// MIME type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Decryption key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,
    /// Caption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// File name (documents)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_length: Option<u64>,
    /// Duration in seconds (audio, video)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
}

/// Protocol-level notice (revoke, edit, group stub...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    /// Symbolic notice type
    pub kind: String,
    /// Message the notice applies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<MessageKey>,
    /// Stub parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Canonical content variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Text body
    Text {
        /// Body
        body: String,
    },
    /// Media attachment
    Media(MediaReference),
    /// Reaction to another message
    Reaction {
        /// Message reacted to
        target: MessageKey,
        /// Emoji, empty when withdrawn
        emoji: String,
    },
    /// Protocol notice
    SystemNotice(SystemNotice),
    /// Recognised content with no canonical form
    Unsupported {
        /// Raw field name
        kind: String,
    },
}

impl Content {
    /// Text body or media caption
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { body } => Some(body),
            Self::Media(media) => media.caption.as_deref(),
            _ => None,
        }
    }
}

/// Lightweight pointer to a quoted parent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedReference {
    /// Parent key
    pub key: MessageKey,
    /// Parent sender
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Parent media, downloadable on demand
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaReference>,
}

/// Canonical inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Identity
    pub key: MessageKey,
    /// Author
    pub sender_id: String,
    /// Chat
    pub chat_id: String,
    /// Author's display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Content
    pub content: Content,
    /// Server timestamp
    pub timestamp: DateTime<Utc>,
    /// Replied-to message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted: Option<QuotedReference>,
}

impl NormalizedMessage {
    /// Check if the chat is a group
    pub fn is_group(&self) -> bool {
        self.chat_id.ends_with("@g.us")
    }
}

/// Normalize an upsert batch. Only the first message is considered.
pub fn normalize(batch: &RawMessageBatch, self_id: Option<&str>) -> Result<Option<NormalizedMessage>> {
    if batch.kind == UpsertKind::Unknown {
        return Ok(None);
    }
    match batch.messages.first() {
        Some(message) => normalize_message(message, self_id),
        None => Ok(None),
    }
}

/// Normalize a single envelope.
pub fn normalize_message(
    raw: &RawMessage,
    self_id: Option<&str>,
) -> Result<Option<NormalizedMessage>> {
    // Classify before validating the key so housekeeping with odd keys stays silent
    let chat_hint = raw
        .key
        .as_ref()
        .and_then(|k| k.remote_jid.as_deref())
        .unwrap_or_default();

    let (content, context) = match &raw.message {
        Some(message) => match decode(message, chat_hint) {
            Decoded::Content(content, context) => (content, context),
            Decoded::Filtered => return Ok(None),
        },
        None => match stub_notice(raw) {
            Some(notice) => (Content::SystemNotice(notice), None),
            None => return Ok(None),
        },
    };

    let key = extract_key(raw)?;
    let sender_id = resolve_sender(raw, &key, self_id);
    let quoted = context.and_then(|ctx| quoted_reference(ctx, &key.chat_id, self_id));
    let timestamp = raw
        .message_timestamp
        .as_ref()
        .and_then(raw::RawNumber::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default();

    Ok(Some(NormalizedMessage {
        chat_id: key.chat_id.clone(),
        key,
        sender_id,
        push_name: raw.push_name.clone(),
        content,
        timestamp,
        quoted,
    }))
}

fn extract_key(raw: &RawMessage) -> Result<MessageKey> {
    let key = raw
        .key
        .as_ref()
        .ok_or_else(|| SessionError::InvalidMessage("Message missing key".to_string()))?;
    let chat_id = key
        .remote_jid
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SessionError::InvalidMessage("Key missing remoteJid".to_string()))?;
    let id = key
        .id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SessionError::InvalidMessage("Key missing id".to_string()))?;
    Ok(MessageKey {
        chat_id,
        id,
        from_me: key.from_me.unwrap_or(false),
    })
}

fn resolve_sender(raw: &RawMessage, key: &MessageKey, self_id: Option<&str>) -> String {
    raw.key
        .as_ref()
        .and_then(|k| k.participant.clone())
        .or_else(|| raw.participant.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| key.from_me.then(|| self_id.map(str::to_string)).flatten())
        .unwrap_or_else(|| key.chat_id.clone())
}

fn quoted_reference(
    context: &RawContextInfo,
    chat_id: &str,
    self_id: Option<&str>,
) -> Option<QuotedReference> {
    let id = context.stanza_id.clone().filter(|s| !s.is_empty())?;
    let sender_id = context.participant.clone();
    let from_me = match (sender_id.as_deref(), self_id) {
        (Some(sender), Some(me)) => same_account(sender, me),
        _ => false,
    };
    Some(QuotedReference {
        key: MessageKey {
            chat_id: context
                .remote_jid
                .clone()
                .unwrap_or_else(|| chat_id.to_string()),
            id,
            from_me,
        },
        sender_id,
        media: context.quoted_message.as_deref().and_then(decoder::media_of),
    })
}

/// Account part of an id: `628:12@s.net` and `628@s.net` both give `628`.
fn account_user(id: &str) -> &str {
    let end = id.find([':', '@']).unwrap_or(id.len());
    &id[..end]
}

fn same_account(a: &str, b: &str) -> bool {
    let user = account_user(a);
    !user.is_empty() && user == account_user(b)
}

fn stub_notice(raw: &RawMessage) -> Option<SystemNotice> {
    let kind = match raw.message_stub_type.as_ref()? {
        Value::String(s) => s.to_uppercase(),
        Value::Number(n) => format!("STUB_{n}"),
        _ => return None,
    };
    Some(SystemNotice {
        kind,
        target: None,
        parameters: raw.message_stub_parameters.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(json: &str) -> RawMessageBatch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_plain_text() {
        let b = batch(
            r#"{"type":"notify","messages":[{
                "key":{"remoteJid":"628@s.net","id":"ABC","fromMe":false},
                "message":{"conversation":"hello"},
                "messageTimestamp":1700000000,
                "pushName":"Ana"
            }]}"#,
        );
        let msg = normalize(&b, None).unwrap().unwrap();
        assert_eq!(msg.key, MessageKey::new("628@s.net", "ABC", false));
        assert_eq!(msg.sender_id, "628@s.net");
        assert_eq!(msg.content.text(), Some("hello"));
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(msg.push_name.as_deref(), Some("Ana"));
        assert!(msg.quoted.is_none());
    }

    #[test]
    fn test_group_sender_from_participant() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"g1@g.us","id":"X","participant":"bob@s.net"},
                "message":{"extendedTextMessage":{"text":"hey"}}
            }]}"#,
        );
        let msg = normalize(&b, None).unwrap().unwrap();
        assert!(msg.is_group());
        assert_eq!(msg.sender_id, "bob@s.net");
    }

    #[test]
    fn test_from_me_sender_is_self() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"628@s.net","id":"X","fromMe":true},
                "message":{"conversation":"sent"}
            }]}"#,
        );
        let msg = normalize(&b, Some("bot@s.net")).unwrap().unwrap();
        assert_eq!(msg.sender_id, "bot@s.net");
        assert!(msg.key.from_me);
    }

    #[test]
    fn test_key_is_envelope_independent() {
        let direct = batch(
            r#"{"messages":[{"key":{"remoteJid":"c@s.net","id":"M1"},"message":{"conversation":"a"}}]}"#,
        );
        let wrapped = batch(
            r#"{"messages":[{"key":{"remoteJid":"c@s.net","id":"M1"},
                "message":{"ephemeralMessage":{"message":{"extendedTextMessage":{"text":"a"}}}}}]}"#,
        );
        let a = normalize(&direct, None).unwrap().unwrap();
        let b = normalize(&wrapped, None).unwrap().unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a.content, b.content);
    }

    #[test]
    fn test_quoted_reference_without_fetch() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"chatX","id":"reply1"},
                "message":{"extendedTextMessage":{"text":"agreed","contextInfo":{
                    "stanzaId":"msg1","participant":"ana@s.net",
                    "quotedMessage":{"conversation":"lunch?"}
                }}}
            }]}"#,
        );
        let msg = normalize(&b, None).unwrap().unwrap();
        let quoted = msg.quoted.unwrap();
        assert_eq!(quoted.key.chat_id, "chatX");
        assert_eq!(quoted.key.id, "msg1");
        assert_eq!(quoted.sender_id.as_deref(), Some("ana@s.net"));
        assert!(quoted.media.is_none());
    }

    #[test]
    fn test_quoted_own_message_ignores_device_suffix() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"g@g.us","id":"r3","participant":"ana@s.net"},
                "message":{"extendedTextMessage":{"text":"yes","contextInfo":{
                    "stanzaId":"mine1","participant":"628111@s.net",
                    "quotedMessage":{"conversation":"who is in?"}
                }}}
            }]}"#,
        );
        let quoted = normalize(&b, Some("628111:12@s.net"))
            .unwrap()
            .unwrap()
            .quoted
            .unwrap();
        assert!(quoted.key.from_me);

        let other = normalize(&b, Some("628222:3@s.net")).unwrap().unwrap();
        assert!(!other.quoted.unwrap().key.from_me);
    }

    #[test]
    fn test_same_account() {
        assert!(same_account("628:12@s.net", "628@s.net"));
        assert!(same_account("628@s.net", "628@s.net"));
        assert!(!same_account("628@s.net", "6281@s.net"));
        assert!(!same_account("@s.net", "@s.net"));
    }

    #[test]
    fn test_quoted_media_reference() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"chatX","id":"r2"},
                "message":{"extendedTextMessage":{"text":"nice","contextInfo":{
                    "stanzaId":"img1",
                    "quotedMessage":{"imageMessage":{"url":"https://cdn/x","mimetype":"image/jpeg"}}
                }}}
            }]}"#,
        );
        let quoted = normalize(&b, None).unwrap().unwrap().quoted.unwrap();
        let media = quoted.media.unwrap();
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.url.as_deref(), Some("https://cdn/x"));
    }

    #[test]
    fn test_media_with_caption() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"c","id":"i"},
                "message":{"imageMessage":{"caption":"look","fileLength":"2048","mimetype":"image/png"}}
            }]}"#,
        );
        let msg = normalize(&b, None).unwrap().unwrap();
        match &msg.content {
            Content::Media(media) => {
                assert_eq!(media.file_length, Some(2048));
                assert_eq!(media.caption.as_deref(), Some("look"));
            },
            other => panic!("expected media, got {other:?}"),
        }
    }

    #[test]
    fn test_reaction() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"c","id":"r"},
                "message":{"reactionMessage":{"key":{"id":"target","fromMe":true},"text":"🔥"}}
            }]}"#,
        );
        let msg = normalize(&b, None).unwrap().unwrap();
        assert_eq!(
            msg.content,
            Content::Reaction {
                target: MessageKey::new("c", "target", true),
                emoji: "🔥".to_string()
            }
        );
    }

    #[test]
    fn test_stub_notice() {
        let b = batch(
            r#"{"messages":[{
                "key":{"remoteJid":"g@g.us","id":"s"},
                "messageStubType":27,
                "messageStubParameters":["new@s.net"]
            }]}"#,
        );
        let msg = normalize(&b, None).unwrap().unwrap();
        match msg.content {
            Content::SystemNotice(notice) => {
                assert_eq!(notice.kind, "STUB_27");
                assert_eq!(notice.parameters, vec!["new@s.net".to_string()]);
            },
            other => panic!("expected notice, got {other:?}"),
        }
    }

    #[test]
    fn test_filtered_cases() {
        let empty = batch(r#"{"messages":[]}"#);
        assert!(normalize(&empty, None).unwrap().is_none());

        let no_content = batch(r#"{"messages":[{"key":{"remoteJid":"c","id":"x"}}]}"#);
        assert!(normalize(&no_content, None).unwrap().is_none());

        let history = batch(
            r#"{"messages":[{"key":{"remoteJid":"c","id":"x"},"message":{"protocolMessage":{"type":5}}}]}"#,
        );
        assert!(normalize(&history, None).unwrap().is_none());

        let unknown_kind = batch(
            r#"{"type":"history","messages":[{"key":{"remoteJid":"c","id":"x"},"message":{"conversation":"old"}}]}"#,
        );
        assert!(normalize(&unknown_kind, None).unwrap().is_none());
    }

    #[test]
    fn test_missing_key_is_error() {
        let b = batch(r#"{"messages":[{"key":{"id":"x"},"message":{"conversation":"hi"}}]}"#);
        assert!(matches!(
            normalize(&b, None),
            Err(SessionError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_normalized_json_shape() {
        let b = batch(
            r#"{"messages":[{"key":{"remoteJid":"c","id":"x"},"message":{"conversation":"hi"}}]}"#,
        );
        let msg = normalize(&b, None).unwrap().unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"]["type"], "text");
        assert_eq!(json["content"]["body"], "hi");
    }
}
