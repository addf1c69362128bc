//! Content variant decoder.
//!
//! A payload can carry several populated fields at once (a caption-less image
//! with a stray `conversation`, a text with a reaction echo). The winner is
//! decided by [`CONTENT_PRIORITY`], not by field order in the payload.

use serde_json::Value;

use super::raw::{RawContent, RawContextInfo, RawKey, RawMedia, RawProtocol};
use super::{Content, MediaKind, MediaReference, MessageKey, SystemNotice};

/// Wrappers are peeled at most this many levels deep.
pub const MAX_WRAPPER_DEPTH: usize = 4;

/// Families of representable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTag {
    /// `conversation`, `extendedTextMessage`
    Text,
    /// image, video, audio, document, sticker
    Media,
    /// `reactionMessage`
    Reaction,
    /// `protocolMessage` other than housekeeping
    SystemNotice,
}

/// Detection order. The first tag whose fields are populated wins.
pub const CONTENT_PRIORITY: [ContentTag; 4] = [
    ContentTag::Text,
    ContentTag::Media,
    ContentTag::Reaction,
    ContentTag::SystemNotice,
];

/// Protocol message types that carry no user-visible meaning.
const HOUSEKEEPING_PROTOCOL_TYPES: &[&str] = &[
    "HISTORY_SYNC_NOTIFICATION",
    "APP_STATE_SYNC_KEY_SHARE",
    "APP_STATE_SYNC_KEY_REQUEST",
    "INITIAL_SECURITY_NOTIFICATION_SETTING_SYNC",
    "APP_STATE_FATAL_EXCEPTION_NOTIFICATION",
    "SHARE_PHONE_NUMBER",
    "PEER_DATA_OPERATION_REQUEST_MESSAGE",
    "PEER_DATA_OPERATION_REQUEST_RESPONSE_MESSAGE",
];

/// Known payload fields with no representation beyond [`Content::Unsupported`].
pub const UNSUPPORTED_KINDS: &[&str] = &[
    "pollCreationMessage",
    "pollCreationMessageV2",
    "pollCreationMessageV3",
    "pollUpdateMessage",
    "contactMessage",
    "contactsArrayMessage",
    "locationMessage",
    "liveLocationMessage",
    "listMessage",
    "listResponseMessage",
    "buttonsMessage",
    "buttonsResponseMessage",
    "templateMessage",
    "templateButtonReplyMessage",
    "groupInviteMessage",
    "productMessage",
    "orderMessage",
    "eventMessage",
    "ptvMessage",
];

/// Outcome of decoding one content payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<'a> {
    /// Representable content and the reply context it carried
    Content(Content, Option<&'a RawContextInfo>),
    /// Nothing to forward
    Filtered,
}

/// Innermost payload after peeling wrappers.
pub fn unwrap_envelope(content: &RawContent) -> &RawContent {
    let mut current = content;
    for _ in 0..MAX_WRAPPER_DEPTH {
        match current.wrapped() {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// First tag in priority order whose fields are populated.
pub fn detect(content: &RawContent) -> Option<ContentTag> {
    CONTENT_PRIORITY
        .into_iter()
        .find(|tag| matches_tag(*tag, content))
}

fn matches_tag(tag: ContentTag, content: &RawContent) -> bool {
    match tag {
        ContentTag::Text => {
            content.conversation.is_some()
                || content
                    .extended_text_message
                    .as_ref()
                    .is_some_and(|t| t.text.is_some())
        },
        ContentTag::Media => first_media(content).is_some(),
        ContentTag::Reaction => content.reaction_message.is_some(),
        ContentTag::SystemNotice => content
            .protocol_message
            .as_ref()
            .is_some_and(|p| !is_housekeeping(p)),
    }
}

fn first_media(content: &RawContent) -> Option<(MediaKind, &RawMedia)> {
    [
        (MediaKind::Image, &content.image_message),
        (MediaKind::Video, &content.video_message),
        (MediaKind::Audio, &content.audio_message),
        (MediaKind::Document, &content.document_message),
        (MediaKind::Sticker, &content.sticker_message),
    ]
    .into_iter()
    .find_map(|(kind, media)| media.as_ref().map(|m| (kind, m)))
}

/// Symbolic name of a protocol message type.
pub fn protocol_kind_name(protocol: &RawProtocol) -> String {
    match &protocol.kind {
        Some(Value::String(s)) => s.to_uppercase(),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => "REVOKE".to_string(),
            Some(3) => "EPHEMERAL_SETTING".to_string(),
            Some(4) => "EPHEMERAL_SYNC_RESPONSE".to_string(),
            Some(5) => "HISTORY_SYNC_NOTIFICATION".to_string(),
            Some(6) => "APP_STATE_SYNC_KEY_SHARE".to_string(),
            Some(7) => "APP_STATE_SYNC_KEY_REQUEST".to_string(),
            Some(9) => "INITIAL_SECURITY_NOTIFICATION_SETTING_SYNC".to_string(),
            Some(10) => "APP_STATE_FATAL_EXCEPTION_NOTIFICATION".to_string(),
            Some(11) => "SHARE_PHONE_NUMBER".to_string(),
            Some(14) => "MESSAGE_EDIT".to_string(),
            Some(16) => "PEER_DATA_OPERATION_REQUEST_MESSAGE".to_string(),
            Some(17) => "PEER_DATA_OPERATION_REQUEST_RESPONSE_MESSAGE".to_string(),
            _ => format!("PROTOCOL_{n}"),
        },
        _ => "UNKNOWN".to_string(),
    }
}

fn is_housekeeping(protocol: &RawProtocol) -> bool {
    HOUSEKEEPING_PROTOCOL_TYPES.contains(&protocol_kind_name(protocol).as_str())
}

/// Decode content. `chat_id` fills in keys that omit their chat.
pub fn decode<'a>(content: &'a RawContent, chat_id: &str) -> Decoded<'a> {
    let content = unwrap_envelope(content);

    let Some(tag) = detect(content) else {
        // Only known kinds are surfaced; anything else is not representable
        return match content
            .other
            .keys()
            .find(|key| UNSUPPORTED_KINDS.contains(&key.as_str()))
        {
            Some(kind) => Decoded::Content(
                Content::Unsupported {
                    kind: kind.clone(),
                },
                None,
            ),
            None => Decoded::Filtered,
        };
    };

    match tag {
        ContentTag::Text => {
            let extended = content.extended_text_message.as_ref();
            let body = content
                .conversation
                .clone()
                .or_else(|| extended.and_then(|t| t.text.clone()))
                .unwrap_or_default();
            Decoded::Content(
                Content::Text { body },
                extended.and_then(|t| t.context_info.as_ref()),
            )
        },
        ContentTag::Media => match first_media(content) {
            Some((kind, media)) => Decoded::Content(
                Content::Media(media_reference(kind, media)),
                media.context_info.as_ref(),
            ),
            None => Decoded::Filtered,
        },
        ContentTag::Reaction => {
            let Some(reaction) = content.reaction_message.as_ref() else {
                return Decoded::Filtered;
            };
            let Some(target) = reaction
                .key
                .as_ref()
                .and_then(|k| key_with_default_chat(k, chat_id))
            else {
                return Decoded::Filtered;
            };
            Decoded::Content(
                Content::Reaction {
                    target,
                    emoji: reaction.text.clone().unwrap_or_default(),
                },
                None,
            )
        },
        ContentTag::SystemNotice => {
            let Some(protocol) = content.protocol_message.as_ref() else {
                return Decoded::Filtered;
            };
            Decoded::Content(
                Content::SystemNotice(SystemNotice {
                    kind: protocol_kind_name(protocol),
                    target: protocol
                        .key
                        .as_ref()
                        .and_then(|k| key_with_default_chat(k, chat_id)),
                    parameters: Vec::new(),
                }),
                None,
            )
        },
    }
}

/// Media reference for a payload, used for quoted media as well.
pub fn media_of(content: &RawContent) -> Option<MediaReference> {
    let content = unwrap_envelope(content);
    first_media(content).map(|(kind, media)| media_reference(kind, media))
}

fn media_reference(kind: MediaKind, media: &RawMedia) -> MediaReference {
    MediaReference {
        kind,
        url: media.url.clone(),
        direct_path: media.direct_path.clone(),
        mimetype: media.mimetype.clone(),
        media_key: media.media_key.clone(),
        caption: media.caption.clone(),
        file_name: media.file_name.clone(),
        file_length: media
            .file_length
            .as_ref()
            .and_then(super::raw::RawNumber::as_i64)
            .and_then(|n| u64::try_from(n).ok()),
        seconds: media.seconds,
    }
}

fn key_with_default_chat(key: &RawKey, chat_id: &str) -> Option<MessageKey> {
    Some(MessageKey {
        chat_id: key
            .remote_jid
            .clone()
            .unwrap_or_else(|| chat_id.to_string()),
        id: key.id.clone()?,
        from_me: key.from_me.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(json: &str) -> RawContent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_priority_order_is_policy() {
        assert_eq!(CONTENT_PRIORITY[0], ContentTag::Text);
        assert_eq!(CONTENT_PRIORITY[3], ContentTag::SystemNotice);
    }

    #[test]
    fn test_text_beats_media() {
        let c = content(r#"{"conversation":"hi","imageMessage":{"mimetype":"image/jpeg"}}"#);
        assert_eq!(detect(&c), Some(ContentTag::Text));
    }

    #[test]
    fn test_media_beats_reaction() {
        let c = content(
            r#"{"reactionMessage":{"key":{"id":"m1"},"text":"👍"},"stickerMessage":{}}"#,
        );
        assert_eq!(detect(&c), Some(ContentTag::Media));
    }

    #[test]
    fn test_reaction_beats_notice() {
        let c = content(
            r#"{"protocolMessage":{"type":0,"key":{"id":"m1"}},"reactionMessage":{"key":{"id":"m1"}}}"#,
        );
        assert_eq!(detect(&c), Some(ContentTag::Reaction));
    }

    #[test]
    fn test_housekeeping_protocol_is_not_a_notice() {
        let c = content(r#"{"protocolMessage":{"type":5}}"#);
        assert_eq!(detect(&c), None);
        assert_eq!(decode(&c, "chat"), Decoded::Filtered);

        let named = content(r#"{"protocolMessage":{"type":"APP_STATE_SYNC_KEY_SHARE"}}"#);
        assert_eq!(decode(&named, "chat"), Decoded::Filtered);
    }

    #[test]
    fn test_revoke_is_notice() {
        let c = content(r#"{"protocolMessage":{"type":0,"key":{"id":"gone"}}}"#);
        match decode(&c, "chat@g.us") {
            Decoded::Content(Content::SystemNotice(notice), None) => {
                assert_eq!(notice.kind, "REVOKE");
                assert_eq!(notice.target.unwrap().chat_id, "chat@g.us");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sender_key_only_is_filtered() {
        let c = content(r#"{"senderKeyDistributionMessage":{"groupId":"g"},"messageContextInfo":{}}"#);
        assert_eq!(decode(&c, "chat"), Decoded::Filtered);
    }

    #[test]
    fn test_unknown_field_is_unsupported() {
        let c = content(r#"{"pollCreationMessage":{"name":"lunch?"},"messageContextInfo":{}}"#);
        assert_eq!(
            decode(&c, "chat"),
            Decoded::Content(
                Content::Unsupported {
                    kind: "pollCreationMessage".to_string()
                },
                None
            )
        );
    }

    #[test]
    fn test_unrecognised_field_is_filtered() {
        let c = content(r#"{"someFutureMessage":{"x":1}}"#);
        assert_eq!(detect(&c), None);
        assert_eq!(decode(&c, "chat"), Decoded::Filtered);
    }

    #[test]
    fn test_wrappers_are_peeled() {
        let c = content(
            r#"{"viewOnceMessageV2":{"message":{"ephemeralMessage":{"message":{"imageMessage":{"caption":"x"}}}}}}"#,
        );
        assert_eq!(detect(unwrap_envelope(&c)), Some(ContentTag::Media));
    }

    #[test]
    fn test_reaction_without_target_is_filtered() {
        let c = content(r#"{"reactionMessage":{"text":"👍"}}"#);
        assert_eq!(decode(&c, "chat"), Decoded::Filtered);
    }
}
