//! Credential persistence.
//!
//! One opaque credential blob per session name. Stores must replace a blob
//! atomically: a reader sees either the previous blob or the new one, never a
//! partial write.
//!
//! | Store                     | Backing                                 |
//! |---------------------------|-----------------------------------------|
//! | [`FileCredentialStore`]   | `<root>/<session>/creds.json`, temp+rename |
//! | [`MemoryCredentialStore`] | process memory (tests, embedders)       |

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

/// Authentication material for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bot number already enrolled on the network
    #[serde(default)]
    pub registered: bool,
    /// Own account id, known once enrolled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<String>,
    /// Opaque engine state
    #[serde(
        default,
        serialize_with = "serialize_blob",
        deserialize_with = "deserialize_blob"
    )]
    pub blob: Vec<u8>,
}

impl Credentials {
    /// Credentials for an enrolled account.
    pub fn registered(me: impl Into<String>, blob: Vec<u8>) -> Self {
        Self {
            registered: true,
            me: Some(me.into()),
            blob,
        }
    }
}

fn serialize_blob<S: Serializer>(blob: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(blob))
}

fn deserialize_blob<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Session names become container names, so they must stay one path component.
pub fn is_valid_session_name(session: &str) -> bool {
    !(session.is_empty()
        || session == "."
        || session == ".."
        || session.contains(['/', '\\'])
        || session.contains('\0'))
}

/// Storage adapter for per-session credentials.
///
/// Calls are synchronous: the session driver awaits nothing between receiving
/// a credential update and the store returning, which keeps persistence ahead
/// of any later lifecycle event.
pub trait CredentialStore: Send + Sync {
    /// Create the session's container. Best-effort; callers log failures.
    fn prepare(&self, session: &str) -> Result<()>;

    /// Load stored credentials, `None` for a session never enrolled.
    fn load(&self, session: &str) -> Result<Option<Credentials>>;

    /// Atomically replace stored credentials.
    fn save(&self, session: &str, credentials: &Credentials) -> Result<()>;

    /// Forget stored credentials (after a logout).
    fn clear(&self, session: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_json_shape() {
        let creds = Credentials::registered("628123@s.net", vec![1, 2, 3]);
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["registered"], true);
        assert_eq!(json["me"], "628123@s.net");
        assert_eq!(json["blob"], "AQID");

        let back: Credentials = serde_json::from_value(json).unwrap();
        assert_eq!(back, creds);
    }

    #[test]
    fn test_credentials_defaults_when_fields_missing() {
        let creds: Credentials = serde_json::from_str("{}").unwrap();
        assert!(!creds.registered);
        assert!(creds.me.is_none());
        assert!(creds.blob.is_empty());
    }

    #[test]
    fn test_bad_blob_rejected() {
        let result: std::result::Result<Credentials, _> =
            serde_json::from_str(r#"{"blob":"not base64!"}"#);
        assert!(result.is_err());
    }
}
