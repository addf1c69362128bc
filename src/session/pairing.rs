//! Pairing codes and the auth prompt sink.

use std::fmt;

use crate::error::{Result, SessionError};

/// Raw pairing code length.
pub const PAIRING_CODE_LEN: usize = 8;

/// Validated 8-character pairing code, displayed as `XXXX-XXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairingCode(String);

impl PairingCode {
    /// Validate a raw code from the engine.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.len() != PAIRING_CODE_LEN || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionError::Engine(format!(
                "Pairing code must be {PAIRING_CODE_LEN} alphanumeric characters, got {raw:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Code as returned by the network
    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Code split after the fourth character
    pub fn formatted(&self) -> String {
        let (head, tail) = self.0.split_at(PAIRING_CODE_LEN / 2);
        format!("{head}-{tail}")
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// Format a raw code, e.g. `"ABCD1234"` → `"ABCD-1234"`.
pub fn format_pairing_code(raw: &str) -> Result<String> {
    PairingCode::parse(raw).map(|c| c.formatted())
}

/// A code issued for a phone number during the pairing handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    /// Number being linked
    pub phone_number: String,
    /// Code to enter on the phone
    pub code: PairingCode,
}

/// Receives authentication material that a human must act on.
///
/// QR payloads are passed through unmodified; rendering is up to the sink.
pub trait AuthPrompt: Send + Sync {
    /// A fresh QR payload to display.
    fn qr(&self, session: &str, payload: &str);

    /// A pairing code to enter on the phone.
    fn pairing_code(&self, session: &str, request: &PairingRequest);
}

/// Writes prompts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPrompt;

impl AuthPrompt for LogPrompt {
    fn qr(&self, session: &str, payload: &str) {
        tracing::info!(session, qr = payload, "scan the QR code with the phone app");
    }

    fn pairing_code(&self, session: &str, request: &PairingRequest) {
        tracing::info!(
            session,
            phone = %request.phone_number,
            code = %request.code,
            "enter the pairing code on the phone"
        );
    }
}
