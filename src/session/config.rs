//! Per-session startup configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::store::is_valid_session_name;

/// Settle delay before requesting a pairing code.
pub const DEFAULT_PAIRING_SETTLE_DELAY: Duration = Duration::from_millis(4000);

/// Fixed delay between a disconnect and the next startup attempt.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(3000);

/// How a fresh session authenticates with the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConnectionMode {
    /// Scan a QR payload from an already-linked device (default)
    #[default]
    Qr,
    /// Enter an 8-character pairing code on the phone
    Pairing,
}

impl ConnectionMode {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::Pairing => "pairing",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConnectionMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "qr" => Ok(Self::Qr),
            "pairing" | "pair" | "code" => Ok(Self::Pairing),
            other => Err(SessionError::Config(format!(
                "Unknown connection mode: {other} (use qr or pairing)"
            ))),
        }
    }
}

impl TryFrom<String> for ConnectionMode {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ConnectionMode> for String {
    fn from(mode: ConnectionMode) -> Self {
        mode.name().to_string()
    }
}

/// Startup configuration for one named session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Unique session key; also names the credential container
    pub session_name: String,
    /// Authentication flow for unregistered credentials
    pub connection_mode: ConnectionMode,
    /// Bot phone number, required in pairing mode
    pub pairing_phone_number: Option<String>,
    /// Send read receipts for every delivered message
    pub auto_acknowledge_reads: bool,
}

impl SessionConfig {
    /// QR-mode session with read receipts enabled.
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            connection_mode: ConnectionMode::Qr,
            pairing_phone_number: None,
            auto_acknowledge_reads: true,
        }
    }

    /// Pairing-mode session for the given phone number.
    pub fn pairing(session_name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            connection_mode: ConnectionMode::Pairing,
            pairing_phone_number: Some(phone_number.into()),
            ..Self::new(session_name)
        }
    }

    /// Set connection mode
    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    /// Set pairing phone number
    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.pairing_phone_number = Some(phone_number.into());
        self
    }

    /// Enable or disable automatic read receipts
    pub fn with_auto_acknowledge_reads(mut self, enabled: bool) -> Self {
        self.auto_acknowledge_reads = enabled;
        self
    }

    /// Trimmed phone number, `None` when absent or blank.
    pub fn phone_number(&self) -> Option<&str> {
        self.pairing_phone_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Reject configurations that cannot start.
    pub fn validate(&self) -> Result<()> {
        if self.session_name.trim().is_empty() {
            return Err(SessionError::Config(
                "Session name must not be empty".to_string(),
            ));
        }
        if !is_valid_session_name(&self.session_name) {
            return Err(SessionError::Config(format!(
                "Session name {:?} must be a single path component",
                self.session_name
            )));
        }
        if self.connection_mode == ConnectionMode::Pairing && self.phone_number().is_none() {
            return Err(SessionError::Config(format!(
                "Session {}: phone number is required for pairing mode",
                self.session_name
            )));
        }
        Ok(())
    }
}

/// Fixed delays used by the session driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait after opening the socket before requesting a pairing code
    pub pairing_settle_delay: Duration,
    /// Wait after a disconnect before re-running startup
    pub reconnect_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            pairing_settle_delay: DEFAULT_PAIRING_SETTLE_DELAY,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

impl Timings {
    /// Set pairing settle delay
    pub fn with_pairing_settle_delay(mut self, delay: Duration) -> Self {
        self.pairing_settle_delay = delay;
        self
    }

    /// Set reconnect backoff
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("qr".parse::<ConnectionMode>().unwrap(), ConnectionMode::Qr);
        assert_eq!(
            "Pairing".parse::<ConnectionMode>().unwrap(),
            ConnectionMode::Pairing
        );
        assert_eq!(
            " PAIRING ".parse::<ConnectionMode>().unwrap(),
            ConnectionMode::Pairing
        );
        assert!("bluetooth".parse::<ConnectionMode>().is_err());
    }

    #[test]
    fn test_pairing_requires_phone() {
        let config = SessionConfig::new("work").with_mode(ConnectionMode::Pairing);
        assert!(matches!(config.validate(), Err(SessionError::Config(_))));

        let blank = SessionConfig::pairing("work", "   ");
        assert!(blank.validate().is_err());

        let ok = SessionConfig::pairing("work", " 628123456789 ");
        assert!(ok.validate().is_ok());
        assert_eq!(ok.phone_number(), Some("628123456789"));
    }

    #[test]
    fn test_qr_mode_ignores_phone() {
        let config = SessionConfig::new("work");
        assert!(config.validate().is_ok());
        assert!(config.auto_acknowledge_reads);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(SessionConfig::new("  ").validate().is_err());
    }

    #[test]
    fn test_path_like_name_rejected() {
        for name in [".", "..", "team/work", "team\\work", "nul\0"] {
            assert!(
                matches!(SessionConfig::new(name).validate(), Err(SessionError::Config(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(SessionConfig::new("team-work.2").validate().is_ok());
    }

    #[test]
    fn test_default_timings() {
        let timings = Timings::default();
        assert_eq!(timings.pairing_settle_delay, Duration::from_secs(4));
        assert_eq!(timings.reconnect_backoff, Duration::from_secs(3));
    }
}
