//! Disconnect reason codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why the network closed a connection.
///
/// | Code | Reason                | Slug                   |
/// |------|-----------------------|------------------------|
/// | 401  | `LoggedOut`           | `logged-out`           |
/// | 403  | `Forbidden`           | `forbidden`            |
/// | 408  | `ConnectionLost`      | `network-lost`         |
/// | 411  | `MultideviceMismatch` | `multidevice-mismatch` |
/// | 428  | `ConnectionClosed`    | `connection-closed`    |
/// | 440  | `ConnectionReplaced`  | `connection-replaced`  |
/// | 500  | `BadSession`          | `bad-session`          |
/// | 503  | `UnavailableService`  | `unavailable-service`  |
/// | 515  | `RestartRequired`     | `restart-required`     |
///
/// Only `LoggedOut` is terminal; every other reason is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum DisconnectReason {
    /// Account unlinked from another device
    LoggedOut,
    /// Access denied
    Forbidden,
    /// Network dropped or timed out
    ConnectionLost,
    /// Device list out of sync
    MultideviceMismatch,
    /// Socket closed (also used when opening fails)
    ConnectionClosed,
    /// Another client took over the session
    ConnectionReplaced,
    /// Corrupt session state
    BadSession,
    /// Service temporarily unavailable
    UnavailableService,
    /// Server asked for a restart
    RestartRequired,
    /// Unmapped code
    Other(u16),
}

impl DisconnectReason {
    /// Map a numeric status code
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            403 => Self::Forbidden,
            408 => Self::ConnectionLost,
            411 => Self::MultideviceMismatch,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            503 => Self::UnavailableService,
            515 => Self::RestartRequired,
            other => Self::Other(other),
        }
    }

    /// Numeric status code
    pub fn code(&self) -> u16 {
        match self {
            Self::LoggedOut => 401,
            Self::Forbidden => 403,
            Self::ConnectionLost => 408,
            Self::MultideviceMismatch => 411,
            Self::ConnectionClosed => 428,
            Self::ConnectionReplaced => 440,
            Self::BadSession => 500,
            Self::UnavailableService => 503,
            Self::RestartRequired => 515,
            Self::Other(code) => *code,
        }
    }

    /// Short name for logs
    pub fn slug(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged-out",
            Self::Forbidden => "forbidden",
            Self::ConnectionLost => "network-lost",
            Self::MultideviceMismatch => "multidevice-mismatch",
            Self::ConnectionClosed => "connection-closed",
            Self::ConnectionReplaced => "connection-replaced",
            Self::BadSession => "bad-session",
            Self::UnavailableService => "unavailable-service",
            Self::RestartRequired => "restart-required",
            Self::Other(_) => "other",
        }
    }

    /// The session was revoked; reconnecting cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl From<u16> for DisconnectReason {
    fn from(code: u16) -> Self {
        Self::from_code(code)
    }
}

impl From<DisconnectReason> for u16 {
    fn from(reason: DisconnectReason) -> Self {
        reason.code()
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.slug(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip_for_known_reasons() {
        for code in [401, 403, 408, 411, 428, 440, 500, 503, 515] {
            assert_eq!(DisconnectReason::from_code(code).code(), code);
            assert_ne!(DisconnectReason::from_code(code).slug(), "other");
        }
        assert_eq!(DisconnectReason::from_code(499), DisconnectReason::Other(499));
    }

    #[test]
    fn test_only_logout_is_terminal() {
        assert!(DisconnectReason::LoggedOut.is_terminal());
        assert!(!DisconnectReason::ConnectionLost.is_terminal());
        assert!(!DisconnectReason::ConnectionReplaced.is_terminal());
        assert!(!DisconnectReason::Other(401 + 1).is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DisconnectReason::ConnectionLost.to_string(),
            "network-lost (408)"
        );
    }

    #[test]
    fn test_serde_as_code() {
        assert_eq!(serde_json::to_string(&DisconnectReason::LoggedOut).unwrap(), "401");
        let r: DisconnectReason = serde_json::from_str("515").unwrap();
        assert_eq!(r, DisconnectReason::RestartRequired);
    }
}
