//! Connection state.

use std::fmt;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, driver not started
    #[default]
    Idle,
    /// Opening the engine socket
    Connecting,
    /// Waiting for a QR scan
    AwaitingQr,
    /// Waiting for the pairing code to be entered
    AwaitingPairing,
    /// Authenticated and ready
    Open,
    /// Socket closed; a retry may follow
    Closed,
}

impl ConnectionState {
    /// States in which a socket is (or is about to be) live.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::AwaitingQr | Self::AwaitingPairing | Self::Open
        )
    }

    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingQr => "awaiting-qr",
            Self::AwaitingPairing => "awaiting-pairing",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(!ConnectionState::Idle.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::AwaitingQr.is_active());
        assert!(ConnectionState::AwaitingPairing.is_active());
        assert!(ConnectionState::Open.is_active());
        assert!(!ConnectionState::Closed.is_active());
    }
}
