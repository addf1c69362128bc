//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`CHATWIRE_*`)
//! - CLI arguments (for the `chatwire` binary)

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::session::{
    ConnectionMode, SessionConfig, Timings, DEFAULT_PAIRING_SETTLE_DELAY,
    DEFAULT_RECONNECT_BACKOFF,
};

/// Overrides the credential root directory
pub const ENV_STORE_ROOT: &str = "CHATWIRE_STORE_ROOT";
/// Overrides the reconnect backoff, in milliseconds
pub const ENV_RECONNECT_BACKOFF_MS: &str = "CHATWIRE_RECONNECT_BACKOFF_MS";
/// Overrides the pairing settle delay, in milliseconds
pub const ENV_PAIRING_SETTLE_MS: &str = "CHATWIRE_PAIRING_SETTLE_MS";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Credential storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Driver delays
    #[serde(default)]
    pub timings: TimingsConfig,

    /// Sessions to start
    #[serde(default)]
    pub sessions: Vec<SessionSpec>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SessionError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup. Unparseable numbers are ignored.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(root) = lookup(ENV_STORE_ROOT) {
            config.store.root = PathBuf::from(root);
        }
        if let Some(ms) = lookup(ENV_RECONNECT_BACKOFF_MS).and_then(|v| v.trim().parse().ok()) {
            config.timings.reconnect_backoff_ms = ms;
        }
        if let Some(ms) = lookup(ENV_PAIRING_SETTLE_MS).and_then(|v| v.trim().parse().ok()) {
            config.timings.pairing_settle_ms = ms;
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let store_default = StoreConfig::default();
        let timings_default = TimingsConfig::default();
        Self {
            store: StoreConfig {
                root: if other.store.root != store_default.root {
                    other.store.root
                } else {
                    self.store.root
                },
            },
            timings: TimingsConfig {
                pairing_settle_ms: if other.timings.pairing_settle_ms
                    != timings_default.pairing_settle_ms
                {
                    other.timings.pairing_settle_ms
                } else {
                    self.timings.pairing_settle_ms
                },
                reconnect_backoff_ms: if other.timings.reconnect_backoff_ms
                    != timings_default.reconnect_backoff_ms
                {
                    other.timings.reconnect_backoff_ms
                } else {
                    self.timings.reconnect_backoff_ms
                },
            },
            sessions: if other.sessions.is_empty() {
                self.sessions
            } else {
                other.sessions
            },
        }
    }

    /// Check every session and reject duplicate names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for config in self.session_configs() {
            config.validate()?;
            if !seen.insert(config.session_name.clone()) {
                return Err(SessionError::Config(format!(
                    "Duplicate session name: {}",
                    config.session_name
                )));
            }
        }
        Ok(())
    }

    /// Session startup configs, in file order
    pub fn session_configs(&self) -> Vec<SessionConfig> {
        self.sessions.iter().map(SessionSpec::to_session_config).collect()
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one subdirectory per session
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

/// `<data dir>/chatwire/sessions`, or `./sessions` when no data dir is known.
pub fn default_store_root() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("chatwire").join("sessions"))
        .unwrap_or_else(|| PathBuf::from("sessions"))
}

/// Driver delay configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingsConfig {
    /// Wait before requesting a pairing code
    pub pairing_settle_ms: u64,

    /// Wait between a disconnect and the next attempt
    pub reconnect_backoff_ms: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            pairing_settle_ms: DEFAULT_PAIRING_SETTLE_DELAY.as_millis() as u64,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF.as_millis() as u64,
        }
    }
}

impl From<TimingsConfig> for Timings {
    fn from(config: TimingsConfig) -> Self {
        Timings::default()
            .with_pairing_settle_delay(Duration::from_millis(config.pairing_settle_ms))
            .with_reconnect_backoff(Duration::from_millis(config.reconnect_backoff_ms))
    }
}

/// One `[[sessions]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    /// Session name
    pub name: String,

    /// `qr` or `pairing`
    #[serde(default)]
    pub mode: ConnectionMode,

    /// Phone number for pairing mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Send read receipts automatically
    #[serde(default = "default_true")]
    pub auto_acknowledge_reads: bool,
}

fn default_true() -> bool {
    true
}

impl SessionSpec {
    /// Convert to a startup config
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            session_name: self.name.clone(),
            connection_mode: self.mode,
            pairing_phone_number: self.phone_number.clone(),
            auto_acknowledge_reads: self.auto_acknowledge_reads,
        }
    }
}
