//! Session lifecycle.
//!
//! Each named session is driven by a [`ConnectionStateMachine`] running on its
//! own task:
//!
//! ```text
//!            start()
//!  [Idle] ───────────> [Connecting] <────────────────────┐
//!                          │                              │
//!         ┌────────────────┼─────────────────┐            │ backoff
//!         │ qr event       │ unregistered +  │            │ (not logged out)
//!         v                │ pairing mode    │            │
//!   [AwaitingQr]           v                 │            │
//!         │        [AwaitingPairing]         │ registered │
//!         │                │                 │            │
//!         └───────> [Open] <─────────────────┘            │
//!                     │                                   │
//!                     │ close / stream end / connect err  │
//!                     v                                   │
//!                  [Closed] ──────────────────────────────┘
//!                     │
//!                     │ logged out
//!                     v
//!                  (driver exits)
//! ```
//!
//! Credentials reported by the engine are saved before the next engine event
//! is looked at, so a `connected` listener always sees them on disk.

mod config;
mod handle;
mod machine;
mod pairing;
mod state;

pub use config::{
    ConnectionMode, SessionConfig, Timings, DEFAULT_PAIRING_SETTLE_DELAY,
    DEFAULT_RECONNECT_BACKOFF,
};
pub use handle::SessionHandle;
pub use machine::{ConnectionStateMachine, SessionContext};
pub use pairing::{
    format_pairing_code, AuthPrompt, LogPrompt, PairingCode, PairingRequest, PAIRING_CODE_LEN,
};
pub use state::ConnectionState;
