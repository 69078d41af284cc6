//! Connection State
//!
//! The three-state lifecycle and the read-only stats snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the single connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport (initial state)
    #[default]
    Disconnected,
    /// Transport open in progress
    Connecting,
    /// Transport open and handshake complete
    Connected,
}

impl ConnectionState {
    /// Human readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot of the manager, published after every state mutation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Current connection state
    pub state: ConnectionState,
    /// Endpoint in use
    pub endpoint: String,
    /// Automatic attempts made since the last successful open
    pub reconnect_attempts: u32,
    /// Backoff of the retry waiting to fire, if any
    pub reconnect_delay_ms: Option<u64>,
    /// Attempt cap
    pub max_reconnect_attempts: u32,
    /// Messages waiting for a connection
    pub queued_messages: usize,
    /// Shorthand for `state == Connected`
    pub is_connected: bool,
    /// Whether a bot response is mid-stream
    pub is_streaming: bool,
}
