//! Client Errors
//!
//! Every failure inside the core is recoverable and surfaces as an `error`
//! event carrying a [`ClientError`]. The type is `Clone` so one event can fan
//! out to many subscribers.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;
use crate::transport::TransportError;

/// Errors reported through the event bus and the handle API
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Transport could not be opened (bad endpoint, refused, rejected)
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Handshake did not complete within the ceiling
    #[error("Connection timeout after {}ms", .0.as_millis())]
    HandshakeTimeout(Duration),

    /// Error on an established connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame could not be handed to the transport
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The outbound queue is at its bound; the message was not queued
    #[error("Outbound queue full ({limit} messages)")]
    QueueFull {
        /// Configured bound
        limit: usize,
    },

    /// Queued messages exceeded their maximum age and were dropped
    #[error("Dropped {dropped} queued message(s) older than {}s", .max_age.as_secs())]
    QueueExpired {
        /// How many messages were dropped
        dropped: usize,
        /// Configured maximum age
        max_age: Duration,
    },

    /// The manager's driver task is no longer running
    #[error("Connection manager stopped")]
    ManagerStopped,

    /// A wait for a connection state did not finish in time
    #[error("Timed out waiting for state {0}")]
    WaitTimedOut(ConnectionState),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidEndpoint { .. } => Self::ConnectFailed(err.to_string()),
            TransportError::ConnectionFailed(msg) => Self::ConnectFailed(msg),
            TransportError::ConnectionClosed => Self::SendFailed(err.to_string()),
        }
    }
}
