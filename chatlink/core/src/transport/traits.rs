//! Transport Traits
//!
//! Core definitions for the client side of the chat socket.
//!
//! A [`Connector`] knows how to open a connection to an endpoint. An open
//! connection is represented by a [`Link`]: a pair of channels feeding a
//! writer task and draining a reader task. The connection manager is the
//! only owner of a `Link`; nothing else writes to or closes the socket.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Close code sent on a normal, user-initiated close
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Errors that can occur during transport operations
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint could not be parsed or uses an unsupported scheme
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// Connection to peer failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection was closed
    #[error("Connection closed")]
    ConnectionClosed,
}

/// A frame or control request travelling from the client to the peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Raw UTF-8 chat text, sent verbatim
    Text(String),
    /// Transport-level ping with an opaque payload
    Ping(Vec<u8>),
    /// Close the connection with a close handshake
    Close {
        /// Close code (1000 = normal)
        code: u16,
        /// Human readable reason
        reason: String,
    },
}

/// How a connection ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo {
    /// Whether the close handshake completed
    pub clean: bool,
    /// Close code, when the peer sent one
    pub code: Option<u16>,
    /// Close reason (may be empty)
    pub reason: String,
}

impl CloseInfo {
    /// A clean close with a code and reason
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            clean: true,
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// An unclean close (connection dropped, error, missing close frame)
    pub fn unclean(reason: impl Into<String>) -> Self {
        Self {
            clean: false,
            code: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.clean { "clean" } else { "unclean" };
        match self.code {
            Some(code) => write!(f, "{kind} close ({code}) {}", self.reason),
            None => write!(f, "{kind} close {}", self.reason),
        }
    }
}

/// Something the reader task observed on the connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// An inbound text frame
    Frame(String),
    /// A transport error; usually followed by an unclean `Closed`
    Error(String),
    /// The connection ended. No further events follow.
    Closed(CloseInfo),
}

/// An open connection
///
/// Dropping the `Link` drops the writer's channel, which ends the writer
/// task and with it the socket.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    /// Assemble a link from the writer's sender and the reader's receiver
    #[must_use]
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a text frame for the writer
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the writer task has already exited.
    pub fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Queue a transport ping
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the writer task has already exited.
    pub fn ping(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Ping(payload))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Ask the writer to perform a close handshake and consume the link
    pub fn close(self, code: u16, reason: &str) {
        // The writer may already be gone; either way the link is finished.
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Wait for the next event from the reader
    ///
    /// Returns `None` once the reader has exited.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.inbound.recv().await
    }
}

/// Opens connections to an endpoint
///
/// Implementations must not block: `open` resolves when the transport
/// handshake completes or fails.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `endpoint`
    async fn open(&self, endpoint: &str) -> Result<Link, TransportError>;
}
