//! In-Process Transport
//!
//! Channel-based connector for embedding a chat peer in the same process,
//! and for driving the connection manager deterministically in tests.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut server) = InProcessConnector::new_pair();
//! let manager = ConnectionManager::spawn(config, connector);
//!
//! manager.connect();
//! let pending = server.next_open().await.unwrap();
//! let mut peer = pending.accept();
//!
//! peer.push_text("Hel");
//! peer.push_text("lo");
//! peer.push_text("[STREAM_END]");
//! ```

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::traits::{CloseInfo, Connector, Link, LinkEvent, Outbound, TransportError};

/// Client half: implements [`Connector`] by handing each open to the server half
#[derive(Clone, Debug)]
pub struct InProcessConnector {
    opens: mpsc::UnboundedSender<PendingOpen>,
}

/// Server half: receives open requests and decides their fate
#[derive(Debug)]
pub struct InProcessServer {
    opens: mpsc::UnboundedReceiver<PendingOpen>,
}

impl InProcessConnector {
    /// Create a connected connector/server pair
    #[must_use]
    pub fn new_pair() -> (Self, InProcessServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { opens: tx }, InProcessServer { opens: rx })
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn open(&self, endpoint: &str) -> Result<Link, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.opens
            .send(PendingOpen {
                endpoint: endpoint.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| TransportError::ConnectionFailed("in-process server gone".to_string()))?;

        // If the server drops the request without answering, the open fails.
        reply_rx.await.map_err(|_| {
            TransportError::ConnectionFailed("in-process server dropped the request".to_string())
        })?
    }
}

impl InProcessServer {
    /// Wait for the next open request
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn next_open(&mut self) -> Option<PendingOpen> {
        self.opens.recv().await
    }

    /// Take an open request if one is already waiting
    pub fn try_next_open(&mut self) -> Option<PendingOpen> {
        self.opens.try_recv().ok()
    }
}

/// A connection attempt awaiting the server's decision
///
/// Holding it without answering keeps the client's handshake pending.
#[derive(Debug)]
pub struct PendingOpen {
    endpoint: String,
    reply: oneshot::Sender<Result<Link, TransportError>>,
}

impl PendingOpen {
    /// The endpoint the client asked for
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Complete the handshake, returning the server side of the link
    pub fn accept(self) -> PeerLink {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // A client that already gave up simply drops the link.
        let _ = self.reply.send(Ok(Link::new(outbound_tx, event_rx)));

        PeerLink {
            received: outbound_rx,
            events: event_tx,
        }
    }

    /// Fail the handshake
    pub fn reject(self, reason: impl Into<String>) {
        let _ = self
            .reply
            .send(Err(TransportError::ConnectionFailed(reason.into())));
    }
}

/// Server side of an accepted in-process connection
#[derive(Debug)]
pub struct PeerLink {
    received: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl PeerLink {
    /// Push an inbound text frame to the client
    ///
    /// Returns `false` if the client has dropped the link.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.events.send(LinkEvent::Frame(text.into())).is_ok()
    }

    /// Report a transport error to the client without closing
    pub fn push_error(&self, error: impl Into<String>) -> bool {
        self.events.send(LinkEvent::Error(error.into())).is_ok()
    }

    /// Close the connection with a completed close handshake
    pub fn close_clean(self, code: u16, reason: impl Into<String>) {
        let _ = self
            .events
            .send(LinkEvent::Closed(CloseInfo::clean(code, reason)));
    }

    /// Drop the connection without a close handshake
    pub fn close_unclean(self, reason: impl Into<String>) {
        let _ = self
            .events
            .send(LinkEvent::Closed(CloseInfo::unclean(reason)));
    }

    /// Wait for the next frame or control request the client sent
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.received.recv().await
    }

    /// Collect every text frame the client has sent so far
    pub fn drain_texts(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(outbound) = self.received.try_recv() {
            if let Outbound::Text(text) = outbound {
                texts.push(text);
            }
        }
        texts
    }
}
