//! Transport Layer
//!
//! Abstraction over the chat socket:
//! - `WebSocket`: the production full-duplex text socket
//! - `InProcess`: direct channels (embedded peer, deterministic tests)
//!
//! # Design Philosophy
//!
//! The transport layer only moves text frames and reports how a connection
//! ended. Lifecycle, retries and stream framing live in
//! [`crate::connection`] and [`crate::streaming`].

pub mod in_process;
pub mod traits;
pub mod websocket;

// Re-exports for convenience
pub use in_process::{InProcessConnector, InProcessServer, PeerLink, PendingOpen};
pub use traits::{
    CloseInfo, Connector, Link, LinkEvent, Outbound, TransportError, NORMAL_CLOSE_CODE,
};
pub use websocket::{validate_endpoint, WebSocketConnector};
