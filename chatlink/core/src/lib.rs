//! Chatlink Core - Resilient Chat Connection Manager
//!
//! This crate keeps a single full-duplex text connection to a chat server
//! alive on behalf of a UI. It is headless: any front end (terminal, web,
//! test harness) drives it through a [`ConnectionManager`] handle and
//! renders what arrives on the [`EventBus`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           UI                                 │
//! │     connect() / send() / disconnect()      on(kind, cb)       │
//! └──────────────┬──────────────────────────────────▲────────────┘
//!                │ Command                          │ ChatEvent
//! ┌──────────────▼──────────────────────────────────┴────────────┐
//! │                    ConnectionManager (driver task)            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────────┐ │
//! │  │  Outbound    │  │  Reconnect   │  │  Stream Assembler   │ │
//! │  │  Queue       │  │  Backoff     │  │  ("[STREAM_END]")   │ │
//! │  └──────────────┘  └──────────────┘  └─────────────────────┘ │
//! └──────────────┬──────────────────────────────────▲────────────┘
//!                │ Outbound                         │ LinkEvent
//! ┌──────────────▼──────────────────────────────────┴────────────┐
//! │              Connector (WebSocket / InProcess)               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use chatlink_core::{load_config, ChatEvent, ConnectionManager, EventKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = ConnectionManager::websocket(load_config()?);
//!
//!     manager.on(EventKind::Message, |event| {
//!         if let ChatEvent::Message(message) = event {
//!             println!("{}: {}", message.origin, message.text);
//!         }
//!     });
//!
//!     manager.connect();
//!     manager.send("Hello").await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: Layered client configuration (defaults, file, env, CLI)
//! - [`connection`]: Lifecycle, queueing and reconnection
//! - [`error`]: Errors surfaced as events
//! - [`events`]: Event types and the subscriber registry
//! - [`messages`]: Chat message records
//! - [`streaming`]: Reassembly of streamed bot responses
//! - [`transport`]: Socket abstraction (WebSocket, in-process)

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod messages;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use connection::{ConnectionManager, ConnectionState, ConnectionStats, ReconnectPolicy};
pub use error::ClientError;
pub use events::{ChatEvent, EventBus, EventKind, SubscriptionId};
pub use messages::{Message, MessageId, MessageOrigin};
pub use streaming::STREAM_END_SENTINEL;

// Transport exports
pub use transport::{
    CloseInfo, Connector, InProcessConnector, InProcessServer, Link, LinkEvent, PeerLink,
    TransportError, WebSocketConnector,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
