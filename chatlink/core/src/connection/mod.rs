//! Connection Lifecycle
//!
//! Owns the single chat connection: opening it, queueing while it is down,
//! retrying with exponential backoff, and turning inbound frames into
//! events.
//!
//! ```text
//!                 connect()
//!   Disconnected ───────────► Connecting
//!        ▲  ▲                    │    │
//!        │  │  error / timeout   │    │ open
//!        │  └────────────────────┘    ▼
//!        │        close / disconnect() Connected
//!        └─────────────────────────────┘
//! ```
//!
//! After an unclean close from `Connected`, or a failed attempt, a retry is
//! scheduled (`1s, 2s, 4s, 8s, 16s` by default). A successful open resets the
//! counter; `disconnect()` cancels everything.

mod manager;
mod queue;
mod reconnect;
mod state;
mod timer;

pub use manager::ConnectionManager;
pub use queue::{OutboundMessage, OutboundQueue, QueueFull};
pub use reconnect::{ReconnectPolicy, ReconnectState};
pub use state::{ConnectionState, ConnectionStats};
pub use timer::ScheduledTask;
