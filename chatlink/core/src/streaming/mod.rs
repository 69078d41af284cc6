//! Stream Framing
//!
//! The server streams a bot response as a sequence of raw text frames and
//! terminates it with a reserved sentinel frame:
//!
//! ```text
//!   "Hel"  ──►  Started  { "Hel" }
//!   "lo"   ──►  Progress { "Hello" }
//!   "[STREAM_END]"  ──►  Completed { Message(bot, "Hello") }
//! ```
//!
//! Only one stream is ever in flight. If the connection drops before the
//! sentinel, the partial text is discarded and an `Aborted` signal is
//! produced instead of a message.

mod assembler;

pub use assembler::{InboundFragment, StreamAssembler, StreamSignal, STREAM_END_SENTINEL};
