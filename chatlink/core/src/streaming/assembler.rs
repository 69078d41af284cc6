//! Stream Assembler Implementation
//!
//! Turns the server's fragment sequence into complete bot messages.

use std::time::Duration;

use tokio::time::Instant;

use crate::messages::Message;

/// Reserved inbound literal marking the end of a streamed response
pub const STREAM_END_SENTINEL: &str = "[STREAM_END]";

/// One inbound frame, classified
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFragment {
    /// A chunk of the response being streamed
    Data(String),
    /// The end-of-stream sentinel
    EndOfStream,
}

impl InboundFragment {
    /// Classify a raw frame against the given sentinel
    ///
    /// Only an exact match is the sentinel; anything else, including
    /// text that merely contains it, is data.
    pub fn classify(frame: String, sentinel: &str) -> Self {
        if frame == sentinel {
            Self::EndOfStream
        } else {
            Self::Data(frame)
        }
    }
}

/// The in-progress concatenation of the current stream
#[derive(Debug)]
struct StreamBuffer {
    text: String,
    fragments: u32,
    started_at: Instant,
}

/// What the assembler wants the UI to know after a fragment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamSignal {
    /// First fragment of a new response
    Started {
        /// Text of the first fragment
        text: String,
    },
    /// A later fragment arrived
    Progress {
        /// Cumulative text so far
        text: String,
    },
    /// The sentinel closed the stream
    Completed {
        /// The finished bot message
        message: Message,
        /// How many data fragments made it up
        fragments: u32,
        /// Time from first fragment to sentinel
        duration: Duration,
    },
    /// The stream was cut off before the sentinel
    Aborted {
        /// Length in bytes of the discarded partial text
        partial_len: usize,
        /// How many fragments were discarded
        fragments: u32,
    },
}

/// Reassembles fragments into messages
///
/// Holds at most one accumulator. Fragments are appended strictly in the
/// order they are pushed.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    buffer: Option<StreamBuffer>,
}

impl StreamAssembler {
    /// Create an idle assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a response is currently being accumulated
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.buffer.is_some()
    }

    /// Text accumulated so far, if streaming
    #[must_use]
    pub fn current_text(&self) -> Option<&str> {
        self.buffer.as_ref().map(|b| b.text.as_str())
    }

    /// Feed one fragment
    ///
    /// Returns `None` only for a sentinel that arrives with no stream open.
    pub fn push(&mut self, fragment: InboundFragment) -> Option<StreamSignal> {
        match fragment {
            InboundFragment::Data(text) => Some(self.append(text)),
            InboundFragment::EndOfStream => {
                let Some(buffer) = self.buffer.take() else {
                    tracing::debug!("Ignoring end-of-stream marker with no active stream");
                    return None;
                };
                Some(StreamSignal::Completed {
                    message: Message::bot(buffer.text),
                    fragments: buffer.fragments,
                    duration: buffer.started_at.elapsed(),
                })
            }
        }
    }

    /// Discard any partial stream (connection lost)
    pub fn abort(&mut self) -> Option<StreamSignal> {
        let buffer = self.buffer.take()?;
        tracing::warn!(
            partial_len = buffer.text.len(),
            fragments = buffer.fragments,
            "Discarding partial stream"
        );
        Some(StreamSignal::Aborted {
            partial_len: buffer.text.len(),
            fragments: buffer.fragments,
        })
    }

    fn append(&mut self, text: String) -> StreamSignal {
        match self.buffer.as_mut() {
            Some(buffer) => {
                buffer.text.push_str(&text);
                buffer.fragments += 1;
                StreamSignal::Progress {
                    text: buffer.text.clone(),
                }
            }
            None => {
                self.buffer = Some(StreamBuffer {
                    text: text.clone(),
                    fragments: 1,
                    started_at: Instant::now(),
                });
                StreamSignal::Started { text }
            }
        }
    }
}
