//! Outbound Queue
//!
//! FIFO holding area for messages sent while not connected. Bounded by
//! count (new messages are refused when full) and by age (stale entries are
//! dropped when the queue is flushed).

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// A message waiting for a connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Chat text, sent verbatim
    pub text: String,
    /// When it was queued
    pub enqueued_at: Instant,
}

impl OutboundMessage {
    /// Stamp a message with the current time
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            enqueued_at: Instant::now(),
        }
    }

    /// Time spent in the queue so far
    #[must_use]
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// The queue refused a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueFull {
    /// The configured bound
    pub limit: usize,
}

/// Bounded FIFO of outbound messages
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<OutboundMessage>,
    limit: Option<usize>,
    max_age: Option<Duration>,
}

impl OutboundQueue {
    /// Create a queue; `None` disables the corresponding bound
    #[must_use]
    pub fn new(limit: Option<usize>, max_age: Option<Duration>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
            max_age,
        }
    }

    /// Number of queued messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured age bound
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Append at the tail
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` (and leaves the queue untouched) at the bound.
    pub fn push(&mut self, message: OutboundMessage) -> Result<(), QueueFull> {
        if let Some(limit) = self.limit {
            if self.entries.len() >= limit {
                return Err(QueueFull { limit });
            }
        }
        self.entries.push_back(message);
        Ok(())
    }

    /// Take the head
    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.entries.pop_front()
    }

    /// Put a message back at the head (its transmission failed)
    pub fn requeue_front(&mut self, message: OutboundMessage) {
        self.entries.push_front(message);
    }

    /// Drop entries older than the age bound; returns how many were dropped
    pub fn drop_expired(&mut self) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|m| m.age() <= max_age);
        before - self.entries.len()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
