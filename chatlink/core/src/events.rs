//! Event Bus
//!
//! Typed publish/subscribe between the connection core and its UI consumer.
//!
//! Subscribers register per [`EventKind`] and are invoked synchronously, in
//! registration order, on the driver task that emits the event. A panic in
//! one subscriber is caught and logged; the remaining subscribers still run
//! and the emitter never sees it.
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::new();
//! let id = bus.on(EventKind::Reconnecting, |event| {
//!     if let ChatEvent::Reconnecting { attempt, delay } = event {
//!         println!("retry {attempt} in {delay:?}");
//!     }
//! });
//! bus.off(EventKind::Reconnecting, id);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::connection::ConnectionState;
use crate::error::ClientError;
use crate::messages::{Message, MessageId};

/// Events from the connection core to the UI
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    // ============================================
    // Connection Events
    // ============================================
    /// Connection state changed
    StateChange(ConnectionState),

    /// Transport opened and handshake completed
    Connected {
        /// Endpoint that was connected
        endpoint: String,
    },

    /// Transport closed
    Disconnected {
        /// Whether the close handshake completed
        clean: bool,
        /// Close code, if any
        code: Option<u16>,
        /// Close reason (may be empty)
        reason: String,
    },

    /// A retry has been scheduled
    Reconnecting {
        /// 1-indexed attempt number
        attempt: u32,
        /// Delay before the attempt
        delay: Duration,
    },

    /// Automatic retries are exhausted
    MaxReconnectAttemptsReached {
        /// The attempt cap that was reached
        attempts: u32,
    },

    /// A recoverable failure occurred
    Error(ClientError),

    // ============================================
    // Conversation Events
    // ============================================
    /// A complete message (user echo or finished bot response)
    Message(Message),

    /// First fragment of a bot response arrived
    StreamStarted {
        /// Text of the first fragment
        text: String,
    },

    /// Another fragment arrived
    StreamProgress {
        /// Cumulative text so far
        text: String,
    },

    /// The bot response finished; follows its `Message`
    StreamEnd {
        /// ID of the finalized message
        message_id: MessageId,
        /// Data fragments received
        fragments: u32,
        /// Time from first fragment to sentinel
        duration: Duration,
    },

    /// A partial response was discarded because the connection dropped
    StreamAborted {
        /// Bytes discarded
        partial_len: usize,
        /// Fragments discarded
        fragments: u32,
    },
}

impl ChatEvent {
    /// The discriminant used for subscriptions
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChange(_) => EventKind::StateChange,
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::MaxReconnectAttemptsReached { .. } => EventKind::MaxReconnectAttemptsReached,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
            Self::StreamStarted { .. } => EventKind::StreamStarted,
            Self::StreamProgress { .. } => EventKind::StreamProgress,
            Self::StreamEnd { .. } => EventKind::StreamEnd,
            Self::StreamAborted { .. } => EventKind::StreamAborted,
        }
    }
}

/// Event names, without payloads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `stateChange`
    StateChange,
    /// `connected`
    Connected,
    /// `disconnected`
    Disconnected,
    /// `reconnecting`
    Reconnecting,
    /// `maxReconnectAttemptsReached`
    MaxReconnectAttemptsReached,
    /// `error`
    Error,
    /// `message`
    Message,
    /// `streamStarted`
    StreamStarted,
    /// `streamProgress`
    StreamProgress,
    /// `streamEnd`
    StreamEnd,
    /// `streamAborted`
    StreamAborted,
}

impl EventKind {
    /// Wire-style event name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::StateChange => "stateChange",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::MaxReconnectAttemptsReached => "maxReconnectAttemptsReached",
            Self::Error => "error",
            Self::Message => "message",
            Self::StreamStarted => "streamStarted",
            Self::StreamProgress => "streamProgress",
            Self::StreamEnd => "streamEnd",
            Self::StreamAborted => "streamAborted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ChatEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<EventKind, Vec<Subscriber>>,
    forwarders: Vec<mpsc::UnboundedSender<ChatEvent>>,
}

/// Typed publish/subscribe bus
///
/// Cheap to clone; clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<BusInner>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("EventBus")
            .field(
                "subscribers",
                &inner.subscribers.values().map(Vec::len).sum::<usize>(),
            )
            .field("forwarders", &inner.forwarders.len())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind
    ///
    /// The same closure may be registered more than once; each registration
    /// gets its own ID and is invoked separately.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.entry(kind).or_default().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove a registration
    ///
    /// Returns `false` if no such registration exists for `kind`.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        let Some(list) = inner.subscribers.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|s| s.id == id) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Receive every event on a channel
    ///
    /// The forwarder is pruned once the receiver is dropped.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().forwarders.push(tx);
        rx
    }

    /// Number of callbacks registered for `kind`
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner.read().subscribers.get(&kind).map_or(0, Vec::len)
    }

    /// Drop every callback and channel subscriber
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.subscribers.clear();
        inner.forwarders.clear();
    }

    /// Deliver an event to its subscribers, then to channel subscribers
    ///
    /// Callbacks run without the table lock held, so they may call `on`
    /// and `off` themselves. Returns how many callbacks completed normally.
    pub fn emit(&self, event: &ChatEvent) -> usize {
        let kind = event.kind();
        let callbacks: Vec<(SubscriptionId, Callback)> = self
            .inner
            .read()
            .subscribers
            .get(&kind)
            .map(|list| {
                list.iter()
                    .map(|s| (s.id, Arc::clone(&s.callback)))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| (*callback)(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(event = %kind, subscription = id.0, "Event subscriber panicked");
                }
            }
        }

        let mut inner = self.inner.write();
        inner.forwarders.retain(|tx| tx.send(event.clone()).is_ok());

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&ChatEvent) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |tag: &str| {
            let log = Arc::clone(&log_clone);
            let tag = tag.to_string();
            Box::new(move |_: &ChatEvent| log.lock().push(tag.clone()))
                as Box<dyn Fn(&ChatEvent) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn test_insertion_order_and_duplicates() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.on(EventKind::Connected, make("a"));
        bus.on(EventKind::Connected, make("b"));
        bus.on(EventKind::Connected, make("a"));

        let delivered = bus.emit(&ChatEvent::Connected {
            endpoint: "ws://x".into(),
        });
        assert_eq!(delivered, 3);
        assert_eq!(*log.lock(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_off_removes_only_that_registration() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        let first = bus.on(EventKind::Error, make("x"));
        bus.on(EventKind::Error, make("x"));

        assert!(bus.off(EventKind::Error, first));
        assert!(!bus.off(EventKind::Error, first));
        assert_eq!(bus.subscriber_count(EventKind::Error), 1);

        bus.emit(&ChatEvent::Error(ClientError::ManagerStopped));
        assert_eq!(*log.lock(), vec!["x"]);
    }

    #[test]
    fn test_only_matching_kind_is_invoked() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.on(EventKind::Message, make("message"));

        bus.emit(&ChatEvent::StateChange(ConnectionState::Connecting));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.on(EventKind::StateChange, make("before"));
        bus.on(EventKind::StateChange, |_| panic!("subscriber bug"));
        bus.on(EventKind::StateChange, make("after"));

        let delivered = bus.emit(&ChatEvent::StateChange(ConnectionState::Connected));
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock(), vec!["before", "after"]);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let bus_clone = bus.clone();
        let slot_clone = Arc::clone(&slot);
        let id = bus.on(EventKind::Connected, move |_| {
            if let Some(id) = *slot_clone.lock() {
                bus_clone.off(EventKind::Connected, id);
            }
        });
        *slot.lock() = Some(id);

        bus.emit(&ChatEvent::Connected {
            endpoint: "ws://x".into(),
        });
        assert_eq!(bus.subscriber_count(EventKind::Connected), 0);
    }

    #[tokio::test]
    async fn test_channel_subscriber_receives_everything() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(&ChatEvent::StateChange(ConnectionState::Connecting));
        bus.emit(&ChatEvent::MaxReconnectAttemptsReached { attempts: 5 });

        assert_eq!(
            rx.recv().await,
            Some(ChatEvent::StateChange(ConnectionState::Connecting))
        );
        assert_eq!(
            rx.recv().await,
            Some(ChatEvent::MaxReconnectAttemptsReached { attempts: 5 })
        );
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        bus.emit(&ChatEvent::StateChange(ConnectionState::Disconnected));
        assert_eq!(bus.inner.read().forwarders.len(), 0);
    }

    #[test]
    fn test_clear() {
        let bus = EventBus::new();
        bus.on(EventKind::Message, |_| {});
        let _rx = bus.subscribe();
        bus.clear();
        assert_eq!(bus.subscriber_count(EventKind::Message), 0);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::StateChange.to_string(), "stateChange");
        assert_eq!(
            EventKind::MaxReconnectAttemptsReached.to_string(),
            "maxReconnectAttemptsReached"
        );
        assert_eq!(
            ChatEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .kind(),
            EventKind::Reconnecting
        );
    }
}
