//! Connection Manager Implementation
//!
//! [`ConnectionManager`] is a cheap, cloneable handle. All state lives in a
//! single driver task that owns the link, the outbound queue, the retry
//! bookkeeping and the stream assembler. Handles talk to it over a command
//! channel; the driver reports back through the [`EventBus`] and a `watch`
//! channel carrying the latest [`ConnectionStats`].
//!
//! The driver wakes up for exactly three reasons: a command from a handle,
//! an event from the open link, or one of its own scheduled tasks (transport
//! open finished, handshake timeout, retry due). It never waits on the
//! network itself.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{ChatEvent, EventBus, EventKind, SubscriptionId};
use crate::messages::Message;
use crate::streaming::{InboundFragment, StreamAssembler, StreamSignal};
use crate::transport::{
    CloseInfo, Connector, Link, LinkEvent, TransportError, WebSocketConnector, NORMAL_CLOSE_CODE,
};

use super::queue::{OutboundMessage, OutboundQueue, QueueFull};
use super::reconnect::ReconnectState;
use super::state::{ConnectionState, ConnectionStats};
use super::timer::ScheduledTask;

/// Close reason sent on a manual disconnect
const USER_CLOSE_REASON: &str = "User initiated disconnect";

/// Characters of outbound text included in log lines
const LOG_PREVIEW_CHARS: usize = 100;

/// Payload of a transport-level health check ping
const PING_PAYLOAD: &[u8] = b"chatlink";

// ============================================================================
// Handle
// ============================================================================

/// Handle to a running connection manager
///
/// Every method returns without waiting on the network. The driver task
/// stops when `shutdown` is called or the last handle is dropped.
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<ConnectionStats>,
    bus: EventBus,
}

impl ConnectionManager {
    /// Spawn a manager driving `connector`
    ///
    /// Must be called from within a tokio runtime. The manager starts
    /// `Disconnected`; call [`connect`](Self::connect) to open the link.
    pub fn spawn<C: Connector>(config: ClientConfig, connector: C) -> Self {
        let bus = EventBus::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let policy = config.reconnect_policy();
        let (stats_tx, stats_rx) = watch::channel(ConnectionStats {
            endpoint: config.endpoint.clone(),
            max_reconnect_attempts: policy.max_attempts,
            ..Default::default()
        });

        let driver = Driver {
            endpoint: config.endpoint.clone(),
            queue: OutboundQueue::new(config.queue_limit(), config.max_queue_age()),
            reconnect: ReconnectState::new(policy),
            config,
            connector: Arc::new(connector),
            state: ConnectionState::Disconnected,
            link: None,
            assembler: StreamAssembler::new(),
            bus: bus.clone(),
            stats_tx,
            internal_tx,
            attempt: 0,
            attempt_origin: ConnectOrigin::Manual,
            opening: None,
            handshake_timer: None,
        };
        tokio::spawn(driver.run(command_rx, internal_rx));

        Self {
            commands: command_tx,
            stats: stats_rx,
            bus,
        }
    }

    /// Spawn a manager using the WebSocket transport
    #[must_use]
    pub fn websocket(config: ClientConfig) -> Self {
        Self::spawn(config, WebSocketConnector::new())
    }

    /// The event bus this manager publishes on
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Register a callback for one event kind
    pub fn on<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, callback)
    }

    /// Remove a callback registration
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.off(kind, id)
    }

    /// Receive every event on a channel
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatEvent> {
        self.bus.subscribe()
    }

    /// Open the connection (no-op while connecting or connected)
    ///
    /// A manual connect from `Disconnected` resets the retry counter.
    pub fn connect(&self) {
        self.command(Command::Connect {
            endpoint: None,
            origin: ConnectOrigin::Manual,
        });
    }

    /// Switch endpoint and connect
    ///
    /// The endpoint only changes while `Disconnected`; otherwise this is
    /// the same no-op as [`connect`](Self::connect).
    pub fn connect_to(&self, endpoint: impl Into<String>) {
        self.command(Command::Connect {
            endpoint: Some(endpoint.into()),
            origin: ConnectOrigin::Manual,
        });
    }

    /// Reset the retry counter, cancel any pending retry, and connect
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Close the connection, drop queued messages, stop retrying
    ///
    /// Always safe to call.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Send chat text
    ///
    /// Returns `true` if the text was handed to an open connection. Empty or
    /// whitespace-only text is rejected. While not connected the text is
    /// queued (and a connect started if `Disconnected`) and `false` is
    /// returned.
    pub async fn send(&self, text: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            text: text.into(),
            reply,
        });
        rx.await.unwrap_or(false)
    }

    /// Send a transport ping; `false` if not connected
    pub async fn ping(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Ping { reply });
        rx.await.unwrap_or(false)
    }

    /// Latest stats snapshot
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.stats.borrow().clone()
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.stats.borrow().state
    }

    /// Whether the connection is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until the manager reaches `target`
    ///
    /// # Errors
    ///
    /// `WaitTimedOut` if `timeout` elapses first, `ManagerStopped` if the
    /// driver exits while waiting.
    pub async fn wait_for_state(
        &self,
        target: ConnectionState,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let mut stats = self.stats.clone();
        let result = match tokio::time::timeout(timeout, stats.wait_for(|s| s.state == target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ClientError::ManagerStopped),
            Err(_) => Err(ClientError::WaitTimedOut(target)),
        };
        result
    }

    /// Disconnect, drop every subscriber, and stop the driver
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Shutdown { reply });
        let _ = rx.await;
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Connection manager already stopped; command dropped");
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Requests from handles
#[derive(Debug)]
enum Command {
    Connect {
        endpoint: Option<String>,
        origin: ConnectOrigin,
    },
    Reconnect,
    Send {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Ping {
        reply: oneshot::Sender<bool>,
    },
    Disconnect,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Completions from the driver's own scheduled tasks
#[derive(Debug)]
enum Internal {
    Opened {
        attempt: u64,
        result: Result<Link, TransportError>,
    },
    HandshakeTimedOut {
        attempt: u64,
    },
    RetryDue {
        generation: u64,
    },
}

/// Who started a connection attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnectOrigin {
    /// `connect()` / `reconnect()`
    Manual,
    /// Backoff timer
    Retry,
    /// `send()` while disconnected
    Send,
}

struct Driver<C> {
    config: ClientConfig,
    connector: Arc<C>,
    endpoint: String,
    state: ConnectionState,
    link: Option<Link>,
    queue: OutboundQueue,
    reconnect: ReconnectState,
    assembler: StreamAssembler,
    bus: EventBus,
    stats_tx: watch::Sender<ConnectionStats>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    /// Identifies the current connection attempt
    attempt: u64,
    attempt_origin: ConnectOrigin,
    /// In-flight transport open
    opening: Option<ScheduledTask>,
    handshake_timer: Option<ScheduledTask>,
}

impl<C: Connector> Driver<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                Some(message) = internal.recv() => self.handle_internal(message),
                event = next_link_event(&mut self.link) => self.handle_link_event(event),
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All connection handles dropped");
                        self.disconnect();
                        break;
                    };
                    if self.handle_command(command).is_break() {
                        break;
                    }
                }
            }
            self.publish_stats();
        }
        tracing::debug!("Connection manager stopped");
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect { endpoint, origin } => {
                if let Some(endpoint) = endpoint {
                    self.set_endpoint(endpoint);
                }
                self.connect(origin);
            }
            Command::Reconnect => {
                self.reconnect.reset();
                self.connect(ConnectOrigin::Manual);
            }
            Command::Send { text, reply } => {
                let sent = self.send(text);
                self.publish_stats();
                let _ = reply.send(sent);
            }
            Command::Ping { reply } => {
                let _ = reply.send(self.ping());
            }
            Command::Disconnect => self.disconnect(),
            Command::Shutdown { reply } => {
                self.disconnect();
                self.bus.clear();
                self.publish_stats();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Opened { attempt, result } => self.on_opened(attempt, result),
            Internal::HandshakeTimedOut { attempt } => self.on_handshake_timeout(attempt),
            Internal::RetryDue { generation } => self.on_retry_due(generation),
        }
    }

    fn handle_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Frame(text)) => self.on_frame(text),
            Some(LinkEvent::Error(error)) => {
                tracing::warn!(error = %error, "Transport error");
                self.emit(ChatEvent::Error(ClientError::Transport(error)));
            }
            Some(LinkEvent::Closed(info)) => self.on_closed(info),
            None => self.on_closed(CloseInfo::unclean("transport ended unexpectedly")),
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    fn set_endpoint(&mut self, endpoint: String) {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(
                requested = %endpoint,
                current = %self.endpoint,
                "Ignoring endpoint change while connection is active"
            );
            return;
        }
        self.endpoint = endpoint;
    }

    fn connect(&mut self, origin: ConnectOrigin) {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(state = %self.state, "Already connected or connecting");
            return;
        }

        match origin {
            ConnectOrigin::Manual => self.reconnect.reset(),
            ConnectOrigin::Retry | ConnectOrigin::Send => self.reconnect.cancel_timer(),
        }

        self.attempt += 1;
        self.attempt_origin = origin;
        let attempt = self.attempt;
        tracing::info!(endpoint = %self.endpoint, ?origin, "Attempting to connect");
        self.set_state(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let tx = self.internal_tx.clone();
        self.opening = Some(ScheduledTask::spawn(async move {
            let result = connector.open(&endpoint).await;
            let _ = tx.send(Internal::Opened { attempt, result });
        }));

        let tx = self.internal_tx.clone();
        self.handshake_timer = Some(ScheduledTask::after(
            self.config.connect_timeout(),
            move || {
                let _ = tx.send(Internal::HandshakeTimedOut { attempt });
            },
        ));
    }

    fn on_opened(&mut self, attempt: u64, result: Result<Link, TransportError>) {
        if attempt != self.attempt || self.state != ConnectionState::Connecting {
            if let Ok(link) = result {
                tracing::debug!(attempt, "Closing link from a superseded attempt");
                link.close(NORMAL_CLOSE_CODE, "superseded");
            }
            return;
        }

        self.opening = None;
        self.handshake_timer = None;

        match result {
            Ok(link) => {
                self.link = Some(link);
                self.reconnect.reset();
                tracing::info!(endpoint = %self.endpoint, "Connected");
                self.set_state(ConnectionState::Connected);
                self.emit(ChatEvent::Connected {
                    endpoint: self.endpoint.clone(),
                });
                self.flush_queue();
            }
            Err(err) => {
                tracing::warn!(endpoint = %self.endpoint, error = %err, "Connection attempt failed");
                self.fail_attempt(err.into());
            }
        }
    }

    fn on_handshake_timeout(&mut self, attempt: u64) {
        if attempt != self.attempt || self.state != ConnectionState::Connecting {
            return;
        }
        let timeout = self.config.connect_timeout();
        tracing::warn!(
            endpoint = %self.endpoint,
            timeout_ms = timeout.as_millis() as u64,
            "Connection timeout"
        );
        self.fail_attempt(ClientError::HandshakeTimeout(timeout));
    }

    /// A `Connecting` attempt failed: report, fall back, maybe retry
    fn fail_attempt(&mut self, error: ClientError) {
        self.opening = None;
        self.handshake_timer = None;

        self.emit(ChatEvent::Error(error));
        self.set_state(ConnectionState::Disconnected);

        if self.attempt_origin == ConnectOrigin::Manual && !self.config.retry_manual_connects {
            tracing::info!("Automatic retry disabled for manual connects");
            return;
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let max = self.reconnect.policy().max_attempts;
        let Some((attempt, delay)) = self.reconnect.next_attempt() else {
            tracing::error!(attempts = max, "Max reconnection attempts reached");
            self.emit(ChatEvent::MaxReconnectAttemptsReached { attempts: max });
            return;
        };

        tracing::info!(
            attempt,
            max,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection"
        );
        let tx = self.internal_tx.clone();
        self.reconnect.arm(move |generation| {
            ScheduledTask::after(delay, move || {
                let _ = tx.send(Internal::RetryDue { generation });
            })
        });
        self.publish_stats();
        self.emit(ChatEvent::Reconnecting { attempt, delay });
    }

    fn on_retry_due(&mut self, generation: u64) {
        if !self.reconnect.fired(generation) {
            tracing::debug!(generation, "Ignoring stale reconnect timer");
            return;
        }
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(state = %self.state, "Skipping reconnect, no longer disconnected");
            return;
        }
        self.connect(ConnectOrigin::Retry);
    }

    fn on_closed(&mut self, info: CloseInfo) {
        self.link = None;
        let was_connected = self.state == ConnectionState::Connected;

        if let Some(signal) = self.assembler.abort() {
            self.emit_stream_signal(signal);
        }

        if info.clean {
            tracing::info!(close = %info, "Connection closed");
        } else {
            tracing::warn!(close = %info, "Connection lost");
        }
        self.emit(ChatEvent::Disconnected {
            clean: info.clean,
            code: info.code,
            reason: info.reason.clone(),
        });
        self.set_state(ConnectionState::Disconnected);

        if !info.clean && was_connected {
            self.schedule_reconnect();
        }
    }

    fn disconnect(&mut self) {
        self.opening = None;
        self.handshake_timer = None;
        self.reconnect.reset();

        if !self.queue.is_empty() {
            tracing::info!(dropped = self.queue.len(), "Discarding queued messages");
            self.queue.clear();
        }

        if let Some(signal) = self.assembler.abort() {
            self.emit_stream_signal(signal);
        }

        if let Some(link) = self.link.take() {
            tracing::info!(endpoint = %self.endpoint, "Disconnecting");
            link.close(NORMAL_CLOSE_CODE, USER_CLOSE_REASON);
            self.emit(ChatEvent::Disconnected {
                clean: true,
                code: Some(NORMAL_CLOSE_CODE),
                reason: USER_CLOSE_REASON.to_string(),
            });
        }

        self.set_state(ConnectionState::Disconnected);
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn send(&mut self, text: String) -> bool {
        if text.trim().is_empty() {
            tracing::warn!("Rejected empty message");
            return false;
        }

        if self.state == ConnectionState::Connected {
            return self.transmit(&text);
        }

        match self.queue.push(OutboundMessage::new(text)) {
            Ok(()) => {
                tracing::debug!(queued = self.queue.len(), "Not connected, message queued");
            }
            Err(QueueFull { limit }) => {
                tracing::warn!(limit, "Outbound queue full, message refused");
                self.emit(ChatEvent::Error(ClientError::QueueFull { limit }));
            }
        }

        if self.state == ConnectionState::Disconnected {
            self.connect(ConnectOrigin::Send);
        }
        false
    }

    /// Hand text to the link; echoes it as a user message on success
    fn transmit(&mut self, text: &str) -> bool {
        let Some(link) = self.link.as_ref() else {
            return false;
        };
        match link.send_text(text) {
            Ok(()) => {
                tracing::debug!(preview = %preview(text), "Message sent");
                self.emit(ChatEvent::Message(Message::user(text)));
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Error sending message");
                self.emit(ChatEvent::Error(err.into()));
                false
            }
        }
    }

    fn flush_queue(&mut self) {
        let dropped = self.queue.drop_expired();
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped expired queued messages");
            if let Some(max_age) = self.queue.max_age() {
                self.emit(ChatEvent::Error(ClientError::QueueExpired { dropped, max_age }));
            }
        }

        let mut flushed = 0usize;
        while self.state == ConnectionState::Connected {
            let Some(message) = self.queue.pop() else {
                break;
            };
            if !self.transmit(&message.text) {
                self.queue.requeue_front(message);
                break;
            }
            flushed += 1;
        }
        if flushed > 0 {
            tracing::info!(flushed, "Flushed queued messages");
        }
    }

    fn ping(&self) -> bool {
        match (self.state, self.link.as_ref()) {
            (ConnectionState::Connected, Some(link)) => link.ping(PING_PAYLOAD.to_vec()).is_ok(),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn on_frame(&mut self, text: String) {
        let fragment = InboundFragment::classify(text, &self.config.stream_end_marker);
        if let Some(signal) = self.assembler.push(fragment) {
            self.emit_stream_signal(signal);
        }
    }

    fn emit_stream_signal(&self, signal: StreamSignal) {
        match signal {
            StreamSignal::Started { text } => self.emit(ChatEvent::StreamStarted { text }),
            StreamSignal::Progress { text } => self.emit(ChatEvent::StreamProgress { text }),
            StreamSignal::Completed {
                message,
                fragments,
                duration,
            } => {
                let message_id = message.id.clone();
                tracing::debug!(
                    message_id = %message_id,
                    fragments,
                    duration_ms = duration.as_millis() as u64,
                    "Stream complete"
                );
                self.emit(ChatEvent::Message(message));
                self.emit(ChatEvent::StreamEnd {
                    message_id,
                    fragments,
                    duration,
                });
            }
            StreamSignal::Aborted {
                partial_len,
                fragments,
            } => self.emit(ChatEvent::StreamAborted {
                partial_len,
                fragments,
            }),
        }
    }

    // ------------------------------------------------------------------
    // State and events
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.publish_stats();
        self.emit(ChatEvent::StateChange(state));
    }

    fn emit(&self, event: ChatEvent) {
        self.bus.emit(&event);
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(ConnectionStats {
            state: self.state,
            endpoint: self.endpoint.clone(),
            reconnect_attempts: self.reconnect.attempts(),
            reconnect_delay_ms: self
                .reconnect
                .pending_delay()
                .map(|delay| delay.as_millis() as u64),
            max_reconnect_attempts: self.reconnect.policy().max_attempts,
            queued_messages: self.queue.len(),
            is_connected: self.state == ConnectionState::Connected,
            is_streaming: self.assembler.is_streaming(),
        });
    }
}

/// Next event from the link, or never if there is none
async fn next_link_event(link: &mut Option<Link>) -> Option<LinkEvent> {
    match link {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

/// Shorten text for log lines
fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(LOG_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
