//! Event rendering
//!
//! Turns [`ChatEvent`]s into terminal text. Streamed bot replies are written
//! incrementally: each progress update prints only what was appended since
//! the previous one, and the finished message just ends the line.

use chatlink_core::{ChatEvent, ConnectionState, MessageOrigin};

/// Stateful renderer for one terminal
#[derive(Debug)]
pub struct Renderer {
    max_attempts: u32,
    /// Bytes of the in-flight stream already printed
    streamed: Option<usize>,
}

impl Renderer {
    /// Create a renderer; `max_attempts` is shown in retry notices
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            streamed: None,
        }
    }

    /// Text to write for `event` (may be empty, may not end in a newline)
    pub fn render(&mut self, event: &ChatEvent) -> String {
        match event {
            ChatEvent::StreamStarted { text } => {
                self.streamed = Some(text.len());
                format!("bot> {text}")
            }
            ChatEvent::StreamProgress { text } => self.render_progress(text),
            ChatEvent::Message(message) => match message.origin {
                MessageOrigin::Bot if self.streamed.take().is_some() => "\n".to_string(),
                MessageOrigin::Bot => format!("bot> {}\n", message.text),
                MessageOrigin::User => format!("you> {}\n", message.text),
                MessageOrigin::System => system(&message.text),
            },
            ChatEvent::StreamAborted { .. } => {
                self.streamed = None;
                format!("\n{}", system("response interrupted"))
            }
            ChatEvent::StreamEnd { .. } => String::new(),

            ChatEvent::StateChange(ConnectionState::Connecting) => system("connecting..."),
            ChatEvent::StateChange(_) => String::new(),
            ChatEvent::Connected { endpoint } => system(&format!("connected to {endpoint}")),
            ChatEvent::Disconnected { clean: true, .. } => system("disconnected"),
            ChatEvent::Disconnected { reason, .. } if reason.is_empty() => {
                system("lost connection")
            }
            ChatEvent::Disconnected { reason, .. } => {
                system(&format!("lost connection ({reason})"))
            }
            ChatEvent::Reconnecting { attempt, delay } => system(&format!(
                "reconnecting in {:.1}s (attempt {attempt}/{})",
                delay.as_secs_f64(),
                self.max_attempts
            )),
            ChatEvent::MaxReconnectAttemptsReached { attempts } => system(&format!(
                "could not reconnect after {attempts} attempts; type /reconnect to try again"
            )),
            ChatEvent::Error(err) => system(&format!("error: {err}")),
        }
    }

    fn render_progress(&mut self, text: &str) -> String {
        let printed = self.streamed.unwrap_or(0);
        self.streamed = Some(text.len());
        match text.get(printed..) {
            Some(suffix) => suffix.to_string(),
            // Not a continuation of what we printed; start a fresh line
            None => format!("\nbot> {text}"),
        }
    }
}

/// A system notice on its own line
pub fn system(text: &str) -> String {
    format!("[system] {text}\n")
}

/// Notice for a chat line, given the queue length around the send
///
/// Only a line that landed in the offline queue gets one. Refusals and
/// transmit failures arrive as their own error event.
pub fn send_notice(sent: bool, queued_before: usize, queued_after: usize) -> String {
    if !sent && queued_after > queued_before {
        system("not connected; message queued")
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chatlink_core::{ClientError, Message, MessageId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stream_prints_only_new_suffix() {
        let mut renderer = Renderer::new(5);
        let out: String = [
            ChatEvent::StreamStarted {
                text: "Hel".into(),
            },
            ChatEvent::StreamProgress {
                text: "Hello".into(),
            },
            ChatEvent::StreamProgress {
                text: "Hello, wörld".into(),
            },
            ChatEvent::Message(Message::bot("Hello, wörld")),
            ChatEvent::StreamEnd {
                message_id: MessageId::new(),
                fragments: 3,
                duration: Duration::from_millis(40),
            },
        ]
        .iter()
        .map(|e| renderer.render(e))
        .collect();

        assert_eq!(out, "bot> Hello, wörld\n");
    }

    #[test]
    fn test_unstreamed_bot_message() {
        let mut renderer = Renderer::new(5);
        assert_eq!(
            renderer.render(&ChatEvent::Message(Message::bot("hi"))),
            "bot> hi\n"
        );
    }

    #[test]
    fn test_aborted_stream_ends_line() {
        let mut renderer = Renderer::new(5);
        renderer.render(&ChatEvent::StreamStarted {
            text: "partial".into(),
        });
        let out = renderer.render(&ChatEvent::StreamAborted {
            partial_len: 7,
            fragments: 1,
        });
        assert_eq!(out, "\n[system] response interrupted\n");

        // A later bot message is printed in full
        assert_eq!(
            renderer.render(&ChatEvent::Message(Message::bot("next"))),
            "bot> next\n"
        );
    }

    #[test]
    fn test_connection_notices() {
        let mut renderer = Renderer::new(5);
        assert_eq!(
            renderer.render(&ChatEvent::Reconnecting {
                attempt: 2,
                delay: Duration::from_secs(2),
            }),
            "[system] reconnecting in 2.0s (attempt 2/5)\n"
        );
        assert_eq!(
            renderer.render(&ChatEvent::Disconnected {
                clean: false,
                code: None,
                reason: "reset".into(),
            }),
            "[system] lost connection (reset)\n"
        );
        assert_eq!(
            renderer.render(&ChatEvent::Error(ClientError::QueueFull { limit: 100 })),
            "[system] error: Outbound queue full (100 messages)\n"
        );
        assert_eq!(
            renderer.render(&ChatEvent::StateChange(ConnectionState::Connected)),
            ""
        );
    }

    #[test]
    fn test_send_notice_only_for_queued_lines() {
        assert_eq!(send_notice(true, 0, 0), "");
        assert_eq!(
            send_notice(false, 2, 3),
            "[system] not connected; message queued\n"
        );
        // Queue full: nothing was added
        assert_eq!(send_notice(false, 100, 100), "");
        // Transmit failed while connected
        assert_eq!(send_notice(false, 0, 0), "");
    }
}
