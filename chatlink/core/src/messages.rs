//! Chat Messages
//!
//! Records the core produces for the UI layer. The core never keeps a
//! history of these; once emitted they belong to the subscriber.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a message came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    /// Sent by the local user
    User,
    /// Streamed by the remote text-generation server
    Bot,
    /// Produced locally to describe connection status
    System,
}

impl fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Bot => write!(f, "bot"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A complete chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub origin: MessageOrigin,
    /// The message text
    pub text: String,
    /// When the message was produced
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(origin: MessageOrigin, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            origin,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// A message the local user sent
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageOrigin::User, text)
    }

    /// A finished bot response
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(MessageOrigin::Bot, text)
    }

    /// A locally generated status line
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageOrigin::System, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("msg_"));
    }

    #[test]
    fn test_constructors_set_origin() {
        assert_eq!(Message::user("hi").origin, MessageOrigin::User);
        assert_eq!(Message::bot("hi").origin, MessageOrigin::Bot);
        assert_eq!(Message::system("hi").origin, MessageOrigin::System);
    }

    #[test]
    fn test_origin_serializes_lowercase() {
        let json = serde_json::to_string(&MessageOrigin::Bot).unwrap();
        assert_eq!(json, "\"bot\"");
    }
}
