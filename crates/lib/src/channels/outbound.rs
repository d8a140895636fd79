//! Outbound messages: body, optional replace target, and chat state.

use std::fmt;

/// Opaque id of a logical outbound message. Corrections target it via `replace`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(format!("msg-{}", uuid::Uuid::new_v4()))
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chat state notification carried alongside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Active,
    Composing,
    Paused,
    Inactive,
    Gone,
}

/// A message handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub thread: Option<String>,
    pub id: MessageId,
    pub body: String,
    /// When set, the peer replaces the content of this earlier message instead of showing a new one.
    pub replace: Option<MessageId>,
    pub chat_state: Option<ChatState>,
}

impl OutboundMessage {
    /// Plain message with a fresh id.
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            thread: None,
            id: MessageId::generate(),
            body: body.into(),
            replace: None,
            chat_state: None,
        }
    }

    /// The logical message this one stands for: the replace target for corrections, its own id otherwise.
    pub fn logical_id(&self) -> &MessageId {
        self.replace.as_ref().unwrap_or(&self.id)
    }
}
