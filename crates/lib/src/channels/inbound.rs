//! Inbound events from a channel and the requests the relay accepts from them.

/// Message type as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Normal,
    GroupChat,
    Headline,
    Error,
    Other(String),
}

impl MessageKind {
    /// Only direct and normal messages start a reply.
    pub fn is_relayable(&self) -> bool {
        matches!(self, MessageKind::Chat | MessageKind::Normal)
    }
}

impl From<&str> for MessageKind {
    fn from(s: &str) -> Self {
        match s {
            "chat" => MessageKind::Chat,
            "normal" => MessageKind::Normal,
            "groupchat" => MessageKind::GroupChat,
            "headline" => MessageKind::Headline,
            "error" => MessageKind::Error,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

/// A message event as delivered by a channel connector.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub kind: MessageKind,
    /// Who to reply to (e.g. Telegram chat_id).
    pub sender: String,
    pub body: String,
    /// Conversation thread, if the transport has one.
    pub thread: Option<String>,
}

impl InboundEvent {
    pub fn chat(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Chat,
            sender: sender.into(),
            body: body.into(),
            thread: None,
        }
    }

    /// The request to relay, or None when this kind of message is ignored.
    pub fn into_request(self) -> Option<InboundRequest> {
        if !self.kind.is_relayable() {
            return None;
        }
        Some(InboundRequest {
            sender: self.sender,
            text: self.body,
            thread: self.thread,
        })
    }
}

/// A request accepted for relaying; consumed by exactly one reply cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub sender: String,
    pub text: String,
    pub thread: Option<String>,
}
