//! Reply correction emitter: one logical outbound message, corrected in place.

use std::sync::Arc;

use crate::channels::{ChatState, MessageId, OutboundMessage, Transport};

/// Sends the placeholder and the corrections of one reply to one recipient.
///
/// Sends are fire-and-forget: transport failures are logged and never returned.
pub struct ReplyEmitter {
    transport: Arc<dyn Transport>,
    to: String,
    thread: Option<String>,
}

impl ReplyEmitter {
    pub fn new(transport: Arc<dyn Transport>, to: impl Into<String>, thread: Option<String>) -> Self {
        Self {
            transport,
            to: to.into(),
            thread,
        }
    }

    /// Send the first message of the reply, marked composing. Returns the id every correction must target.
    pub async fn initial(&self, text: &str) -> MessageId {
        let message = self.message(text, None, ChatState::Composing);
        let id = message.id.clone();
        self.deliver(message).await;
        id
    }

    /// Replace the reply's content, still composing.
    pub async fn update(&self, id: &MessageId, text: &str) {
        let message = self.message(text, Some(id.clone()), ChatState::Composing);
        self.deliver(message).await;
    }

    /// Replace the reply's content for the last time and mark the sender inactive.
    pub async fn finalize(&self, id: &MessageId, text: &str) {
        let message = self.message(text, Some(id.clone()), ChatState::Inactive);
        self.deliver(message).await;
    }

    fn message(&self, text: &str, replace: Option<MessageId>, state: ChatState) -> OutboundMessage {
        OutboundMessage {
            to: self.to.clone(),
            thread: self.thread.clone(),
            id: MessageId::generate(),
            body: text.to_string(),
            replace,
            chat_state: Some(state),
        }
    }

    async fn deliver(&self, message: OutboundMessage) {
        let logical = message.logical_id().clone();
        if let Err(e) = self.transport.send(message).await {
            log::warn!(
                "{}: failed to deliver reply {} to {}: {}",
                self.transport.id(),
                logical,
                self.to,
                e
            );
        }
    }
}
