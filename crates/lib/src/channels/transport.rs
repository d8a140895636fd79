//! Transport handle: the capability the relay uses to deliver messages.

use async_trait::async_trait;

use crate::channels::outbound::{MessageId, OutboundMessage};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel not configured: {0}")]
    NotConfigured(String),
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after}s: {description}")]
    RetryAfter { retry_after: u64, description: String },
    #[error("no delivered message for id {0}")]
    UnknownMessage(MessageId),
}

/// Handle to a running channel (send, stop).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Deliver one message. Corrections carry `replace`.
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError>;
    /// Stop the channel connector. Default does nothing.
    fn stop(&self) {}
}
