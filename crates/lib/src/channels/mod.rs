//! Communication channels (e.g. Telegram).
//!
//! Inbound events are sent to the relay dispatcher over an mpsc channel; replies go out
//! through a [`Transport`] handle, which understands message corrections and chat states.

mod inbound;
mod outbound;
mod telegram;
mod transport;

pub use inbound::{InboundEvent, InboundRequest, MessageKind};
pub use outbound::{ChatState, MessageId, OutboundMessage};
pub use telegram::{is_message_not_modified_error, TelegramChannel, TelegramMessage, TelegramUpdate};
pub use transport::{ChannelError, Transport};
