//! Terminal transport for `murmur ask`: renders corrections as a growing line of text.

use std::io::Write;

use async_trait::async_trait;
use lib::channels::{ChannelError, ChatState, OutboundMessage, Transport};
use tokio::sync::Mutex;

/// Prints the first message of a reply to stderr and its corrections to stdout.
/// A correction that extends the previous text only prints the new suffix.
#[derive(Default)]
pub struct ConsoleTransport {
    shown: Mutex<String>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn id(&self) -> &str {
        "console"
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        let mut shown = self.shown.lock().await;
        let mut stdout = std::io::stdout();
        if message.replace.is_none() {
            eprintln!("{}", message.body);
            shown.clear();
            return Ok(());
        }
        let out = match message.body.strip_prefix(shown.as_str()) {
            Some(suffix) => suffix.to_string(),
            None if shown.is_empty() => message.body.clone(),
            None => format!("\n{}", message.body),
        };
        write!(stdout, "{}", out).map_err(|e| ChannelError::Api(e.to_string()))?;
        if message.chat_state == Some(ChatState::Inactive) {
            writeln!(stdout).map_err(|e| ChannelError::Api(e.to_string()))?;
        }
        stdout.flush().map_err(|e| ChannelError::Api(e.to_string()))?;
        *shown = message.body;
        Ok(())
    }
}
