//! Telegram channel: long-poll getUpdates, and deliver replies via sendMessage / editMessageText.
//!
//! Corrections are mapped onto Telegram edits: the first message of a logical reply is sent
//! with sendMessage and its Telegram message_id is remembered; later messages that replace it
//! become editMessageText calls. `composing` is shown with sendChatAction "typing".

use crate::channels::inbound::{InboundEvent, MessageKind};
use crate::channels::outbound::{ChatState, MessageId, OutboundMessage};
use crate::channels::transport::{ChannelError, Transport};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
/// Rate-limited sends and edits are retried this many times before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub typ: String,
}

impl TelegramMessage {
    /// Map to an inbound event; None for updates without text.
    pub fn to_inbound(&self) -> Option<InboundEvent> {
        let text = self.text.as_ref()?;
        Some(InboundEvent {
            kind: chat_kind(&self.chat.typ),
            sender: self.chat.id.to_string(),
            body: text.clone(),
            thread: self.message_thread_id.map(|t| t.to_string()),
        })
    }
}

/// Telegram chat type to message kind: private chats are direct messages, groups are group chats.
fn chat_kind(typ: &str) -> MessageKind {
    match typ {
        "private" => MessageKind::Chat,
        "group" | "supergroup" => MessageKind::GroupChat,
        "channel" => MessageKind::Headline,
        other => MessageKind::Other(other.to_string()),
    }
}

/// True when Telegram rejects an edit because the content is unchanged; treat as success.
pub fn is_message_not_modified_error(error: &str) -> bool {
    error.contains("message is not modified")
}

/// Telegram channel connector: long-polls for updates and delivers replies.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
    /// Logical message id -> Telegram message_id for replies still being corrected.
    delivered: Mutex<HashMap<MessageId, i64>>,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
            delivered: Mutex::new(HashMap::new()),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Result<String, ChannelError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured("telegram bot token".to_string()))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Start the getUpdates long-poll loop and forward messages to the dispatcher. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let url = format!("{}?timeout={}", self.method_url("getUpdates")?, LONG_POLL_TIMEOUT);
        let url = if let Some(off) = offset {
            format!("{}&offset={}", url, off)
        } else {
            url
        };
        let updates: Vec<TelegramUpdate> = self.call(self.client.get(&url)).await?;
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Send a request and unwrap the Bot API envelope.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ChannelError> {
        let res = request.send().await?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(e) => e,
            Err(_) if !status.is_success() => {
                return Err(ChannelError::Api(format!("{} {}", status, body)))
            }
            Err(e) => return Err(ChannelError::Api(format!("unexpected response: {}", e))),
        };
        let description = match envelope.result {
            Some(result) if envelope.ok => return Ok(result),
            _ => envelope.description.unwrap_or_else(|| status.to_string()),
        };
        match envelope.parameters.and_then(|p| p.retry_after) {
            Some(retry_after) => Err(ChannelError::RetryAfter {
                retry_after,
                description,
            }),
            None => Err(ChannelError::Api(description)),
        }
    }

    /// POST a Bot API method, sleeping and retrying when Telegram answers 429 with `retry_after`.
    async fn post_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChannelError> {
        let url = self.method_url(method)?;
        let mut attempt = 0;
        loop {
            match self.call(self.client.post(&url).json(body)).await {
                Err(ChannelError::RetryAfter { retry_after, description })
                    if attempt < MAX_RATE_LIMIT_RETRIES =>
                {
                    attempt += 1;
                    log::warn!("telegram {}: {}, retrying after {}s", method, description, retry_after);
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                }
                result => return result,
            }
        }
    }

    /// sendMessage; returns the Telegram message_id.
    async fn send_text(&self, chat_id: &str, thread: Option<&str>, text: &str) -> Result<i64, ChannelError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(t) = thread.and_then(|t| t.parse::<i64>().ok()) {
            body["message_thread_id"] = serde_json::Value::from(t);
        }
        let sent: TelegramMessage = self.post_with_retry("sendMessage", &body).await?;
        Ok(sent.message_id)
    }

    /// editMessageText; unchanged content counts as success.
    async fn edit_text(&self, chat_id: &str, message_id: i64, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        let result: Result<serde_json::Value, ChannelError> =
            self.post_with_retry("editMessageText", &body).await;
        match result {
            Ok(_) => Ok(()),
            Err(ChannelError::Api(e)) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// sendChatAction "typing".
    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let _: bool = self
            .call(self.client.post(self.method_url("sendChatAction")?).json(&body))
            .await?;
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundEvent>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for u in updates {
                    let Some(inbound) = u.message.as_ref().and_then(TelegramMessage::to_inbound) else {
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl Transport for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        if message.chat_state == Some(ChatState::Composing) {
            if let Err(e) = self.send_typing(&message.to).await {
                log::debug!("telegram sendChatAction failed: {}", e);
            }
        }
        let result = match &message.replace {
            None => {
                let tg_id = self
                    .send_text(&message.to, message.thread.as_deref(), &message.body)
                    .await?;
                self.delivered.lock().await.insert(message.id.clone(), tg_id);
                Ok(())
            }
            Some(target) => {
                let tg_id = self.delivered.lock().await.get(target).copied();
                match tg_id {
                    Some(tg_id) => self.edit_text(&message.to, tg_id, &message.body).await,
                    None => Err(ChannelError::UnknownMessage(target.clone())),
                }
            }
        };
        if message.chat_state == Some(ChatState::Inactive) {
            self.delivered.lock().await.remove(message.logical_id());
        }
        result
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}
