//! Test doubles for the relay: a scripted token source and a recording transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::sync::Mutex;

use crate::channels::{ChannelError, OutboundMessage, Transport};
use crate::llm::{FragmentStream, GenerationParameters, StreamError, StreamFragment, TokenSource};

pub(crate) enum Script {
    Items(Vec<Result<StreamFragment, StreamError>>),
    OpenFails(StreamError),
}

pub(crate) fn fragments(texts: &[&str]) -> Script {
    Script::Items(texts.iter().map(|t| Ok(StreamFragment::new(*t))).collect())
}

/// Answers each request with the script whose key appears in the prompt.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    scripts: std::sync::Mutex<Vec<(String, Script)>>,
    /// Delay before each item, to interleave concurrent cycles.
    delay: Option<Duration>,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn on(self, key: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().push((key.to_string(), script));
        self
    }
}

#[async_trait]
impl TokenSource for ScriptedSource {
    async fn open(&self, params: &GenerationParameters) -> Result<FragmentStream, StreamError> {
        self.prompts.lock().await.push(params.prompt.clone());
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            let pos = scripts
                .iter()
                .position(|(key, _)| params.prompt.contains(key.as_str()))
                .expect("no script for prompt");
            scripts.remove(pos).1
        };
        let items = match script {
            Script::OpenFails(e) => return Err(e),
            Script::Items(items) => items,
        };
        let delay = self.delay;
        Ok(Box::pin(stream::iter(items).then(move |item| async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            item
        })))
    }
}

/// Transport that keeps every message it is given.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub(crate) sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn sent_to(&self, to: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to == to)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn id(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}
