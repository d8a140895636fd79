//! Streaming client for a llama.cpp-style `/completion` endpoint.
//!
//! The response body is a sequence of lines; `data: {json}` lines carry a `content`
//! delta and an optional `stop` flag. Everything else (blank keep-alives, comments) is ignored.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use crate::llm::GenerationParameters;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DATA_PREFIX: &str = "data:";

/// One decoded piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: String,
    /// Set on the backend's last event (`"stop": true`).
    pub is_terminal: bool,
}

impl StreamFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_terminal: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion api error: {status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Lazy, finite, non-restartable sequence of fragments. Ends after the first `Err`.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamFragment, StreamError>> + Send>>;

/// Something that can open a fragment stream for a fully populated request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn open(&self, params: &GenerationParameters) -> Result<FragmentStream, StreamError>;
}

/// Client for the completion HTTP API.
#[derive(Clone)]
pub struct CompletionClient {
    base_url: String,
    client: reqwest::Client,
}

impl CompletionClient {
    pub fn new(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self, StreamError> {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            base_url,
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TokenSource for CompletionClient {
    /// POST /completion and return the decoded fragment stream.
    async fn open(&self, params: &GenerationParameters) -> Result<FragmentStream, StreamError> {
        let url = format!("{}/completion", self.base_url);
        log::debug!("opening completion stream at {}", url);
        let res = self.client.post(&url).json(params).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StreamError::Status { status, body });
        }
        Ok(fragments(res.bytes_stream()))
    }
}

/// What a single response line means.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Fragment(StreamFragment),
    /// Terminal event without content.
    Stop,
    Ignore,
}

#[derive(Debug, Deserialize)]
struct CompletionEvent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    stop: bool,
}

/// Decode one line of the response body. Malformed `data:` payloads are logged and ignored.
pub fn decode_line(line: &str) -> LineEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Ignore;
    };
    let data = data.trim_start();
    if data.is_empty() {
        return LineEvent::Ignore;
    }
    let event: CompletionEvent = match serde_json::from_str(data) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("skipping malformed completion line ({}): {}", e, data);
            return LineEvent::Ignore;
        }
    };
    match event.content.filter(|c| !c.is_empty()) {
        Some(text) => LineEvent::Fragment(StreamFragment {
            text,
            is_terminal: event.stop,
        }),
        None if event.stop => LineEvent::Stop,
        None => LineEvent::Ignore,
    }
}

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let i = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..i).collect();
        self.buffer.drain(..1);
        Some(String::from_utf8_lossy(&line_bytes).into_owned())
    }

    /// Terminate a trailing partial line so it is returned by `next_line`.
    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            self.buffer.push(b'\n');
        }
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    lines: LineBuffer,
    eof: bool,
    done: bool,
}

/// Turn a raw response body into a fragment stream.
pub fn fragments<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<StreamError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        lines: LineBuffer::default(),
        eof: false,
        done: false,
    };
    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            if let Some(line) = state.lines.next_line() {
                match decode_line(&line) {
                    LineEvent::Fragment(fragment) => {
                        state.done = fragment.is_terminal;
                        return Some((Ok(fragment), state));
                    }
                    LineEvent::Stop => return None,
                    LineEvent::Ignore => continue,
                }
            }
            if state.eof {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.lines.extend(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.eof = true;
                    state.lines.finish();
                }
            }
        }
    }))
}
