//! Reply cycle state machine: placeholder, streamed corrections, terminal correction.
//!
//! One cycle per inbound request. The cycle owns its accumulator and logical message id;
//! the [`Relay`] itself only holds read-only configuration and shared handles, so any number
//! of cycles can run concurrently on the same instance.

use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};

use crate::channels::{InboundRequest, MessageId, Transport};
use crate::config::RelayConfig;
use crate::llm::{FragmentStream, GenerationParameters, PromptTemplate, StreamError, TokenSource};
use crate::relay::accumulator::Accumulator;
use crate::relay::emitter::ReplyEmitter;

/// Where a reply cycle is. `Finalized` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Placeholder,
    Composing,
    Finalized,
    Failed,
}

impl ReplyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplyState::Finalized | ReplyState::Failed)
    }
}

/// Result of one reply cycle.
#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    pub state: ReplyState,
    pub id: MessageId,
    /// Body of the terminal correction.
    pub text: String,
    pub fragments: usize,
}

/// Relays inbound requests to a token source and streams the answer back as corrections.
pub struct Relay {
    source: Arc<dyn TokenSource>,
    transport: Arc<dyn Transport>,
    prompt: PromptTemplate,
    params: GenerationParameters,
    config: RelayConfig,
}

impl Relay {
    pub fn new(
        source: Arc<dyn TokenSource>,
        transport: Arc<dyn Transport>,
        prompt: PromptTemplate,
        params: GenerationParameters,
        config: RelayConfig,
    ) -> Self {
        Self {
            source,
            transport,
            prompt,
            params,
            config,
        }
    }

    /// Run one reply cycle to a terminal state. Always ends with exactly one terminal correction.
    pub async fn handle(&self, request: InboundRequest) -> ReplyOutcome {
        let emitter = ReplyEmitter::new(
            self.transport.clone(),
            request.sender.clone(),
            request.thread.clone(),
        );
        let mut state = ReplyState::Placeholder;
        let id = emitter
            .initial(&self.config.waiting_notice_for(&request.text))
            .await;
        log::debug!("reply {} to {}: {:?}", id, request.sender, state);

        let params = self.params.with_prompt(self.prompt.render(&request.text));
        let mut reply = Accumulator::new();
        state = ReplyState::Composing;
        log::debug!("reply {} to {}: {:?}", id, request.sender, state);
        let result = match self.source.open(&params).await {
            Ok(stream) => self.pump(stream, &emitter, &id, &mut reply).await,
            Err(e) => Err(e),
        };

        let text = match result {
            Ok(()) => {
                state = ReplyState::Finalized;
                log::debug!("reply {} complete: {:?}", id, reply.current_text());
                if reply.is_empty() {
                    self.config.empty_notice.clone()
                } else {
                    reply.current_text().to_string()
                }
            }
            Err(e) => {
                state = ReplyState::Failed;
                log::warn!(
                    "reply {} to {} failed after {} fragment(s): {}",
                    id,
                    request.sender,
                    reply.fragment_count(),
                    e
                );
                self.config.error_notice.clone()
            }
        };
        debug_assert!(state.is_terminal());
        emitter.finalize(&id, &text).await;
        log::info!("reply {} to {}: {:?}", id, request.sender, state);
        ReplyOutcome {
            state,
            id,
            text,
            fragments: reply.fragment_count(),
        }
    }

    /// Pull fragments, publish the cumulative text after each one, and pause between corrections.
    async fn pump(
        &self,
        mut stream: FragmentStream,
        emitter: &ReplyEmitter,
        id: &MessageId,
        reply: &mut Accumulator,
    ) -> Result<(), StreamError> {
        let pacing = self.config.pacing();
        let mut ended = false;
        while !ended {
            let Some(item) = stream.next().await else {
                break;
            };
            let fragment = item?;
            log::debug!("reply {} fragment: {:?}", id, fragment.text);
            reply.append(&fragment.text);
            ended = fragment.is_terminal;
            if self.config.coalesce && !ended {
                ended = coalesce_ready(&mut stream, reply)?;
            }
            emitter.update(id, reply.current_text()).await;
            if !ended && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }
        Ok(())
    }
}

/// Append every fragment that is already available without waiting. Returns true when the stream ended.
fn coalesce_ready(stream: &mut FragmentStream, reply: &mut Accumulator) -> Result<bool, StreamError> {
    loop {
        match stream.next().now_or_never() {
            Some(Some(item)) => {
                let fragment = item?;
                reply.append(&fragment.text);
                if fragment.is_terminal {
                    return Ok(true);
                }
            }
            Some(None) => return Ok(true),
            None => return Ok(false),
        }
    }
}
