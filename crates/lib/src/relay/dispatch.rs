//! Inbound dispatch: one independent reply cycle per accepted message.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::channels::InboundEvent;
use crate::relay::orchestrator::Relay;

/// Receive inbound events until the channel closes, spawning a reply cycle for each chat/normal message.
/// Other kinds are dropped without side effects. Waits for in-flight cycles before returning;
/// returns the number of cycles run.
pub async fn run_dispatcher(relay: Arc<Relay>, mut inbound_rx: mpsc::Receiver<InboundEvent>) -> usize {
    let mut cycles = JoinSet::new();
    let mut started = 0;
    loop {
        tokio::select! {
            event = inbound_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                let kind = event.kind.clone();
                let sender = event.sender.clone();
                let Some(request) = event.into_request() else {
                    log::debug!("inbound: ignoring {:?} message from {}", kind, sender);
                    continue;
                };
                log::debug!("inbound: relaying message from {}", request.sender);
                let relay = relay.clone();
                cycles.spawn(async move { relay.handle(request).await });
                started += 1;
            }
            Some(done) = cycles.join_next(), if !cycles.is_empty() => {
                if let Err(e) = done {
                    log::warn!("inbound: reply task failed: {}", e);
                }
            }
        }
    }
    log::debug!("inbound channel closed, waiting for {} reply cycle(s)", cycles.len());
    while let Some(done) = cycles.join_next().await {
        if let Err(e) = done {
            log::warn!("inbound: reply task failed: {}", e);
        }
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChatState, MessageKind};
    use crate::config::RelayConfig;
    use crate::llm::{GenerationParameters, PromptTemplate};
    use crate::relay::testing::{fragments, RecordingTransport, ScriptedSource};

    fn event(kind: MessageKind, sender: &str, body: &str) -> InboundEvent {
        InboundEvent {
            kind,
            sender: sender.to_string(),
            body: body.to_string(),
            thread: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn relays_direct_messages_and_ignores_the_rest() {
        let transport = RecordingTransport::new();
        let source = ScriptedSource::new()
            .on("one", fragments(&["1"]))
            .on("two", fragments(&["2", "2"]));
        let relay = Arc::new(Relay::new(
            Arc::new(source),
            transport.clone(),
            PromptTemplate::new("{message}"),
            GenerationParameters::default(),
            RelayConfig::default(),
        ));
        let (tx, rx) = mpsc::channel(8);
        tx.send(event(MessageKind::Chat, "alice", "one")).await.unwrap();
        tx.send(event(MessageKind::GroupChat, "room", "one")).await.unwrap();
        tx.send(event(MessageKind::Error, "server", "one")).await.unwrap();
        tx.send(event(MessageKind::Normal, "bob", "two")).await.unwrap();
        drop(tx);

        let started = run_dispatcher(relay, rx).await;

        assert_eq!(started, 2);
        assert!(transport.sent_to("room").await.is_empty());
        assert!(transport.sent_to("server").await.is_empty());
        let alice = transport.sent_to("alice").await;
        let bob = transport.sent_to("bob").await;
        assert_eq!(alice.last().map(|m| m.body.as_str()), Some("1"));
        assert_eq!(bob.last().map(|m| m.body.as_str()), Some("22"));
        for sent in [&alice, &bob] {
            assert_eq!(sent.last().and_then(|m| m.chat_state), Some(ChatState::Inactive));
        }
        assert_ne!(alice[0].id, bob[0].id);
    }
}
