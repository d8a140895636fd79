//! Integration test: run reply cycles against a fake `/completion` server on a free port.
//! The server streams `data:` lines the way a llama.cpp server does; replies are captured by a
//! recording transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::{stream, StreamExt};
use lib::channels::{ChannelError, ChatState, InboundEvent, InboundRequest, OutboundMessage, Transport};
use lib::config::RelayConfig;
use lib::llm::{CompletionClient, GenerationParameters, PromptTemplate};
use lib::relay::{run_dispatcher, Relay, ReplyState};
use tokio::sync::mpsc;

#[derive(Default)]
struct Backend {
    requests: Mutex<Vec<serde_json::Value>>,
}

fn data(content: &str, stop: bool) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "content": content, "stop": stop })
    )
}

/// Picks a canned answer from a keyword in the prompt. The relay under test uses a bare
/// template, so only the user's text can match.
async fn completion(State(backend): State<Arc<Backend>>, Json(body): Json<serde_json::Value>) -> Response {
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    backend.requests.lock().unwrap().push(body);
    let (chunks, delay): (Vec<String>, u64) = if prompt.contains("fail") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded").into_response();
    } else if prompt.contains("empty") {
        (vec!["\n".to_string(), data("", true)], 0)
    } else if prompt.contains("garbled") {
        (
            vec![data("a", false), "data: {\"content\":\n\n".to_string(), data("b", false), data("", true)],
            0,
        )
    } else if prompt.contains("slow") {
        (vec![data("s1", false), data("s2", false), data("s3", true)], 50)
    } else {
        (
            vec![data("Hi", false), data(" there", false), data("!", false), data("", true)],
            0,
        )
    };
    let body = stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, std::convert::Infallible>(chunk)
    });
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(body))
        .unwrap()
}

async fn start_backend() -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/completion", post(completion))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), backend)
}

#[derive(Default)]
struct RecordingTransport {
    sent: tokio::sync::Mutex<Vec<OutboundMessage>>,
}

impl RecordingTransport {
    async fn sent_to(&self, to: &str) -> Vec<OutboundMessage> {
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

async fn relay_for(base_url: String) -> (Arc<Relay>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let client = CompletionClient::new(Some(base_url), Some(Duration::from_secs(10))).expect("client");
    let config = RelayConfig {
        pacing_ms: 10,
        ..RelayConfig::default()
    };
    let relay = Relay::new(
        Arc::new(client),
        transport.clone(),
        PromptTemplate::new("User: {message} \nLlama:"),
        GenerationParameters::default(),
        config,
    );
    (Arc::new(relay), transport)
}

fn request(sender: &str, text: &str) -> InboundRequest {
    InboundRequest {
        sender: sender.to_string(),
        text: text.to_string(),
        thread: None,
    }
}

fn bodies(sent: &[OutboundMessage]) -> Vec<&str> {
    sent.iter().map(|m| m.body.as_str()).collect()
}

#[tokio::test]
async fn hello_streams_into_one_corrected_message() {
    let (url, backend) = start_backend().await;
    let (relay, transport) = relay_for(url).await;

    let outcome = relay.handle(request("alice", "Hello")).await;

    assert_eq!(outcome.state, ReplyState::Finalized);
    let sent = transport.sent_to("alice").await;
    assert_eq!(
        bodies(&sent),
        vec!["Thanks for sending\nHello", "Hi", "Hi there", "Hi there!", "Hi there!"]
    );
    assert_eq!(sent[0].id, outcome.id);
    assert!(sent[1..].iter().all(|m| m.replace.as_ref() == Some(&outcome.id)));
    assert_eq!(sent[0].chat_state, Some(ChatState::Composing));
    assert_eq!(sent.last().and_then(|m| m.chat_state), Some(ChatState::Inactive));

    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["stream"], true);
    assert_eq!(requests[0]["n_predict"], 400);
    assert!(requests[0]["prompt"]
        .as_str()
        .unwrap()
        .ends_with("User: Hello \nLlama:"));
}

#[tokio::test]
async fn server_error_finalizes_with_error_notice_and_no_updates() {
    let (url, _backend) = start_backend().await;
    let (relay, transport) = relay_for(url).await;

    let outcome = relay.handle(request("alice", "please fail")).await;

    assert_eq!(outcome.state, ReplyState::Failed);
    let sent = transport.sent_to("alice").await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].body, RelayConfig::default().error_notice);
    assert_eq!(sent[1].replace.as_ref(), Some(&outcome.id));
    assert_eq!(sent[1].chat_state, Some(ChatState::Inactive));
}

#[tokio::test]
async fn empty_answer_finalizes_with_empty_notice() {
    let (url, _backend) = start_backend().await;
    let (relay, transport) = relay_for(url).await;

    let outcome = relay.handle(request("alice", "empty")).await;

    assert_eq!(outcome.state, ReplyState::Finalized);
    assert_eq!(outcome.fragments, 0);
    let sent = transport.sent_to("alice").await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].body, RelayConfig::default().empty_notice);
}

#[tokio::test]
async fn malformed_line_is_skipped() {
    let (url, _backend) = start_backend().await;
    let (relay, _transport) = relay_for(url).await;

    let outcome = relay.handle(request("alice", "garbled")).await;

    assert_eq!(outcome.state, ReplyState::Finalized);
    assert_eq!(outcome.text, "ab");
}

#[tokio::test]
async fn unreachable_backend_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    drop(listener);
    let (relay, transport) = relay_for(format!("http://127.0.0.1:{}", port)).await;

    let outcome = relay.handle(request("alice", "Hello")).await;

    assert_eq!(outcome.state, ReplyState::Failed);
    assert_eq!(transport.sent_to("alice").await.len(), 2);
}

#[tokio::test]
async fn dispatcher_runs_concurrent_cycles_independently() {
    let (url, _backend) = start_backend().await;
    let (relay, transport) = relay_for(url).await;
    let (tx, rx) = mpsc::channel(8);
    tx.send(InboundEvent::chat("alice", "slow one")).await.unwrap();
    tx.send(InboundEvent::chat("bob", "slow two")).await.unwrap();
    tx.send(InboundEvent {
        kind: "groupchat".into(),
        ..InboundEvent::chat("room", "slow three")
    })
    .await
    .unwrap();
    drop(tx);

    let started = run_dispatcher(relay, rx).await;

    assert_eq!(started, 2);
    assert!(transport.sent_to("room").await.is_empty());
    let alice = transport.sent_to("alice").await;
    let bob = transport.sent_to("bob").await;
    assert_ne!(alice[0].id, bob[0].id);
    for sent in [&alice, &bob] {
        assert!(sent[1..].iter().all(|m| m.replace.as_ref() == Some(&sent[0].id)));
        assert_eq!(sent.last().map(|m| m.body.as_str()), Some("s1s2s3"));
        let finals = sent
            .iter()
            .filter(|m| m.chat_state == Some(ChatState::Inactive))
            .count();
        assert_eq!(finals, 1);
    }
}
