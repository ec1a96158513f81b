//! Integration tests for the interview chat WebSocket.
//!
//! These tests validate authentication on upgrade, history replay, the
//! opening turn and out-of-band notifications against a real server.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use intervue_provider::{Gateway, MockProvider, MockTranscriber};
use intervue_sandbox::{CodeRunner, ExecutionResult, Language, SandboxError};
use intervue_server::{create_router, AppState, Config, Message as ChatMessage, Sender};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct NoopRunner;

#[async_trait]
impl CodeRunner for NoopRunner {
    async fn execute(
        &self,
        _source: &str,
        _language: Language,
    ) -> Result<ExecutionResult, SandboxError> {
        Ok(ExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            execution_time_ms: 1,
            memory_used_mb: 1.0,
            timed_out: false,
        })
    }

    async fn health_check(&self) -> Result<(), SandboxError> {
        Ok(())
    }
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

struct TestServer {
    addr: String,
    state: AppState,
    token: String,
    _handle: tokio::task::JoinHandle<()>,
}

async fn spawn_server() -> TestServer {
    let state = AppState::new(
        Config::default(),
        Gateway::new(Arc::new(MockProvider::new())),
        Arc::new(MockTranscriber::new()),
        Arc::new(NoopRunner),
    );
    let token = state
        .auth
        .issue(Uuid::new_v4(), chrono::Duration::hours(1))
        .await;

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    let router = create_router(state.clone());
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        state,
        token,
        _handle: handle,
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> Value {
        reqwest::Client::new()
            .post(format!("http://{}{path}", self.addr))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .expect("Request failed")
            .json()
            .await
            .expect("JSON body")
    }

    async fn create_assessment(&self, topic: &str) -> Uuid {
        let body = self
            .post(
                "/api/assessments",
                json!({"topic": topic, "difficulty": "medium"}),
            )
            .await;
        body["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("assessment id")
    }

    async fn connect(&self, assessment_id: Uuid, token: &str) -> WsClient {
        let url = format!("ws://{}/ws/assessments/{assessment_id}?token={token}", self.addr);
        let (ws_stream, _) = connect_async(url)
            .await
            .expect("Failed to connect to WebSocket");
        ws_stream
    }
}

/// Receives the next message, answering pings along the way.
async fn next_message(client: &mut WsClient) -> Message {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => return other,
        }
    }
}

/// Receives the next frame and parses it as JSON.
async fn receive_frame(client: &mut WsClient) -> Value {
    match next_message(client).await {
        Message::Text(text) => serde_json::from_str(&text).expect("Failed to parse frame"),
        other => panic!("Expected text message, got: {other:?}"),
    }
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_bad_token_closes_with_policy_violation() {
    let server = spawn_server().await;
    let assessment_id = server.create_assessment("Arrays").await;

    let mut client = server.connect(assessment_id, "forged-token").await;
    match next_message(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("Expected close frame, got: {other:?}"),
    }

    assert!(server.state.store.messages(assessment_id).await.is_empty());
    let assessment = server
        .state
        .store
        .assessment(assessment_id)
        .await
        .expect("assessment");
    assert_eq!(assessment.status.to_string(), "created");
}

#[tokio::test]
async fn test_other_users_assessment_closes_with_policy_violation() {
    let server = spawn_server().await;
    let assessment_id = server.create_assessment("Arrays").await;
    let stranger = server
        .state
        .auth
        .issue(Uuid::new_v4(), chrono::Duration::hours(1))
        .await;

    let mut client = server.connect(assessment_id, &stranger).await;
    match next_message(&mut client).await {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert_eq!(frame.reason, "Assessment not found");
        }
        other => panic!("Expected close frame, got: {other:?}"),
    }
    assert!(server.state.store.messages(assessment_id).await.is_empty());
}

#[tokio::test]
async fn test_stale_cookie_falls_back_to_query_token() {
    let server = spawn_server().await;
    let assessment_id = server.create_assessment("Arrays").await;

    let url = format!(
        "ws://{}/ws/assessments/{assessment_id}?token={}",
        server.addr, server.token
    );
    let mut request = url.into_client_request().expect("request");
    request
        .headers_mut()
        .insert(COOKIE, "access_token=expired-session".parse().expect("header"));
    let (mut client, _) = connect_async(request)
        .await
        .expect("Failed to connect to WebSocket");

    let welcome = receive_frame(&mut client).await;
    assert_eq!(welcome["type"], "ai_message");
}

// ============================================================================
// Conversation Tests
// ============================================================================

#[tokio::test]
async fn test_new_session_opens_with_welcome_and_question() {
    let server = spawn_server().await;
    let assessment_id = server.create_assessment("Arrays").await;

    let mut client = server.connect(assessment_id, &server.token).await;
    let welcome = receive_frame(&mut client).await;
    assert_eq!(welcome["type"], "ai_message");
    assert!(welcome["content"]
        .as_str()
        .expect("content")
        .contains("Arrays"));
    let question = receive_frame(&mut client).await;
    assert_eq!(question["type"], "ai_message");
    assert!(question["message_id"].is_string());

    client
        .send(Message::Text(
            json!({"type": "user_message", "content": "Can I assume the input is sorted?"})
                .to_string(),
        ))
        .await
        .expect("send");
    let echo = receive_frame(&mut client).await;
    assert_eq!(echo["type"], "user_message");
    assert_eq!(echo["content"], "Can I assume the input is sorted?");
    let reply = receive_frame(&mut client).await;
    assert_eq!(reply["type"], "ai_message");

    let stored = server.state.store.messages(assessment_id).await;
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[2].sender, Sender::User);
}

#[tokio::test]
async fn test_reconnect_replays_last_twenty_messages() {
    let server = spawn_server().await;
    let assessment_id = server.create_assessment("Strings").await;
    for i in 0..25 {
        let sender = if i % 2 == 0 { Sender::Ai } else { Sender::User };
        server
            .state
            .store
            .append_message(ChatMessage::new(assessment_id, sender, format!("message {i}")))
            .await
            .expect("append");
    }

    let mut client = server.connect(assessment_id, &server.token).await;
    let mut replayed = Vec::new();
    for _ in 0..20 {
        let frame = receive_frame(&mut client).await;
        replayed.push(frame["content"].as_str().expect("content").to_string());
    }
    let expected: Vec<String> = (5..25).map(|i| format!("message {i}")).collect();
    assert_eq!(replayed, expected);

    // No welcome is generated for a conversation that already exists.
    assert_eq!(server.state.store.messages(assessment_id).await.len(), 25);
}

#[tokio::test]
async fn test_feedback_completion_is_pushed_to_open_socket() {
    let server = spawn_server().await;
    let assessment_id = server.create_assessment("Trees").await;

    let mut client = server.connect(assessment_id, &server.token).await;
    receive_frame(&mut client).await;
    receive_frame(&mut client).await;

    server
        .post(
            &format!("/api/assessments/{assessment_id}/response"),
            json!({"text": "In-order traversal with a stack."}),
        )
        .await;
    server
        .post(
            &format!("/api/assessments/{assessment_id}/feedback"),
            json!({}),
        )
        .await;

    let notification = receive_frame(&mut client).await;
    assert_eq!(notification["type"], "notification");
    assert!(notification["content"]
        .as_str()
        .expect("content")
        .starts_with("Feedback ready"));
}
