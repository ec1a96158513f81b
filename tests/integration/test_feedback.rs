//! End-to-end tests for the assessment, feedback and practice API.
//!
//! Each test binds a real server on an ephemeral port and talks to it over
//! HTTP, with the mock model provider standing in for a vendor.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intervue_provider::{Gateway, MockProvider, MockTranscriber};
use intervue_sandbox::{CodeRunner, DockerSandbox, ExecutionResult, Language, SandboxError};
use intervue_server::{create_router, AppState, Config};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

/// Runner that reports a division error for every program.
struct FailingRunner;

#[async_trait]
impl CodeRunner for FailingRunner {
    async fn execute(
        &self,
        _source: &str,
        _language: Language,
    ) -> Result<ExecutionResult, SandboxError> {
        Ok(ExecutionResult {
            stdout: String::new(),
            stderr: "ZeroDivisionError: division by zero\n".to_string(),
            exit_code: 1,
            execution_time_ms: 40,
            memory_used_mb: 6.0,
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
    base_url: String,
    client: Client,
    token: String,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawns a server with the mock provider and the given runner.
async fn spawn_server(runner: Arc<dyn CodeRunner>) -> TestServer {
    let state = AppState::new(
        Config::default(),
        Gateway::new(Arc::new(MockProvider::new())),
        Arc::new(MockTranscriber::new()),
        runner,
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
    let router = create_router(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base_url: format!("http://{addr}"),
        client: Client::new(),
        token,
        _handle: handle,
    }
}

impl TestServer {
    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .expect("Request failed");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .expect("Request failed");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Polls a status URL until it reports a terminal status, returning
    /// every status observed along the way.
    async fn poll(&self, url: &str) -> (Vec<String>, Value) {
        let mut seen = Vec::new();
        for _ in 0..300 {
            let (status, body) = self.get(url).await;
            assert_eq!(status, StatusCode::OK);
            let current = body["status"].as_str().unwrap_or_default().to_string();
            if seen.last() != Some(&current) {
                seen.push(current.clone());
            }
            if current == "completed" || current == "failed" {
                return (seen, body);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{url} never reached a terminal status");
    }
}

// ============================================================================
// Feedback Tests
// ============================================================================

#[tokio::test]
async fn test_arrays_assessment_feedback_scenario() {
    let server = spawn_server(Arc::new(FailingRunner)).await;

    let (status, assessment) = server
        .post(
            "/api/assessments",
            json!({"topic": "Arrays", "difficulty": "easy"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(assessment["status"], "created");
    let id = assessment["id"].as_str().expect("id").to_string();

    let (status, answered) = server
        .post(
            &format!("/api/assessments/{id}/response"),
            json!({"text": "Sort, then sweep with two pointers. O(n log n) time."}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answered["status"], "awaiting_feedback");

    let (status, accepted) = server
        .post(&format!("/api/assessments/{id}/feedback"), json!({}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], "pending");
    let poll_url = accepted["poll_url"].as_str().expect("poll_url").to_string();

    let (seen, done) = server.poll(&poll_url).await;
    assert_eq!(done["status"], "completed", "observed {seen:?}");
    let order = ["pending", "processing", "completed"];
    let positions: Vec<usize> = seen
        .iter()
        .map(|s| order.iter().position(|o| o == s).expect("known status"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "observed {seen:?}");

    let feedback_id = accepted["id"].as_str().expect("id");
    let (status, result) = server
        .get(&format!("/api/feedback/{feedback_id}/result"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let score = result["score"].as_f64().expect("score");
    assert!((0.0..=100.0).contains(&score));
    assert!(!result["strengths"].as_array().expect("strengths").is_empty());
    assert!(!result["weaknesses"].as_array().expect("weaknesses").is_empty());

    let (_, assessment) = server.get(&format!("/api/assessments/{id}")).await;
    assert_eq!(assessment["status"], "completed");
}

#[tokio::test]
async fn test_practice_batch_is_ordered_and_guarded() {
    let server = spawn_server(Arc::new(FailingRunner)).await;

    let (_, assessment) = server
        .post("/api/assessments", json!({"topic": "Trees"}))
        .await;
    let id = assessment["id"].as_str().expect("id").to_string();
    server
        .post(
            &format!("/api/assessments/{id}/response"),
            json!({"text": "Recurse left then right."}),
        )
        .await;
    let (_, accepted) = server
        .post(&format!("/api/assessments/{id}/feedback"), json!({}))
        .await;
    let feedback_id = accepted["id"].as_str().expect("id").to_string();
    server
        .poll(accepted["poll_url"].as_str().expect("poll_url"))
        .await;

    let practices_url = format!("/api/feedback/{feedback_id}/practices");
    let (status, generation) = server
        .post(&practices_url, json!({"count": 3, "difficulty_ramp": true}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, done) = server
        .poll(generation["poll_url"].as_str().expect("poll_url"))
        .await;
    assert_eq!(done["status"], "completed");

    let (status, items) = server.get(&practices_url).await;
    assert_eq!(status, StatusCode::OK);
    let items = items.as_array().expect("items");
    let orders: Vec<u64> = items
        .iter()
        .map(|item| item["sequence_order"].as_u64().expect("order"))
        .collect();
    assert_eq!(orders, vec![0, 1, 2]);
    let difficulties: Vec<&str> = items
        .iter()
        .map(|item| item["difficulty"].as_str().expect("difficulty"))
        .collect();
    assert_eq!(difficulties, vec!["easy", "medium", "hard"]);

    let (status, body) = server.post(&practices_url, json!({"count": 2})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error").contains("already"));
}

// ============================================================================
// Execution Tests
// ============================================================================

#[tokio::test]
async fn test_execute_reports_runtime_error() {
    let server = spawn_server(Arc::new(FailingRunner)).await;

    let (_, assessment) = server
        .post("/api/assessments", json!({"topic": "Arrays"}))
        .await;
    let id = assessment["id"].as_str().expect("id").to_string();

    let (status, result) = server
        .post(
            &format!("/api/assessments/{id}/execute"),
            json!({"code": "print(1/0)", "language": "python"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(result["exit_code"], 0);
    assert!(!result["stderr"].as_str().expect("stderr").is_empty());
    assert_eq!(result["timed_out"], false);
}

#[tokio::test]
#[ignore = "requires running Docker daemon"]
async fn test_execute_division_by_zero_in_docker() {
    let sandbox = DockerSandbox::connect(Config::default().sandbox_limits())
        .expect("Docker client should initialise");
    let server = spawn_server(Arc::new(sandbox)).await;

    let (_, assessment) = server
        .post("/api/assessments", json!({"topic": "Arrays"}))
        .await;
    let id = assessment["id"].as_str().expect("id").to_string();

    let (status, result) = server
        .post(
            &format!("/api/assessments/{id}/execute"),
            json!({"code": "print(1/0)", "language": "python"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(result["exit_code"], 0);
    assert!(result["stderr"]
        .as_str()
        .expect("stderr")
        .contains("ZeroDivisionError"));
    assert_eq!(result["timed_out"], false);
}
