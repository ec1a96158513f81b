//! HTTP API for the Intervue server.
//!
//! Every route lives under `/api` and requires an `Authorization: Bearer`
//! header, except `/api/health`. Long-running work (feedback and practice
//! generation) answers `202 Accepted` with a poll URL, or `503` without
//! creating anything when the job queue is full. The chat WebSocket is
//! mounted at `/ws/assessments/:id`.
//!
//! # Endpoints
//!
//! - `POST /api/assessments`, `GET|DELETE /api/assessments/:id`
//! - `POST /api/assessments/:id/response`, `POST /api/assessments/:id/cancel`
//! - `GET /api/assessments/:id/messages`
//! - `POST /api/assessments/:id/feedback`
//! - `POST /api/assessments/:id/execute`, `GET /api/assessments/:id/submissions`
//! - `POST /api/rubrics`
//! - `GET /api/assessments/:id/feedback`
//! - `GET /api/feedback/:id`, `GET /api/feedback/:id/status`,
//!   `GET /api/feedback/:id/result`, `POST /api/feedback/:id/retry`
//! - `POST|GET /api/feedback/:id/practices`
//! - `POST /api/practices/:id/start`, `POST /api/practices/:id/response`,
//!   `POST /api/practices/:id/skip`
//! - `GET /api/practice-generations/:id/status`
//! - `GET /api/health`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use intervue_provider::{Gateway, MockProvider, MockTranscriber};
//! use intervue_sandbox::{DockerSandbox, SandboxLimits};
//! use intervue_server::{create_router, AppState, Config};
//!
//! # async fn example() {
//! let sandbox = DockerSandbox::connect(SandboxLimits::default()).unwrap();
//! let state = AppState::new(
//!     Config::default(),
//!     Gateway::new(Arc::new(MockProvider::new())),
//!     Arc::new(MockTranscriber::new()),
//!     Arc::new(sandbox),
//! );
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use intervue_provider::{Gateway, Transcriber};
use intervue_sandbox::{CodeRunner, Language};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{bearer_token, Authenticator, Identity};
use crate::chat::{ws_handler, ConnectionRegistry};
use crate::config::{ChatConfig, Config};
use crate::error::IntervueError;
use crate::jobs::{Job, JobQueue};
use crate::models::{
    Assessment, CodeSubmission, FeedbackRun, GenerationStatus, Message, NewAssessment, NewRubric,
    PracticeGeneration, PracticeItemView, Rubric,
};
use crate::pipeline::Pipeline;
use crate::store::Store;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

/// Body of `POST /assessments/:id/response`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseRequest {
    /// Written answer.
    #[serde(default)]
    pub text: Option<String>,
    /// Reference to a recorded answer.
    #[serde(default)]
    pub audio_ref: Option<String>,
}

/// Body of `POST /assessments/:id/feedback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackRequest {
    /// Rubric to score against.
    #[serde(default)]
    pub rubric_id: Option<Uuid>,
}

const fn default_practice_count() -> u32 {
    3
}

/// Body of `POST /feedback/:id/practices`.
#[derive(Debug, Clone, Deserialize)]
pub struct PracticeRequest {
    /// Number of items to generate.
    #[serde(default = "default_practice_count")]
    pub count: u32,
    /// Order items from easy to hard.
    #[serde(default)]
    pub difficulty_ramp: bool,
}

/// Body of `POST /practices/:id/response`.
#[derive(Debug, Clone, Deserialize)]
pub struct PracticeResponseRequest {
    /// Candidate's answer.
    pub response: String,
    /// Self-assessed score in `[0, 100]`.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Body of `POST /assessments/:id/execute`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    /// Source code.
    pub code: String,
    /// Language name, e.g. `python`.
    pub language: String,
}

/// Answer to a request that started background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    /// Record to poll.
    pub id: Uuid,
    /// Status at submission.
    pub status: GenerationStatus,
    /// Where to poll.
    pub poll_url: String,
}

/// Poll view of a generation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Record id.
    pub id: Uuid,
    /// Current status.
    pub status: GenerationStatus,
    /// Human-readable progress.
    pub progress_message: String,
    /// Rough seconds until completion.
    pub estimated_completion_seconds: Option<u32>,
}

impl From<&FeedbackRun> for StatusResponse {
    fn from(run: &FeedbackRun) -> Self {
        Self {
            id: run.id,
            status: run.status,
            progress_message: run.status.progress_message(run.error_message.as_deref()),
            estimated_completion_seconds: run.status.estimated_completion_seconds(),
        }
    }
}

/// Poll view of a practice generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeStatusResponse {
    /// Generation id.
    pub id: Uuid,
    /// Feedback run the items belong to.
    pub feedback_id: Uuid,
    /// Current status.
    pub status: GenerationStatus,
    /// Human-readable progress.
    pub progress_message: String,
    /// Rough seconds until completion.
    pub estimated_completion_seconds: Option<u32>,
    /// Items stored, once completed.
    pub item_count: Option<usize>,
}

impl From<&PracticeGeneration> for PracticeStatusResponse {
    fn from(generation: &PracticeGeneration) -> Self {
        let progress_message = match generation.status {
            GenerationStatus::Completed => "Practice items ready".to_string(),
            status => status.progress_message(generation.error_message.as_deref()),
        };
        Self {
            id: generation.id,
            feedback_id: generation.feedback_id,
            status: generation.status,
            progress_message,
            estimated_completion_seconds: generation.status.estimated_completion_seconds(),
            item_count: generation.item_count,
        }
    }
}

/// Everything recorded about a feedback run, in any status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecordResponse {
    /// Run id.
    pub id: Uuid,
    /// Evaluated assessment.
    pub assessment_id: Uuid,
    /// Current status.
    pub status: GenerationStatus,
    /// Human-readable progress.
    pub progress_message: String,
    /// Rough seconds until completion.
    pub estimated_completion_seconds: Option<u32>,
    /// Rubric scored against.
    pub rubric_id: Option<Uuid>,
    /// Overall score, once completed.
    pub score: Option<f64>,
    /// Score per criterion.
    pub criterion_scores: BTreeMap<String, f64>,
    /// What went well.
    pub strengths: Vec<String>,
    /// What to improve.
    pub weaknesses: Vec<String>,
    /// Concrete next steps.
    pub suggestions: Vec<String>,
    /// Long-form commentary.
    pub detailed_feedback: Option<String>,
    /// Content-safety annotations.
    pub safety_flags: Vec<String>,
    /// Model that produced the evaluation.
    pub model_id: Option<String>,
    /// Model revision reported by the provider.
    pub model_version: Option<String>,
    /// Prompt template id.
    pub prompt_id: Option<String>,
    /// Prompt template version.
    pub prompt_version: Option<String>,
    /// Provider latency.
    pub latency_ms: Option<u64>,
    /// Prompt tokens.
    pub input_tokens: Option<u64>,
    /// Completion tokens.
    pub output_tokens: Option<u64>,
    /// Cost of the provider call.
    pub cost_usd: Option<f64>,
    /// Why the last attempt failed.
    pub error_message: Option<String>,
    /// Retries so far.
    pub retry_count: u32,
    /// When the run was requested.
    pub created_at: DateTime<Utc>,
    /// When the current attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run completed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<FeedbackRun> for FeedbackRecordResponse {
    fn from(run: FeedbackRun) -> Self {
        Self {
            progress_message: run.status.progress_message(run.error_message.as_deref()),
            estimated_completion_seconds: run.status.estimated_completion_seconds(),
            id: run.id,
            assessment_id: run.assessment_id,
            status: run.status,
            rubric_id: run.rubric_id,
            score: run.score,
            criterion_scores: run.criterion_scores,
            strengths: run.strengths,
            weaknesses: run.weaknesses,
            suggestions: run.suggestions,
            detailed_feedback: run.detailed_feedback,
            safety_flags: run.safety_flags,
            model_id: run.model_id,
            model_version: run.model_version,
            prompt_id: run.prompt_id,
            prompt_version: run.prompt_version,
            latency_ms: run.latency_ms,
            input_tokens: run.input_tokens,
            output_tokens: run.output_tokens,
            cost_usd: run.cost_usd,
            error_message: run.error_message,
            retry_count: run.retry_count,
            created_at: run.created_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

/// Completed evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResultResponse {
    /// Run id.
    pub id: Uuid,
    /// Evaluated assessment.
    pub assessment_id: Uuid,
    /// Overall score.
    pub score: f64,
    /// Score per criterion.
    pub criterion_scores: BTreeMap<String, f64>,
    /// What went well.
    pub strengths: Vec<String>,
    /// What to improve.
    pub weaknesses: Vec<String>,
    /// Concrete next steps.
    pub suggestions: Vec<String>,
    /// Long-form commentary.
    pub detailed_feedback: String,
    /// Content-safety annotations.
    pub safety_flags: Vec<String>,
    /// Model that produced the evaluation.
    pub model_id: Option<String>,
    /// Prompt template version.
    pub prompt_version: Option<String>,
    /// Provider latency.
    pub latency_ms: Option<u64>,
    /// Cost of the provider call.
    pub cost_usd: Option<f64>,
    /// When the run completed.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outcome of a sandbox run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Stored submission.
    pub submission_id: Uuid,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i64,
    /// Wall-clock run time.
    pub execution_time_ms: u64,
    /// Peak memory.
    pub memory_used_mb: f64,
    /// Whether the run hit the time limit.
    pub timed_out: bool,
}

impl From<&CodeSubmission> for ExecuteResponse {
    fn from(submission: &CodeSubmission) -> Self {
        Self {
            submission_id: submission.id,
            stdout: submission.stdout.clone(),
            stderr: submission.stderr.clone(),
            exit_code: submission.exit_code,
            execution_time_ms: submission.execution_time_ms,
            memory_used_mb: submission.memory_used_mb,
            timed_out: submission.timed_out,
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` when the server answers.
    pub status: String,
    /// Active model provider.
    pub provider: String,
    /// Whether the sandbox backend is reachable.
    pub sandbox_available: bool,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Record tables.
    pub store: Store,
    /// Token verification.
    pub auth: Authenticator,
    /// Model gateway shared by chat and the pipeline.
    pub gateway: Gateway,
    /// Generation pipeline.
    pub pipeline: Pipeline,
    /// Background worker pool.
    pub jobs: JobQueue,
    /// Live chat connections.
    pub registry: ConnectionRegistry,
    /// Chat settings.
    pub chat: Arc<ChatConfig>,
    /// Code execution backend.
    pub sandbox: Arc<dyn CodeRunner>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("gateway", &self.gateway)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the services together and starts the worker pool. Must be
    /// called inside a tokio runtime.
    #[must_use]
    pub fn new(
        config: Config,
        gateway: Gateway,
        transcriber: Arc<dyn Transcriber>,
        sandbox: Arc<dyn CodeRunner>,
    ) -> Self {
        let store = Store::new();
        let registry = ConnectionRegistry::new();
        let pipeline = Pipeline::new(
            store.clone(),
            gateway.clone(),
            transcriber,
            registry.clone(),
            config.pipeline.clone(),
        );
        let jobs = JobQueue::start(
            pipeline.clone(),
            config.server.workers,
            config.server.queue_capacity,
        );
        Self {
            chat: Arc::new(config.chat.clone()),
            config,
            store,
            auth: Authenticator::new(),
            gateway,
            pipeline,
            jobs,
            registry,
            sandbox,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error returned by handlers; renders as [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(IntervueError);

impl From<IntervueError> for ApiError {
    fn from(err: IntervueError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let exposed = matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
        );
        let message = if status.is_server_error() && !exposed {
            error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            if self.0.is_client_error() {
                warn!(error = %self.0, status = status.as_u16(), "Request rejected");
            } else {
                warn!(error = %self.0, "Upstream failure");
            }
            self.0.to_string()
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Authentication
// ============================================================================

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| IntervueError::unauthorized("missing bearer token"))?;
        let identity = state
            .auth
            .verify(token)
            .await
            .ok_or_else(|| IntervueError::unauthorized("invalid or expired token"))?;
        Ok(Self(identity))
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the chat WebSocket.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .route("/assessments", post(handle_create_assessment))
        .route(
            "/assessments/:id",
            get(handle_get_assessment).delete(handle_delete_assessment),
        )
        .route("/assessments/:id/response", post(handle_submit_response))
        .route("/assessments/:id/cancel", post(handle_cancel_assessment))
        .route("/assessments/:id/messages", get(handle_list_messages))
        .route(
            "/assessments/:id/feedback",
            post(handle_request_feedback).get(handle_list_feedback),
        )
        .route("/assessments/:id/execute", post(handle_execute))
        .route("/assessments/:id/submissions", get(handle_list_submissions))
        .route("/rubrics", post(handle_create_rubric))
        .route("/feedback/:id", get(handle_get_feedback))
        .route("/feedback/:id/status", get(handle_feedback_status))
        .route("/feedback/:id/result", get(handle_feedback_result))
        .route("/feedback/:id/retry", post(handle_retry_feedback))
        .route(
            "/feedback/:id/practices",
            post(handle_request_practices).get(handle_list_practices),
        )
        .route(
            "/practice-generations/:id/status",
            get(handle_practice_status),
        )
        .route("/practices/:id/start", post(handle_start_practice))
        .route("/practices/:id/response", post(handle_practice_response))
        .route("/practices/:id/skip", post(handle_skip_practice));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws/assessments/:id", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

fn feedback_poll_url(id: Uuid) -> String {
    format!("/api/feedback/{id}/status")
}

fn practice_poll_url(id: Uuid) -> String {
    format!("/api/practice-generations/{id}/status")
}

// ============================================================================
// Handlers: assessments
// ============================================================================

/// Handler for `GET /api/health`.
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sandbox_available = state.sandbox.health_check().await.is_ok();
    Json(HealthResponse {
        status: "ok".to_string(),
        provider: state.gateway.provider_name().to_string(),
        sandbox_available,
    })
}

/// Handler for `POST /api/assessments`.
async fn handle_create_assessment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<NewAssessment>,
) -> ApiResult<(StatusCode, Json<Assessment>)> {
    let assessment = Assessment::new(user.user_id, request)?;
    info!(assessment_id = %assessment.id, topic = %assessment.topic, "Assessment created");
    state.store.insert_assessment(assessment.clone()).await;
    Ok((StatusCode::CREATED, Json(assessment)))
}

/// Handler for `GET /api/assessments/:id`.
async fn handle_get_assessment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Assessment>> {
    Ok(Json(state.store.owned_assessment(id, user.user_id).await?))
}

/// Handler for `DELETE /api/assessments/:id`.
async fn handle_delete_assessment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.delete_assessment(id, user.user_id).await?;
    info!(assessment_id = %id, "Assessment deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/assessments/:id/response`.
async fn handle_submit_response(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ResponseRequest>,
) -> ApiResult<Json<Assessment>> {
    state.store.owned_assessment(id, user.user_id).await?;
    let assessment = state
        .store
        .update_assessment(id, |a| {
            a.submit_response(request.text, request.audio_ref)?;
            Ok(a.clone())
        })
        .await?;
    info!(assessment_id = %id, "Response submitted");
    Ok(Json(assessment))
}

/// Handler for `POST /api/assessments/:id/cancel`.
async fn handle_cancel_assessment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Assessment>> {
    state.store.owned_assessment(id, user.user_id).await?;
    let assessment = state
        .store
        .update_assessment(id, |a| {
            a.cancel()?;
            Ok(a.clone())
        })
        .await?;
    info!(assessment_id = %id, "Assessment cancelled");
    Ok(Json(assessment))
}

/// Handler for `GET /api/assessments/:id/messages`.
async fn handle_list_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    state.store.owned_assessment(id, user.user_id).await?;
    Ok(Json(state.store.messages(id).await))
}

/// Handler for `POST /api/rubrics`.
async fn handle_create_rubric(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Json(request): Json<NewRubric>,
) -> ApiResult<(StatusCode, Json<Rubric>)> {
    let rubric = Rubric::new(request)?;
    info!(rubric_id = %rubric.id, name = %rubric.name, "Rubric created");
    state.store.insert_rubric(rubric.clone()).await;
    Ok((StatusCode::CREATED, Json(rubric)))
}

/// Handler for `POST /api/assessments/:id/execute`.
async fn handle_execute(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ExecuteRequest>,
) -> ApiResult<Json<ExecuteResponse>> {
    let assessment = state.store.owned_assessment(id, user.user_id).await?;
    if !assessment.status.accepts_input() {
        return Err(IntervueError::business_rule(format!(
            "Assessment is {} and no longer accepts code",
            assessment.status
        ))
        .into());
    }

    let language: Language = request.language.parse().map_err(IntervueError::from)?;
    state
        .config
        .sandbox_limits()
        .check_code(&request.code)
        .map_err(IntervueError::from)?;

    let result = state
        .sandbox
        .execute(&request.code, language)
        .await
        .map_err(IntervueError::from)?;
    let submission = CodeSubmission::new(id, language, request.code, result);
    info!(
        assessment_id = %id,
        submission_id = %submission.id,
        %language,
        exit_code = submission.exit_code,
        timed_out = submission.timed_out,
        "Code executed"
    );
    let response = ExecuteResponse::from(&submission);
    state.store.insert_submission(submission).await?;
    Ok(Json(response))
}

/// Handler for `GET /api/assessments/:id/submissions`.
async fn handle_list_submissions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CodeSubmission>>> {
    state.store.owned_assessment(id, user.user_id).await?;
    Ok(Json(state.store.submissions(id).await))
}

// ============================================================================
// Handlers: feedback and practice
// ============================================================================

/// Handler for `POST /api/assessments/:id/feedback`.
async fn handle_request_feedback(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<FeedbackRequest>>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let slot = state.jobs.reserve()?;
    let run = state
        .pipeline
        .request_feedback(id, user.user_id, request.rubric_id)
        .await?;
    slot.submit(Job::Feedback { feedback_id: run.id });
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            id: run.id,
            status: run.status,
            poll_url: feedback_poll_url(run.id),
        }),
    ))
}

/// Handler for `GET /api/assessments/:id/feedback`.
async fn handle_list_feedback(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<FeedbackRecordResponse>>> {
    state.store.owned_assessment(id, user.user_id).await?;
    let runs = state.store.feedback_runs(id).await;
    Ok(Json(runs.into_iter().map(FeedbackRecordResponse::from).collect()))
}

/// Handler for `GET /api/feedback/:id`.
async fn handle_get_feedback(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FeedbackRecordResponse>> {
    let run = state.store.owned_feedback(id, user.user_id).await?;
    Ok(Json(FeedbackRecordResponse::from(run)))
}

/// Handler for `GET /api/feedback/:id/status`.
async fn handle_feedback_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let run = state.store.owned_feedback(id, user.user_id).await?;
    Ok(Json(StatusResponse::from(&run)))
}

/// Handler for `GET /api/feedback/:id/result`.
async fn handle_feedback_result(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FeedbackResultResponse>> {
    let run = state.store.owned_feedback(id, user.user_id).await?;
    let result = run.result().ok_or_else(|| {
        IntervueError::business_rule(format!("Feedback is not ready (status: {})", run.status))
    })?;
    Ok(Json(FeedbackResultResponse {
        id: run.id,
        assessment_id: run.assessment_id,
        score: result.overall_score,
        criterion_scores: result.criterion_scores,
        strengths: result.strengths,
        weaknesses: result.weaknesses,
        suggestions: result.suggestions,
        detailed_feedback: result.detailed_feedback,
        safety_flags: result.safety_flags,
        model_id: run.model_id,
        prompt_version: run.prompt_version,
        latency_ms: run.latency_ms,
        cost_usd: run.cost_usd,
        completed_at: run.completed_at,
    }))
}

/// Handler for `POST /api/feedback/:id/retry`.
async fn handle_retry_feedback(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let slot = state.jobs.reserve()?;
    let run = state.pipeline.retry_feedback(id, user.user_id).await?;
    slot.submit(Job::Feedback { feedback_id: run.id });
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            id: run.id,
            status: run.status,
            poll_url: feedback_poll_url(run.id),
        }),
    ))
}

/// Handler for `POST /api/feedback/:id/practices`.
async fn handle_request_practices(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<PracticeRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    state.store.owned_feedback(id, user.user_id).await?;
    let slot = state.jobs.reserve()?;
    let generation = state
        .pipeline
        .request_practices(id, user.user_id, request.count, request.difficulty_ramp)
        .await?;
    slot.submit(Job::Practice {
        generation_id: generation.id,
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            id: generation.id,
            status: generation.status,
            poll_url: practice_poll_url(generation.id),
        }),
    ))
}

/// Handler for `GET /api/feedback/:id/practices`.
async fn handle_list_practices(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<PracticeItemView>>> {
    state.store.owned_feedback(id, user.user_id).await?;
    let items = state.store.deliver_practice_items(id).await;
    Ok(Json(items.iter().map(PracticeItemView::from).collect()))
}

/// Handler for `GET /api/practice-generations/:id/status`.
async fn handle_practice_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PracticeStatusResponse>> {
    let generation = state
        .store
        .owned_practice_generation(id, user.user_id)
        .await?;
    Ok(Json(PracticeStatusResponse::from(&generation)))
}

/// Handler for `POST /api/practices/:id/start`.
async fn handle_start_practice(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PracticeItemView>> {
    let item = state
        .store
        .update_practice_item(id, user.user_id, |item| {
            item.start()?;
            Ok(PracticeItemView::from(&*item))
        })
        .await?;
    Ok(Json(item))
}

/// Handler for `POST /api/practices/:id/response`.
async fn handle_practice_response(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<PracticeResponseRequest>,
) -> ApiResult<Json<PracticeItemView>> {
    let item = state
        .store
        .update_practice_item(id, user.user_id, |item| {
            item.submit_response(&request.response, request.score)?;
            Ok(PracticeItemView::from(&*item))
        })
        .await?;
    info!(practice_id = %id, "Practice response recorded");
    Ok(Json(item))
}

/// Handler for `POST /api/practices/:id/skip`.
async fn handle_skip_practice(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PracticeItemView>> {
    let item = state
        .store
        .update_practice_item(id, user.user_id, |item| {
            item.skip()?;
            Ok(PracticeItemView::from(&*item))
        })
        .await?;
    Ok(Json(item))
}

// ============================================================================
// Tests
// ============================================================================
