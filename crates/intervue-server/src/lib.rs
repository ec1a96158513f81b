//! Intervue Server
//!
//! Assessments, background feedback and practice generation, interview
//! chat over WebSocket, and sandboxed code execution behind one HTTP API.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod pipeline;
pub mod store;

pub use api::{
    create_router, AcceptedResponse, ApiError, AppState, AuthUser, ErrorResponse,
    ExecuteRequest, ExecuteResponse, FeedbackRequest, FeedbackResultResponse, HealthResponse,
    PracticeRequest, PracticeStatusResponse, ResponseRequest, StatusResponse,
};
pub use auth::{bearer_token, cookie_token, Authenticator, Identity};
pub use chat::{
    ChatSession, ConnectionRegistry, FrameKind, OutboundFrame, Rejection, Turn, CLOSE_NORMAL,
    CLOSE_POLICY_VIOLATION,
};
pub use config::{
    ChatConfig, Config, PipelineConfig, ProviderSettings, SandboxConfig, ServerConfig,
    ANTHROPIC_API_KEY_ENV, OPENAI_API_KEY_ENV, PROVIDER_ENV,
};
pub use error::{IntervueError, Result};
pub use jobs::{Job, JobHandle, JobQueue, JobSlot};
pub use models::{
    Assessment, AssessmentStatus, CodeSubmission, Difficulty, FeedbackResult, FeedbackRun,
    GenerationStatus, Message, NewAssessment, NewRubric, PracticeGeneration, PracticeItem,
    PracticeItemView, PracticeStatus, PracticeType, Rubric, RubricCriterion, Sender,
    TranscriptStatus,
};
pub use pipeline::{difficulty_plan, Pipeline};
pub use store::Store;
