//! Background generation of feedback and practice items.
//!
//! HTTP handlers create a pending record and hand its id to the
//! [`JobQueue`](crate::jobs::JobQueue). A worker then drives the record
//! through `Processing` to `Completed` or `Failed`; callers learn the
//! outcome by polling the record. Failures never leave the worker: they are
//! written to the record's `error_message`.

mod feedback;
pub mod parse;
mod practice;
pub mod prompt;

use std::sync::Arc;

use intervue_provider::{Gateway, Transcriber};
use tracing::debug;
use uuid::Uuid;

use crate::chat::{ConnectionRegistry, OutboundFrame};
use crate::config::PipelineConfig;
use crate::jobs::Job;
use crate::store::Store;

pub use practice::difficulty_plan;

/// Fails a run whose assessment has neither text nor audio.
pub const NO_RESPONSE_ERROR: &str = "Assessment has no response to evaluate";

/// Everything a worker needs to run generation jobs.
#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    gateway: Gateway,
    transcriber: Arc<dyn Transcriber>,
    registry: ConnectionRegistry,
    settings: Arc<PipelineConfig>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("gateway", &self.gateway)
            .field("transcriber", &self.transcriber.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline over shared services.
    #[must_use]
    pub fn new(
        store: Store,
        gateway: Gateway,
        transcriber: Arc<dyn Transcriber>,
        registry: ConnectionRegistry,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            transcriber,
            registry,
            settings: Arc::new(settings),
        }
    }

    /// Runs one job to a terminal status.
    pub async fn run(&self, job: Job) {
        match job {
            Job::Feedback { feedback_id } => self.run_feedback(feedback_id).await,
            Job::Practice { generation_id } => self.run_practices(generation_id).await,
        }
    }

    /// Pushes a notification to the assessment's live chat connections.
    async fn notify(&self, assessment_id: Uuid, content: String) {
        let frame = OutboundFrame::notification(content);
        let delivered = self.registry.broadcast(assessment_id, &frame).await;
        debug!(%assessment_id, delivered, "Notification broadcast");
    }
}
