//! Feedback runs: scoring a submitted response.

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{parse, prompt, Pipeline, NO_RESPONSE_ERROR};
use crate::error::Result;
use crate::models::{Assessment, FeedbackResult, FeedbackRun, TranscriptStatus};

impl Pipeline {
    /// Creates a pending feedback run for an owned assessment.
    pub async fn request_feedback(
        &self,
        assessment_id: Uuid,
        owner_id: Uuid,
        rubric_id: Option<Uuid>,
    ) -> Result<FeedbackRun> {
        let assessment = self.store.owned_assessment(assessment_id, owner_id).await?;
        if let Some(rubric_id) = rubric_id {
            self.store.rubric(rubric_id).await?;
        }
        let run = FeedbackRun::new(assessment.id, owner_id, rubric_id);
        self.store.insert_feedback(run.clone()).await;
        info!(feedback_id = %run.id, %assessment_id, "Feedback requested");
        Ok(run)
    }

    /// Re-arms a failed run for another attempt.
    pub async fn retry_feedback(&self, feedback_id: Uuid, owner_id: Uuid) -> Result<FeedbackRun> {
        self.store.owned_feedback(feedback_id, owner_id).await?;
        let max_retries = self.settings.max_retries;
        let run = self
            .store
            .update_feedback(feedback_id, |run| {
                run.retry(max_retries)?;
                Ok(run.clone())
            })
            .await?;
        info!(%feedback_id, retry_count = run.retry_count, "Feedback retry queued");
        Ok(run)
    }

    /// Drives a pending run to `Completed` or `Failed`.
    #[instrument(skip(self))]
    pub async fn run_feedback(&self, feedback_id: Uuid) {
        let run = match self
            .store
            .update_feedback(feedback_id, |run| {
                run.start_processing()?;
                Ok(run.clone())
            })
            .await
        {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "Skipping feedback job");
                return;
            }
        };
        info!(assessment_id = %run.assessment_id, "Generating feedback");

        let outcome = match self.evaluate(&run).await {
            Ok(result) => self
                .store
                .complete_feedback(feedback_id, result)
                .await
                .map_err(|e| e.to_string()),
            Err(message) => Err(message),
        };

        match outcome {
            Ok(done) => {
                let score = done.score.unwrap_or_default();
                info!(score, cost_usd = ?done.cost_usd, "Feedback completed");
                self.notify(run.assessment_id, format!("Feedback ready (score {score:.0}/100)"))
                    .await;
            }
            Err(message) => {
                warn!(error = %message, "Feedback failed");
                if let Err(e) = self
                    .store
                    .update_feedback(feedback_id, |run| run.fail(message.clone()))
                    .await
                {
                    error!(error = %e, "Could not record feedback failure");
                }
                self.notify(run.assessment_id, format!("Feedback failed: {message}"))
                    .await;
            }
        }
    }

    /// Produces the evaluation for a processing run. Errors are the message
    /// stored on the failed run.
    async fn evaluate(&self, run: &FeedbackRun) -> std::result::Result<FeedbackResult, String> {
        let assessment = self
            .store
            .assessment(run.assessment_id)
            .await
            .map_err(|e| e.to_string())?;
        let answer = self.resolve_answer(&assessment).await?;
        let rubric = match run.rubric_id {
            Some(id) => Some(self.store.rubric(id).await.map_err(|e| e.to_string())?),
            None => None,
        };

        let version = self.settings.prompt_version.clone();
        let prompt_id = prompt::prompt_id("feedback", &version, Utc::now());
        let user_prompt = prompt::feedback_prompt(&assessment, &answer, rubric.as_ref());

        let generation = self
            .gateway
            .generate(
                prompt::FEEDBACK_SYSTEM_PROMPT,
                &user_prompt,
                self.settings.feedback_temperature,
                self.settings.feedback_max_tokens,
            )
            .await
            .map_err(|e| format!("Provider error: {}", e.message))?;

        let configured_model = self.gateway.model_id().to_string();
        self.store
            .update_feedback(run.id, |run| {
                run.record_generation(&configured_model, &generation, prompt_id, version);
                Ok(())
            })
            .await
            .map_err(|e| e.to_string())?;

        parse::parse_feedback(&generation.content).map_err(|e| e.to_string())
    }

    /// Written answer or stored transcript; transcribes an audio-only
    /// response on first use.
    async fn resolve_answer(&self, assessment: &Assessment) -> std::result::Result<String, String> {
        if let Some(answer) = assessment.answer() {
            return Ok(answer.to_string());
        }
        let Some(audio_ref) = assessment.audio_ref.clone() else {
            return Err(NO_RESPONSE_ERROR.to_string());
        };

        self.set_transcript(assessment.id, TranscriptStatus::Pending, None)
            .await?;
        let transcript = match self.transcriber.transcribe(&audio_ref).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                self.set_transcript(assessment.id, TranscriptStatus::Failed, None)
                    .await?;
                return Err("Transcription failed: empty transcript".to_string());
            }
            Err(e) => {
                self.set_transcript(assessment.id, TranscriptStatus::Failed, None)
                    .await?;
                return Err(format!("Transcription failed: {}", e.message));
            }
        };
        self.set_transcript(
            assessment.id,
            TranscriptStatus::Completed,
            Some(transcript.clone()),
        )
        .await?;
        info!(assessment_id = %assessment.id, "Transcript stored");
        Ok(transcript)
    }

    async fn set_transcript(
        &self,
        assessment_id: Uuid,
        status: TranscriptStatus,
        transcript: Option<String>,
    ) -> std::result::Result<(), String> {
        self.store
            .update_assessment(assessment_id, |a| {
                a.transcript_status = status;
                if transcript.is_some() {
                    a.transcript = transcript;
                }
                a.touch();
                Ok(())
            })
            .await
            .map_err(|e| e.to_string())
    }
}
