//! Practice generation: turning a completed run's weaknesses into drills.

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{parse, prompt, Pipeline};
use crate::error::{IntervueError, Result};
use crate::models::{Difficulty, PracticeGeneration, PracticeItem, PracticeStatus};

/// Difficulty for each position of a ramped batch: `count/3` easy, then
/// `count/2` medium, the rest hard.
///
/// ```
/// use intervue_server::{difficulty_plan, Difficulty};
///
/// let plan = difficulty_plan(5);
/// assert_eq!(plan, [Difficulty::Easy, Difficulty::Medium, Difficulty::Medium, Difficulty::Hard, Difficulty::Hard]);
/// ```
#[must_use]
pub fn difficulty_plan(count: usize) -> Vec<Difficulty> {
    let easy = count / 3;
    let medium = count / 2;
    let hard = count - easy - medium;
    std::iter::repeat(Difficulty::Easy)
        .take(easy)
        .chain(std::iter::repeat(Difficulty::Medium).take(medium))
        .chain(std::iter::repeat(Difficulty::Hard).take(hard))
        .collect()
}

impl Pipeline {
    /// Registers a practice generation for a completed run.
    pub async fn request_practices(
        &self,
        feedback_id: Uuid,
        owner_id: Uuid,
        count: u32,
        difficulty_ramp: bool,
    ) -> Result<PracticeGeneration> {
        let max = self.settings.max_practice_count;
        if count == 0 || count > max {
            return Err(IntervueError::validation(format!(
                "count must be between 1 and {max}"
            )));
        }
        let generation = self
            .store
            .create_practice_generation(feedback_id, owner_id, count, difficulty_ramp)
            .await?;
        info!(generation_id = %generation.id, %feedback_id, count, "Practice generation requested");
        Ok(generation)
    }

    /// Drives a pending practice generation to `Completed` or `Failed`.
    #[instrument(skip(self))]
    pub async fn run_practices(&self, generation_id: Uuid) {
        let generation = match self
            .store
            .update_practice_generation(generation_id, |g| {
                g.start_processing()?;
                Ok(g.clone())
            })
            .await
        {
            Ok(generation) => generation,
            Err(e) => {
                warn!(error = %e, "Skipping practice job");
                return;
            }
        };

        let assessment_id = match self.store.feedback(generation.feedback_id).await {
            Ok(run) => Some(run.assessment_id),
            Err(_) => None,
        };

        let outcome = match self.generate_items(&generation).await {
            Ok(items) => self
                .store
                .commit_practice_batch(generation_id, items)
                .await
                .map_err(|e| e.to_string()),
            Err(message) => Err(message),
        };

        let notice = match outcome {
            Ok(item_count) => {
                info!(item_count, "Practice items generated");
                format!("{item_count} practice items ready")
            }
            Err(message) => {
                warn!(error = %message, "Practice generation failed");
                if let Err(e) = self
                    .store
                    .update_practice_generation(generation_id, |g| g.fail(message.clone()))
                    .await
                {
                    error!(error = %e, "Could not record practice failure");
                }
                format!("Practice generation failed: {message}")
            }
        };
        if let Some(assessment_id) = assessment_id {
            self.notify(assessment_id, notice).await;
        }
    }

    async fn generate_items(
        &self,
        generation: &PracticeGeneration,
    ) -> std::result::Result<Vec<PracticeItem>, String> {
        let run = self
            .store
            .feedback(generation.feedback_id)
            .await
            .map_err(|e| e.to_string())?;
        let assessment = self
            .store
            .assessment(run.assessment_id)
            .await
            .map_err(|e| e.to_string())?;

        let count = usize::try_from(generation.count).map_err(|e| e.to_string())?;
        let plan = (generation.difficulty_ramp && count >= 3).then(|| difficulty_plan(count));
        let user_prompt = prompt::practice_prompt(&assessment, &run, count, plan.as_deref());

        let generation_result = self
            .gateway
            .generate(
                prompt::PRACTICE_SYSTEM_PROMPT,
                &user_prompt,
                self.settings.practice_temperature,
                self.settings.practice_max_tokens,
            )
            .await
            .map_err(|e| format!("Provider error: {}", e.message))?;
        info!(
            cost_usd = generation_result.cost_usd,
            latency_ms = generation_result.latency_ms,
            "Practice generation call completed"
        );

        let drafts =
            parse::parse_practices(&generation_result.content, count).map_err(|e| e.to_string())?;
        let orders = parse::sequence_orders(&drafts);
        let now = Utc::now();

        Ok(drafts
            .into_iter()
            .zip(orders)
            .enumerate()
            .map(|(position, (draft, sequence_order))| {
                let planned = plan.as_ref().and_then(|p| p.get(position)).copied();
                PracticeItem {
                    id: Uuid::new_v4(),
                    feedback_id: run.id,
                    owner_id: generation.owner_id,
                    practice_type: draft.practice_type,
                    difficulty: draft
                        .difficulty
                        .or(planned)
                        .unwrap_or(assessment.difficulty),
                    target_weakness: draft.target_weakness,
                    prompt: draft.prompt,
                    expected_answer: draft.expected_answer,
                    hints: draft.hints,
                    status: PracticeStatus::Pending,
                    delivered: false,
                    delivered_at: None,
                    user_response: None,
                    score: None,
                    sequence_order,
                    created_at: now,
                }
            })
            .collect())
    }
}
