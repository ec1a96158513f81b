//! In-memory record store.
//!
//! All tables live behind one `tokio::sync::RwLock`. Every mutation runs as
//! a closure against a copy of the record under the write lock and is only
//! committed when the closure succeeds, so status checks and transitions are
//! atomic and a rejected change leaves nothing behind. Readers get clones.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{IntervueError, Result};
use crate::models::{
    Assessment, AssessmentStatus, CodeSubmission, FeedbackResult, FeedbackRun, GenerationStatus,
    Message, PracticeGeneration, PracticeItem, Rubric, Sender,
};

#[derive(Debug, Default)]
struct Tables {
    assessments: HashMap<Uuid, Assessment>,
    rubrics: HashMap<Uuid, Rubric>,
    feedback: HashMap<Uuid, FeedbackRun>,
    practice_generations: HashMap<Uuid, PracticeGeneration>,
    /// Keyed by feedback run.
    practice_items: HashMap<Uuid, Vec<PracticeItem>>,
    /// Keyed by assessment, in creation order.
    messages: HashMap<Uuid, Vec<Message>>,
    /// Keyed by assessment.
    submissions: HashMap<Uuid, Vec<CodeSubmission>>,
}

/// Runs `f` on a copy of `record` and commits the copy only on success.
fn apply<R: Clone, T>(record: &mut R, f: impl FnOnce(&mut R) -> Result<T>) -> Result<T> {
    let mut draft = record.clone();
    let out = f(&mut draft)?;
    *record = draft;
    Ok(out)
}

/// Shared handle to the record tables. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Tables>>,
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Assessments
    // ------------------------------------------------------------------------

    /// Inserts a new assessment.
    pub async fn insert_assessment(&self, assessment: Assessment) {
        self.inner
            .write()
            .await
            .assessments
            .insert(assessment.id, assessment);
    }

    /// Looks up an assessment regardless of owner.
    pub async fn assessment(&self, id: Uuid) -> Result<Assessment> {
        self.inner
            .read()
            .await
            .assessments
            .get(&id)
            .cloned()
            .ok_or_else(|| IntervueError::not_found("Assessment", id))
    }

    /// Looks up an assessment owned by `owner_id`. Someone else's assessment
    /// is reported as not found.
    pub async fn owned_assessment(&self, id: Uuid, owner_id: Uuid) -> Result<Assessment> {
        self.assessment(id)
            .await
            .ok()
            .filter(|a| a.owner_id == owner_id)
            .ok_or_else(|| IntervueError::not_found("Assessment", id))
    }

    /// Applies `f` to an assessment transactionally.
    pub async fn update_assessment<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Assessment) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.inner.write().await;
        let record = tables
            .assessments
            .get_mut(&id)
            .ok_or_else(|| IntervueError::not_found("Assessment", id))?;
        apply(record, f)
    }

    /// Deletes an assessment owned by `owner_id` together with its messages,
    /// code submissions, feedback runs and their practice data.
    pub async fn delete_assessment(&self, id: Uuid, owner_id: Uuid) -> Result<()> {
        let mut tables = self.inner.write().await;
        match tables.assessments.get(&id) {
            Some(a) if a.owner_id == owner_id => {}
            _ => return Err(IntervueError::not_found("Assessment", id)),
        }
        tables.assessments.remove(&id);
        tables.messages.remove(&id);
        tables.submissions.remove(&id);

        let runs: Vec<Uuid> = tables
            .feedback
            .values()
            .filter(|r| r.assessment_id == id)
            .map(|r| r.id)
            .collect();
        for run_id in &runs {
            tables.feedback.remove(run_id);
            tables.practice_items.remove(run_id);
        }
        tables
            .practice_generations
            .retain(|_, g| !runs.contains(&g.feedback_id));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Rubrics
    // ------------------------------------------------------------------------

    /// Inserts a rubric.
    pub async fn insert_rubric(&self, rubric: Rubric) {
        self.inner.write().await.rubrics.insert(rubric.id, rubric);
    }

    /// Looks up a rubric.
    pub async fn rubric(&self, id: Uuid) -> Result<Rubric> {
        self.inner
            .read()
            .await
            .rubrics
            .get(&id)
            .cloned()
            .ok_or_else(|| IntervueError::not_found("Rubric", id))
    }

    // ------------------------------------------------------------------------
    // Feedback runs
    // ------------------------------------------------------------------------

    /// Inserts a feedback run.
    pub async fn insert_feedback(&self, run: FeedbackRun) {
        self.inner.write().await.feedback.insert(run.id, run);
    }

    /// Looks up a feedback run regardless of owner.
    pub async fn feedback(&self, id: Uuid) -> Result<FeedbackRun> {
        self.inner
            .read()
            .await
            .feedback
            .get(&id)
            .cloned()
            .ok_or_else(|| IntervueError::not_found("Feedback", id))
    }

    /// Looks up a feedback run owned by `owner_id`.
    pub async fn owned_feedback(&self, id: Uuid, owner_id: Uuid) -> Result<FeedbackRun> {
        self.feedback(id)
            .await
            .ok()
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| IntervueError::not_found("Feedback", id))
    }

    /// Feedback runs of an assessment, oldest first.
    pub async fn feedback_runs(&self, assessment_id: Uuid) -> Vec<FeedbackRun> {
        let mut runs: Vec<FeedbackRun> = self
            .inner
            .read()
            .await
            .feedback
            .values()
            .filter(|r| r.assessment_id == assessment_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    /// Applies `f` to a feedback run transactionally.
    pub async fn update_feedback<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut FeedbackRun) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.inner.write().await;
        let record = tables
            .feedback
            .get_mut(&id)
            .ok_or_else(|| IntervueError::not_found("Feedback", id))?;
        apply(record, f)
    }

    /// Completes a feedback run and, when its assessment is waiting for
    /// feedback, completes the assessment with the same score. Both records
    /// change together or not at all.
    pub async fn complete_feedback(&self, id: Uuid, result: FeedbackResult) -> Result<FeedbackRun> {
        let mut tables = self.inner.write().await;
        let tables = &mut *tables;
        let record = tables
            .feedback
            .get_mut(&id)
            .ok_or_else(|| IntervueError::not_found("Feedback", id))?;

        let mut run = record.clone();
        let score = result.overall_score;
        run.complete(result)?;

        if let Some(assessment) = tables.assessments.get_mut(&run.assessment_id) {
            if assessment.status == AssessmentStatus::AwaitingFeedback {
                apply(assessment, |a| a.complete(score))?;
            }
        }
        *record = run.clone();
        Ok(run)
    }

    // ------------------------------------------------------------------------
    // Practice
    // ------------------------------------------------------------------------

    /// Registers a practice generation for a completed feedback run.
    ///
    /// Rejected when the run is not completed, already has items, or has
    /// another generation queued or running.
    pub async fn create_practice_generation(
        &self,
        feedback_id: Uuid,
        owner_id: Uuid,
        count: u32,
        difficulty_ramp: bool,
    ) -> Result<PracticeGeneration> {
        let mut tables = self.inner.write().await;
        let run = tables
            .feedback
            .get(&feedback_id)
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| IntervueError::not_found("Feedback", feedback_id))?;

        if run.status != GenerationStatus::Completed {
            return Err(IntervueError::business_rule(format!(
                "Feedback must be completed before generating practice (status: {})",
                run.status
            )));
        }
        if tables
            .practice_items
            .get(&feedback_id)
            .is_some_and(|items| !items.is_empty())
        {
            return Err(IntervueError::business_rule(
                "Practice items have already been generated for this feedback",
            ));
        }
        if tables
            .practice_generations
            .values()
            .any(|g| g.feedback_id == feedback_id && g.status.is_active())
        {
            return Err(IntervueError::business_rule(
                "Practice generation is already in progress for this feedback",
            ));
        }

        let generation = PracticeGeneration::new(feedback_id, owner_id, count, difficulty_ramp);
        tables
            .practice_generations
            .insert(generation.id, generation.clone());
        Ok(generation)
    }

    /// Looks up a practice generation regardless of owner.
    pub async fn practice_generation(&self, id: Uuid) -> Result<PracticeGeneration> {
        self.inner
            .read()
            .await
            .practice_generations
            .get(&id)
            .cloned()
            .ok_or_else(|| IntervueError::not_found("Practice generation", id))
    }

    /// Looks up a practice generation owned by `owner_id`.
    pub async fn owned_practice_generation(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<PracticeGeneration> {
        self.practice_generation(id)
            .await
            .ok()
            .filter(|g| g.owner_id == owner_id)
            .ok_or_else(|| IntervueError::not_found("Practice generation", id))
    }

    /// Applies `f` to a practice generation transactionally.
    pub async fn update_practice_generation<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut PracticeGeneration) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.inner.write().await;
        let record = tables
            .practice_generations
            .get_mut(&id)
            .ok_or_else(|| IntervueError::not_found("Practice generation", id))?;
        apply(record, f)
    }

    /// Stores a generated batch and completes its generation in one step.
    pub async fn commit_practice_batch(
        &self,
        generation_id: Uuid,
        items: Vec<PracticeItem>,
    ) -> Result<usize> {
        let mut tables = self.inner.write().await;
        let tables = &mut *tables;
        let generation = tables
            .practice_generations
            .get_mut(&generation_id)
            .ok_or_else(|| IntervueError::not_found("Practice generation", generation_id))?;

        let feedback_id = generation.feedback_id;
        if tables
            .practice_items
            .get(&feedback_id)
            .is_some_and(|existing| !existing.is_empty())
        {
            return Err(IntervueError::business_rule(
                "Practice items have already been generated for this feedback",
            ));
        }

        let count = items.len();
        apply(generation, |g| g.complete(count))?;
        tables.practice_items.insert(feedback_id, items);
        Ok(count)
    }

    /// Items of a feedback run in `sequence_order`.
    pub async fn practice_items(&self, feedback_id: Uuid) -> Vec<PracticeItem> {
        let mut items = self
            .inner
            .read()
            .await
            .practice_items
            .get(&feedback_id)
            .cloned()
            .unwrap_or_default();
        items.sort_by_key(|i| i.sequence_order);
        items
    }

    /// Lists a feedback run's items in `sequence_order`, marking each one as
    /// delivered.
    pub async fn deliver_practice_items(&self, feedback_id: Uuid) -> Vec<PracticeItem> {
        let now = Utc::now();
        let mut tables = self.inner.write().await;
        let Some(items) = tables.practice_items.get_mut(&feedback_id) else {
            return Vec::new();
        };
        for item in items.iter_mut() {
            item.mark_delivered(now);
        }
        let mut listed = items.clone();
        listed.sort_by_key(|i| i.sequence_order);
        listed
    }

    /// Applies `f` to a practice item owned by `owner_id` transactionally.
    pub async fn update_practice_item<T>(
        &self,
        item_id: Uuid,
        owner_id: Uuid,
        f: impl FnOnce(&mut PracticeItem) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.inner.write().await;
        let item = tables
            .practice_items
            .values_mut()
            .flat_map(|items| items.iter_mut())
            .find(|i| i.id == item_id && i.owner_id == owner_id)
            .ok_or_else(|| IntervueError::not_found("Practice item", item_id))?;
        apply(item, f)
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// Appends a message to its conversation. Fails when the assessment
    /// has been deleted.
    pub async fn append_message(&self, message: Message) -> Result<()> {
        let mut tables = self.inner.write().await;
        if !tables.assessments.contains_key(&message.assessment_id) {
            return Err(IntervueError::not_found("Assessment", message.assessment_id));
        }
        tables
            .messages
            .entry(message.assessment_id)
            .or_default()
            .push(message);
        Ok(())
    }

    /// Whole conversation in creation order.
    pub async fn messages(&self, assessment_id: Uuid) -> Vec<Message> {
        self.inner
            .read()
            .await
            .messages
            .get(&assessment_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Last `limit` messages in creation order.
    pub async fn recent_messages(&self, assessment_id: Uuid, limit: usize) -> Vec<Message> {
        let tables = self.inner.read().await;
        let Some(all) = tables.messages.get(&assessment_id) else {
            return Vec::new();
        };
        all[all.len().saturating_sub(limit)..].to_vec()
    }

    /// Most recent interviewer message.
    pub async fn latest_ai_message(&self, assessment_id: Uuid) -> Option<Message> {
        self.inner
            .read()
            .await
            .messages
            .get(&assessment_id)
            .and_then(|all| all.iter().rev().find(|m| m.sender == Sender::Ai).cloned())
    }

    // ------------------------------------------------------------------------
    // Code submissions
    // ------------------------------------------------------------------------

    /// Records a sandbox run. Fails when the assessment has been deleted.
    pub async fn insert_submission(&self, submission: CodeSubmission) -> Result<()> {
        let mut tables = self.inner.write().await;
        if !tables.assessments.contains_key(&submission.assessment_id) {
            return Err(IntervueError::not_found("Assessment", submission.assessment_id));
        }
        tables
            .submissions
            .entry(submission.assessment_id)
            .or_default()
            .push(submission);
        Ok(())
    }

    /// Sandbox runs of an assessment in submission order.
    pub async fn submissions(&self, assessment_id: Uuid) -> Vec<CodeSubmission> {
        self.inner
            .read()
            .await
            .submissions
            .get(&assessment_id)
            .cloned()
            .unwrap_or_default()
    }
}
