//! Domain records and their state machines.
//!
//! Every status change goes through a method that checks the transition
//! table first. An illegal move returns
//! [`IntervueError::InvalidStateTransition`] and leaves the record as it was.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use intervue_provider::Generation;
use intervue_sandbox::{ExecutionResult, Language};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IntervueError, Result};

// ============================================================================
// Difficulty
// ============================================================================

/// Interview difficulty. Ordered from easiest to hardest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    /// Warm-up level.
    Easy,
    /// Default level.
    #[default]
    Medium,
    /// Senior level.
    Hard,
}

impl Difficulty {
    /// Parses a string into a `Difficulty`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid difficulty '{s}': expected one of 'easy', 'medium', 'hard'"
            ))
        })
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Assessment
// ============================================================================

/// Lifecycle of an assessment.
///
/// - `Created` -> `InProgress` -> `AwaitingFeedback` -> `Completed`
/// - any non-terminal status -> `Cancelled`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    /// Created, no conversation yet.
    #[default]
    Created,
    /// The candidate is answering.
    InProgress,
    /// A response was submitted; feedback pending.
    AwaitingFeedback,
    /// Scored.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl AssessmentStatus {
    /// Snake-case name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::AwaitingFeedback => "awaiting_feedback",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` if this status represents a terminal state.
    ///
    /// # Examples
    ///
    /// ```
    /// use intervue_server::AssessmentStatus;
    ///
    /// assert!(AssessmentStatus::Completed.is_terminal());
    /// assert!(AssessmentStatus::Cancelled.is_terminal());
    /// assert!(!AssessmentStatus::AwaitingFeedback.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns `true` while the candidate may chat or run code.
    #[must_use]
    pub const fn accepts_input(self) -> bool {
        matches!(self, Self::Created | Self::InProgress)
    }

    /// Returns `true` if `self -> to` is a legal move.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::InProgress)
                | (Self::InProgress, Self::AwaitingFeedback)
                | (Self::AwaitingFeedback, Self::Completed)
                | (
                    Self::Created | Self::InProgress | Self::AwaitingFeedback,
                    Self::Cancelled
                )
        )
    }
}

impl std::fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of speech-to-text for an audio response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    /// No audio was submitted.
    #[default]
    NotRequested,
    /// Transcription is running.
    Pending,
    /// Transcript stored.
    Completed,
    /// Transcription failed.
    Failed,
}

/// Fields a caller supplies when creating an assessment.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssessment {
    /// Subject of the interview, e.g. "Arrays".
    pub topic: String,
    /// Role being practiced for.
    #[serde(default)]
    pub role: String,
    /// Requested difficulty.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Skills the candidate wants to exercise.
    #[serde(default)]
    pub skill_targets: Vec<String>,
    /// Interview question, if fixed up front.
    #[serde(default)]
    pub question: Option<String>,
    /// Free-form background for the interviewer.
    #[serde(default)]
    pub context: Option<String>,
}

/// One practice interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Identifier.
    pub id: Uuid,
    /// Owning user.
    pub owner_id: Uuid,
    /// Subject of the interview.
    pub topic: String,
    /// Role being practiced for.
    pub role: String,
    /// Difficulty level.
    pub difficulty: Difficulty,
    /// Skills the candidate wants to exercise.
    pub skill_targets: Vec<String>,
    /// Interview question.
    pub question: Option<String>,
    /// Free-form background.
    pub context: Option<String>,
    /// Written answer.
    pub response_text: Option<String>,
    /// Reference to a recorded answer.
    pub audio_ref: Option<String>,
    /// Transcript of the recorded answer.
    pub transcript: Option<String>,
    /// Speech-to-text progress.
    pub transcript_status: TranscriptStatus,
    /// Lifecycle status.
    pub status: AssessmentStatus,
    /// Overall score copied from completed feedback.
    pub score: Option<f64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Assessment {
    /// Creates an assessment in `Created` status.
    pub fn new(owner_id: Uuid, fields: NewAssessment) -> Result<Self> {
        let topic = fields.topic.trim();
        if topic.is_empty() {
            return Err(IntervueError::validation("topic must not be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            topic: topic.to_string(),
            role: fields.role.trim().to_string(),
            difficulty: fields.difficulty,
            skill_targets: fields.skill_targets,
            question: fields.question.filter(|q| !q.trim().is_empty()),
            context: fields.context.filter(|c| !c.trim().is_empty()),
            response_text: None,
            audio_ref: None,
            transcript: None,
            transcript_status: TranscriptStatus::NotRequested,
            status: AssessmentStatus::Created,
            score: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn transition(&mut self, to: AssessmentStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(IntervueError::invalid_transition(self.status, to));
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Updates the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// `Created -> InProgress`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(AssessmentStatus::InProgress)
    }

    /// Stores the candidate's answer and moves to `AwaitingFeedback`,
    /// passing through `InProgress` when the interview never started.
    pub fn submit_response(
        &mut self,
        text: Option<String>,
        audio_ref: Option<String>,
    ) -> Result<()> {
        let text = text.filter(|t| !t.trim().is_empty());
        let audio_ref = audio_ref.filter(|a| !a.trim().is_empty());
        if text.is_none() && audio_ref.is_none() {
            return Err(IntervueError::validation(
                "a response needs text or an audio reference",
            ));
        }
        if self.status == AssessmentStatus::Created {
            self.start()?;
        }
        self.transition(AssessmentStatus::AwaitingFeedback)?;
        if audio_ref.is_some() && text.is_none() {
            self.transcript_status = TranscriptStatus::Pending;
        }
        self.response_text = text;
        self.audio_ref = audio_ref;
        self.transcript = None;
        Ok(())
    }

    /// `AwaitingFeedback -> Completed`, recording the score.
    pub fn complete(&mut self, score: f64) -> Result<()> {
        self.transition(AssessmentStatus::Completed)?;
        self.score = Some(score);
        Ok(())
    }

    /// Any non-terminal status -> `Cancelled`.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(AssessmentStatus::Cancelled)
    }

    /// Written answer, or the stored transcript of a recorded one.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.response_text
            .as_deref()
            .or(self.transcript.as_deref())
            .filter(|a| !a.trim().is_empty())
    }
}

// ============================================================================
// Rubric
// ============================================================================

/// One scored dimension of a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    /// Short name, used as the key in criterion scores.
    pub name: String,
    /// What the criterion measures.
    #[serde(default)]
    pub description: String,
    /// Relative weight.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

const fn default_weight() -> f64 {
    1.0
}

/// Fields a caller supplies when creating a rubric.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRubric {
    /// Display name.
    pub name: String,
    /// Revision number.
    #[serde(default = "default_rubric_version")]
    pub version: u32,
    /// Criteria to score.
    pub criteria: Vec<RubricCriterion>,
}

const fn default_rubric_version() -> u32 {
    1
}

/// Named set of scoring criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    /// Identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Revision number.
    pub version: u32,
    /// Criteria to score.
    pub criteria: Vec<RubricCriterion>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Rubric {
    /// Validates and creates a rubric.
    pub fn new(fields: NewRubric) -> Result<Self> {
        if fields.name.trim().is_empty() {
            return Err(IntervueError::validation("rubric name must not be empty"));
        }
        if fields.criteria.is_empty() {
            return Err(IntervueError::validation(
                "a rubric needs at least one criterion",
            ));
        }
        if let Some(bad) = fields
            .criteria
            .iter()
            .find(|c| c.name.trim().is_empty() || !(c.weight.is_finite() && c.weight > 0.0))
        {
            return Err(IntervueError::validation(format!(
                "criterion '{}' needs a name and a positive weight",
                bad.name
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: fields.name.trim().to_string(),
            version: fields.version,
            criteria: fields.criteria,
            created_at: Utc::now(),
        })
    }
}

// ============================================================================
// GenerationStatus
// ============================================================================

/// Status of a background generation (feedback run or practice batch).
///
/// - `Pending` -> `Processing` -> `Completed` | `Failed`
/// - `Failed` -> `Pending` on explicit retry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Queued.
    #[default]
    Pending,
    /// A worker is generating.
    Processing,
    /// Result stored.
    Completed,
    /// Generation failed; see the error message.
    Failed,
}

impl GenerationStatus {
    /// Snake-case name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` if this status represents a terminal state.
    ///
    /// # Examples
    ///
    /// ```
    /// use intervue_server::GenerationStatus;
    ///
    /// assert!(GenerationStatus::Completed.is_terminal());
    /// assert!(GenerationStatus::Failed.is_terminal());
    /// assert!(!GenerationStatus::Processing.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` while a generation is queued or running.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Returns `true` if `self -> to` is a legal move.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    /// Human-readable progress for pollers.
    #[must_use]
    pub fn progress_message(self, error: Option<&str>) -> String {
        match self {
            Self::Pending => "Waiting to start processing".to_string(),
            Self::Processing => "Analyzing response...".to_string(),
            Self::Completed => "Feedback ready".to_string(),
            Self::Failed => format!("Failed: {}", error.unwrap_or("unknown error")),
        }
    }

    /// Rough seconds until completion; `None` once failed.
    #[must_use]
    pub const fn estimated_completion_seconds(self) -> Option<u32> {
        match self {
            Self::Pending => Some(10),
            Self::Processing => Some(5),
            Self::Completed => Some(0),
            Self::Failed => None,
        }
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_generation(from: GenerationStatus, to: GenerationStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(IntervueError::invalid_transition(from, to))
    }
}

// ============================================================================
// FeedbackRun
// ============================================================================

/// Parsed content of a model's evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResult {
    /// Overall score in `[0, 100]`.
    pub overall_score: f64,
    /// Score per rubric criterion.
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
}

/// One evaluation attempt of an assessment's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRun {
    /// Identifier.
    pub id: Uuid,
    /// Evaluated assessment.
    pub assessment_id: Uuid,
    /// Owner of the assessment.
    pub owner_id: Uuid,
    /// Generation status.
    pub status: GenerationStatus,
    /// Optional rubric the run scores against.
    pub rubric_id: Option<Uuid>,
    /// Configured model.
    pub model_id: Option<String>,
    /// Model reported by the provider.
    pub model_version: Option<String>,
    /// Identity of the prompt that was sent.
    pub prompt_id: Option<String>,
    /// Prompt template version.
    pub prompt_version: Option<String>,
    /// Overall score.
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
    /// Provider latency.
    pub latency_ms: Option<u64>,
    /// Prompt tokens billed.
    pub input_tokens: Option<u64>,
    /// Completion tokens billed.
    pub output_tokens: Option<u64>,
    /// Cost of the provider call.
    pub cost_usd: Option<f64>,
    /// Why the last attempt failed.
    pub error_message: Option<String>,
    /// Explicit retries so far.
    pub retry_count: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the current attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the current attempt ended.
    pub completed_at: Option<DateTime<Utc>>,
}

impl FeedbackRun {
    /// Creates a pending run.
    #[must_use]
    pub fn new(assessment_id: Uuid, owner_id: Uuid, rubric_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            assessment_id,
            owner_id,
            status: GenerationStatus::Pending,
            rubric_id,
            model_id: None,
            model_version: None,
            prompt_id: None,
            prompt_version: None,
            score: None,
            criterion_scores: BTreeMap::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            suggestions: Vec::new(),
            detailed_feedback: None,
            safety_flags: Vec::new(),
            latency_ms: None,
            input_tokens: None,
            output_tokens: None,
            cost_usd: None,
            error_message: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// `Pending -> Processing`.
    pub fn start_processing(&mut self) -> Result<()> {
        check_generation(self.status, GenerationStatus::Processing)?;
        self.status = GenerationStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Records the prompt identity and the provider call accounting.
    pub fn record_generation(
        &mut self,
        configured_model: &str,
        generation: &Generation,
        prompt_id: String,
        prompt_version: String,
    ) {
        self.model_id = Some(configured_model.to_string());
        self.model_version = Some(generation.model_id.clone());
        self.prompt_id = Some(prompt_id);
        self.prompt_version = Some(prompt_version);
        self.latency_ms = Some(generation.latency_ms);
        self.input_tokens = Some(generation.input_tokens);
        self.output_tokens = Some(generation.output_tokens);
        self.cost_usd = Some(generation.cost_usd);
    }

    /// `Processing -> Completed`, storing the parsed evaluation.
    pub fn complete(&mut self, result: FeedbackResult) -> Result<()> {
        check_generation(self.status, GenerationStatus::Completed)?;
        self.status = GenerationStatus::Completed;
        self.score = Some(result.overall_score);
        self.criterion_scores = result.criterion_scores;
        self.strengths = result.strengths;
        self.weaknesses = result.weaknesses;
        self.suggestions = result.suggestions;
        self.detailed_feedback = Some(result.detailed_feedback);
        self.safety_flags = result.safety_flags;
        self.error_message = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `Processing -> Failed`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        check_generation(self.status, GenerationStatus::Failed)?;
        self.status = GenerationStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `Failed -> Pending` while fewer than `max_retries` retries were made.
    ///
    /// Clears every result and error field of the previous attempt.
    pub fn retry(&mut self, max_retries: u32) -> Result<()> {
        check_generation(self.status, GenerationStatus::Pending)?;
        if self.retry_count >= max_retries {
            return Err(IntervueError::business_rule(format!(
                "Maximum retry count ({max_retries}) reached"
            )));
        }
        let retry_count = self.retry_count + 1;
        *self = Self {
            id: self.id,
            assessment_id: self.assessment_id,
            owner_id: self.owner_id,
            rubric_id: self.rubric_id,
            created_at: self.created_at,
            retry_count,
            ..Self::new(self.assessment_id, self.owner_id, self.rubric_id)
        };
        Ok(())
    }

    /// Parsed evaluation of a completed run.
    #[must_use]
    pub fn result(&self) -> Option<FeedbackResult> {
        if self.status != GenerationStatus::Completed {
            return None;
        }
        Some(FeedbackResult {
            overall_score: self.score?,
            criterion_scores: self.criterion_scores.clone(),
            strengths: self.strengths.clone(),
            weaknesses: self.weaknesses.clone(),
            suggestions: self.suggestions.clone(),
            detailed_feedback: self.detailed_feedback.clone().unwrap_or_default(),
            safety_flags: self.safety_flags.clone(),
        })
    }
}

// ============================================================================
// Practice
// ============================================================================

/// Kind of practice item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PracticeType {
    /// Open question.
    #[default]
    Question,
    /// Small coding task.
    CodeExercise,
    /// Revisit a concept.
    ConceptReview,
    /// Role-played situation.
    MockScenario,
}

impl PracticeType {
    /// Parses a practice type, accepting snake, kebab or spaced spellings.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "question" => Some(Self::Question),
            "code_exercise" | "coding" | "code" => Some(Self::CodeExercise),
            "concept_review" | "concept" => Some(Self::ConceptReview),
            "mock_scenario" | "scenario" => Some(Self::MockScenario),
            _ => None,
        }
    }

    /// Snake-case name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::CodeExercise => "code_exercise",
            Self::ConceptReview => "concept_review",
            Self::MockScenario => "mock_scenario",
        }
    }
}

impl<'de> Deserialize<'de> for PracticeType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid practice type '{s}': expected one of 'question', 'code_exercise', 'concept_review', 'mock_scenario'"
            ))
        })
    }
}

impl Serialize for PracticeType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Progress of the candidate on one practice item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeStatus {
    /// Not started.
    #[default]
    Pending,
    /// Being worked on.
    InProgress,
    /// Answered.
    Completed,
    /// Skipped.
    Skipped,
}

impl PracticeStatus {
    /// Snake-case name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    /// Returns `true` once the candidate is done with the item.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for PracticeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One targeted drill generated from a feedback run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeItem {
    /// Identifier.
    pub id: Uuid,
    /// Feedback run the item was generated from.
    pub feedback_id: Uuid,
    /// Owning user.
    pub owner_id: Uuid,
    /// Kind of drill.
    pub practice_type: PracticeType,
    /// Difficulty level.
    pub difficulty: Difficulty,
    /// Weakness the drill addresses.
    pub target_weakness: String,
    /// What the candidate is asked to do.
    pub prompt: String,
    /// Model answer; withheld until the item is completed.
    pub expected_answer: Option<String>,
    /// Progressive hints.
    pub hints: Vec<String>,
    /// Candidate progress.
    pub status: PracticeStatus,
    /// Whether the item has been listed to the candidate.
    pub delivered: bool,
    /// First time the item was listed.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Candidate's answer.
    pub user_response: Option<String>,
    /// Score of the candidate's answer.
    pub score: Option<f64>,
    /// Position within its batch, `0..N-1`.
    pub sequence_order: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl PracticeItem {
    /// Marks the item as listed to the candidate. Idempotent.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) {
        if !self.delivered {
            self.delivered = true;
            self.delivered_at = Some(at);
        }
    }

    /// `Pending -> InProgress`.
    pub fn start(&mut self) -> Result<()> {
        if self.status != PracticeStatus::Pending {
            return Err(IntervueError::invalid_transition(
                self.status,
                PracticeStatus::InProgress,
            ));
        }
        self.status = PracticeStatus::InProgress;
        Ok(())
    }

    /// Records the candidate's answer and an optional self-assessed score
    /// in `[0, 100]`, completing the item. This reveals `expected_answer`.
    pub fn submit_response(&mut self, response: &str, score: Option<f64>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(IntervueError::invalid_transition(
                self.status,
                PracticeStatus::Completed,
            ));
        }
        let response = response.trim();
        if response.is_empty() {
            return Err(IntervueError::validation("response cannot be empty"));
        }
        if let Some(score) = score {
            if !(0.0..=100.0).contains(&score) {
                return Err(IntervueError::validation(format!(
                    "score must be between 0 and 100, got {score}"
                )));
            }
        }
        self.status = PracticeStatus::Completed;
        self.user_response = Some(response.to_string());
        self.score = score;
        Ok(())
    }

    /// Any non-terminal status -> `Skipped`.
    pub fn skip(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(IntervueError::invalid_transition(
                self.status,
                PracticeStatus::Skipped,
            ));
        }
        self.status = PracticeStatus::Skipped;
        Ok(())
    }
}

/// What a candidate sees of a practice item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PracticeItemView {
    /// Identifier.
    pub id: Uuid,
    /// Kind of drill.
    pub practice_type: PracticeType,
    /// Difficulty level.
    pub difficulty: Difficulty,
    /// Weakness the drill addresses.
    pub target_weakness: String,
    /// What the candidate is asked to do.
    pub prompt: String,
    /// Model answer, only once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    /// Progressive hints.
    pub hints: Vec<String>,
    /// Candidate progress.
    pub status: PracticeStatus,
    /// Whether the item has been listed.
    pub delivered: bool,
    /// First time the item was listed.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Candidate's answer.
    pub user_response: Option<String>,
    /// Score of the candidate's answer.
    pub score: Option<f64>,
    /// Position within its batch.
    pub sequence_order: u32,
}

impl From<&PracticeItem> for PracticeItemView {
    fn from(item: &PracticeItem) -> Self {
        Self {
            id: item.id,
            practice_type: item.practice_type,
            difficulty: item.difficulty,
            target_weakness: item.target_weakness.clone(),
            prompt: item.prompt.clone(),
            expected_answer: (item.status == PracticeStatus::Completed)
                .then(|| item.expected_answer.clone())
                .flatten(),
            hints: item.hints.clone(),
            status: item.status,
            delivered: item.delivered,
            delivered_at: item.delivered_at,
            user_response: item.user_response.clone(),
            score: item.score,
            sequence_order: item.sequence_order,
        }
    }
}

/// Tracking record for one practice batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeGeneration {
    /// Identifier.
    pub id: Uuid,
    /// Feedback run the batch is generated from.
    pub feedback_id: Uuid,
    /// Owning user.
    pub owner_id: Uuid,
    /// Generation status.
    pub status: GenerationStatus,
    /// Requested number of items.
    pub count: u32,
    /// Whether difficulty should climb through the batch.
    pub difficulty_ramp: bool,
    /// Why generation failed.
    pub error_message: Option<String>,
    /// Items stored on success.
    pub item_count: Option<usize>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When generation started.
    pub started_at: Option<DateTime<Utc>>,
    /// When generation ended.
    pub completed_at: Option<DateTime<Utc>>,
}

impl PracticeGeneration {
    /// Creates a pending generation.
    #[must_use]
    pub fn new(feedback_id: Uuid, owner_id: Uuid, count: u32, difficulty_ramp: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            feedback_id,
            owner_id,
            status: GenerationStatus::Pending,
            count,
            difficulty_ramp,
            error_message: None,
            item_count: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// `Pending -> Processing`.
    pub fn start_processing(&mut self) -> Result<()> {
        check_generation(self.status, GenerationStatus::Processing)?;
        self.status = GenerationStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `Processing -> Completed`.
    pub fn complete(&mut self, item_count: usize) -> Result<()> {
        check_generation(self.status, GenerationStatus::Completed)?;
        self.status = GenerationStatus::Completed;
        self.item_count = Some(item_count);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `Processing -> Failed`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        check_generation(self.status, GenerationStatus::Failed)?;
        self.status = GenerationStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

// ============================================================================
// Messages and code submissions
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The candidate.
    User,
    /// The interviewer.
    Ai,
}

/// One chat turn. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier.
    pub id: Uuid,
    /// Conversation the message belongs to.
    pub assessment_id: Uuid,
    /// Author.
    pub sender: Sender,
    /// Text.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped now.
    #[must_use]
    pub fn new(assessment_id: Uuid, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            assessment_id,
            sender,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// One sandboxed run of candidate code. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSubmission {
    /// Identifier.
    pub id: Uuid,
    /// Assessment the code was written for.
    pub assessment_id: Uuid,
    /// Source language.
    pub language: Language,
    /// Submitted source.
    pub source: String,
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
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl CodeSubmission {
    /// Records the outcome of a sandbox run.
    #[must_use]
    pub fn new(
        assessment_id: Uuid,
        language: Language,
        source: impl Into<String>,
        result: ExecutionResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assessment_id,
            language,
            source: source.into(),
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            execution_time_ms: result.execution_time_ms,
            memory_used_mb: result.memory_used_mb,
            timed_out: result.timed_out,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ALL_GENERATION: [GenerationStatus; 4] = [
        GenerationStatus::Pending,
        GenerationStatus::Processing,
        GenerationStatus::Completed,
        GenerationStatus::Failed,
    ];

    fn assessment() -> Assessment {
        Assessment::new(
            Uuid::new_v4(),
            NewAssessment {
                topic: "Arrays".to_string(),
                role: "Backend Engineer".to_string(),
                difficulty: Difficulty::Medium,
                skill_targets: vec!["complexity".to_string()],
                question: Some("Find the duplicate".to_string()),
                context: None,
            },
        )
        .unwrap()
    }

    fn result(score: f64) -> FeedbackResult {
        FeedbackResult {
            overall_score: score,
            strengths: vec!["clear".to_string()],
            weaknesses: vec!["edge cases".to_string()],
            detailed_feedback: "ok".to_string(),
            ..FeedbackResult::default()
        }
    }

    // ------------------------------------------------------------------------
    // Assessment tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_assessment_requires_topic() {
        let err = Assessment::new(
            Uuid::new_v4(),
            NewAssessment {
                topic: "  ".to_string(),
                role: String::new(),
                difficulty: Difficulty::Easy,
                skill_targets: vec![],
                question: None,
                context: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, IntervueError::Validation(_)));
    }

    #[test]
    fn test_assessment_happy_path() {
        let mut a = assessment();
        assert_eq!(a.status, AssessmentStatus::Created);
        a.submit_response(Some("Use a hash set".to_string()), None)
            .unwrap();
        assert_eq!(a.status, AssessmentStatus::AwaitingFeedback);
        assert_eq!(a.answer(), Some("Use a hash set"));
        a.complete(72.0).unwrap();
        assert_eq!(a.status, AssessmentStatus::Completed);
        assert_eq!(a.score, Some(72.0));
    }

    #[test]
    fn test_assessment_illegal_transition_does_not_mutate() {
        let mut a = assessment();
        a.cancel().unwrap();
        let before = a.clone();
        let err = a.start().unwrap_err();
        assert!(matches!(err, IntervueError::InvalidStateTransition { .. }));
        assert_eq!(a, before);
        assert!(a.cancel().is_err());
    }

    #[test]
    fn test_audio_only_response_marks_transcript_pending() {
        let mut a = assessment();
        a.submit_response(None, Some("/tmp/answer.webm".to_string()))
            .unwrap();
        assert_eq!(a.transcript_status, TranscriptStatus::Pending);
        assert_eq!(a.answer(), None);
    }

    #[test]
    fn test_empty_response_is_rejected() {
        let mut a = assessment();
        let err = a.submit_response(Some("   ".to_string()), None).unwrap_err();
        assert!(matches!(err, IntervueError::Validation(_)));
        assert_eq!(a.status, AssessmentStatus::Created);
    }

    #[test]
    fn test_assessment_status_serialization() {
        assert_eq!(
            serde_json::to_string(&AssessmentStatus::AwaitingFeedback).unwrap(),
            r#""awaiting_feedback""#
        );
        let d: Difficulty = serde_json::from_str(r#""HARD""#).unwrap();
        assert_eq!(d, Difficulty::Hard);
        assert!(Difficulty::Easy < Difficulty::Hard);
    }

    // ------------------------------------------------------------------------
    // GenerationStatus tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_generation_transition_closure() {
        let legal = [
            (GenerationStatus::Pending, GenerationStatus::Processing),
            (GenerationStatus::Processing, GenerationStatus::Completed),
            (GenerationStatus::Processing, GenerationStatus::Failed),
            (GenerationStatus::Failed, GenerationStatus::Pending),
        ];
        for from in ALL_GENERATION {
            for to in ALL_GENERATION {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_progress_mapping() {
        assert_eq!(
            GenerationStatus::Pending.progress_message(None),
            "Waiting to start processing"
        );
        assert_eq!(GenerationStatus::Pending.estimated_completion_seconds(), Some(10));
        assert_eq!(
            GenerationStatus::Processing.progress_message(None),
            "Analyzing response..."
        );
        assert_eq!(GenerationStatus::Processing.estimated_completion_seconds(), Some(5));
        assert_eq!(GenerationStatus::Completed.progress_message(None), "Feedback ready");
        assert_eq!(GenerationStatus::Completed.estimated_completion_seconds(), Some(0));
        assert_eq!(
            GenerationStatus::Failed.progress_message(Some("Provider error: boom")),
            "Failed: Provider error: boom"
        );
        assert_eq!(GenerationStatus::Failed.estimated_completion_seconds(), None);
    }

    // ------------------------------------------------------------------------
    // FeedbackRun tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_feedback_run_lifecycle() {
        let mut run = FeedbackRun::new(Uuid::new_v4(), Uuid::new_v4(), None);
        run.start_processing().unwrap();
        assert!(run.started_at.is_some());
        run.complete(result(81.0)).unwrap();
        assert_eq!(run.status, GenerationStatus::Completed);
        assert_eq!(run.score, Some(81.0));
        assert_eq!(run.result().unwrap().weaknesses, vec!["edge cases"]);
    }

    #[test]
    fn test_feedback_run_cannot_complete_from_pending() {
        let mut run = FeedbackRun::new(Uuid::new_v4(), Uuid::new_v4(), None);
        let before = run.clone();
        assert!(run.complete(result(50.0)).is_err());
        assert!(run.fail("x").is_err());
        assert_eq!(run, before);
    }

    #[test]
    fn test_retry_clears_previous_attempt() {
        let mut run = FeedbackRun::new(Uuid::new_v4(), Uuid::new_v4(), None);
        run.start_processing().unwrap();
        run.cost_usd = Some(0.01);
        run.fail("Provider error: boom").unwrap();

        run.retry(3).unwrap();
        assert_eq!(run.status, GenerationStatus::Pending);
        assert_eq!(run.retry_count, 1);
        assert!(run.error_message.is_none());
        assert!(run.cost_usd.is_none());
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_retry_at_ceiling_is_rejected_without_mutation() {
        let mut run = FeedbackRun::new(Uuid::new_v4(), Uuid::new_v4(), None);
        for _ in 0..3 {
            run.start_processing().unwrap();
            run.fail("boom").unwrap();
            run.retry(3).unwrap();
        }
        run.start_processing().unwrap();
        run.fail("boom").unwrap();
        let before = run.clone();

        let err = run.retry(3).unwrap_err();
        assert!(matches!(err, IntervueError::BusinessRule(_)));
        assert_eq!(run, before);
        assert_eq!(run.retry_count, 3);
    }

    #[test]
    fn test_retry_requires_failed_run() {
        let mut run = FeedbackRun::new(Uuid::new_v4(), Uuid::new_v4(), None);
        let err = run.retry(3).unwrap_err();
        assert!(matches!(err, IntervueError::InvalidStateTransition { .. }));
    }

    // ------------------------------------------------------------------------
    // Practice tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_practice_type_spellings() {
        let t: PracticeType = serde_json::from_str(r#""code-exercise""#).unwrap();
        assert_eq!(t, PracticeType::CodeExercise);
        let t: PracticeType = serde_json::from_str(r#""Concept Review""#).unwrap();
        assert_eq!(t, PracticeType::ConceptReview);
        assert_eq!(
            serde_json::to_string(&PracticeType::MockScenario).unwrap(),
            r#""mock_scenario""#
        );
    }

    #[test]
    fn test_expected_answer_hidden_until_completed() {
        let mut item = PracticeItem {
            id: Uuid::new_v4(),
            feedback_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            practice_type: PracticeType::Question,
            difficulty: Difficulty::Easy,
            target_weakness: "edge cases".to_string(),
            prompt: "What happens with an empty array?".to_string(),
            expected_answer: Some("Return early".to_string()),
            hints: vec![],
            status: PracticeStatus::Pending,
            delivered: false,
            delivered_at: None,
            user_response: None,
            score: None,
            sequence_order: 0,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(PracticeItemView::from(&item)).unwrap();
        assert!(json.get("expected_answer").is_none());

        item.status = PracticeStatus::Completed;
        let json = serde_json::to_value(PracticeItemView::from(&item)).unwrap();
        assert_eq!(json["expected_answer"], "Return early");
    }

    fn practice_item() -> PracticeItem {
        PracticeItem {
            id: Uuid::new_v4(),
            feedback_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            practice_type: PracticeType::Question,
            difficulty: Difficulty::Medium,
            target_weakness: "complexity".to_string(),
            prompt: "What is the cost of a hash lookup?".to_string(),
            expected_answer: Some("O(1) on average".to_string()),
            hints: vec![],
            status: PracticeStatus::Pending,
            delivered: true,
            delivered_at: Some(Utc::now()),
            user_response: None,
            score: None,
            sequence_order: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_practice_response_completes_and_reveals_answer() {
        let mut item = practice_item();
        item.start().unwrap();
        item.submit_response("  Constant time, amortised  ", Some(80.0))
            .unwrap();

        assert_eq!(item.status, PracticeStatus::Completed);
        assert_eq!(item.user_response.as_deref(), Some("Constant time, amortised"));
        assert_eq!(item.score, Some(80.0));
        let json = serde_json::to_value(PracticeItemView::from(&item)).unwrap();
        assert_eq!(json["expected_answer"], "O(1) on average");
    }

    #[test]
    fn test_practice_response_validation_does_not_mutate() {
        let mut item = practice_item();
        let before = item.clone();

        assert!(matches!(
            item.submit_response("   ", None),
            Err(IntervueError::Validation(_))
        ));
        assert!(matches!(
            item.submit_response("O(1)", Some(101.0)),
            Err(IntervueError::Validation(_))
        ));
        assert_eq!(item, before);
    }

    #[test]
    fn test_practice_terminal_statuses_are_final() {
        let mut item = practice_item();
        item.skip().unwrap();
        assert_eq!(item.status, PracticeStatus::Skipped);
        assert!(item.submit_response("late answer", None).is_err());
        assert!(item.start().is_err());

        let mut item = practice_item();
        item.submit_response("O(1)", None).unwrap();
        assert!(item.skip().is_err());
        let json = serde_json::to_value(PracticeItemView::from(&item)).unwrap();
        assert!(json["score"].is_null());
    }

    #[test]
    fn test_mark_delivered_keeps_first_timestamp() {
        let mut item = PracticeItem {
            id: Uuid::new_v4(),
            feedback_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            practice_type: PracticeType::CodeExercise,
            difficulty: Difficulty::Hard,
            target_weakness: String::new(),
            prompt: "Implement two-sum".to_string(),
            expected_answer: None,
            hints: vec![],
            status: PracticeStatus::Pending,
            delivered: false,
            delivered_at: None,
            user_response: None,
            score: None,
            sequence_order: 1,
            created_at: Utc::now(),
        };
        let first = Utc::now();
        item.mark_delivered(first);
        item.mark_delivered(first + chrono::Duration::seconds(5));
        assert_eq!(item.delivered_at, Some(first));
    }

    #[test]
    fn test_practice_generation_lifecycle() {
        let mut generation = PracticeGeneration::new(Uuid::new_v4(), Uuid::new_v4(), 3, true);
        assert!(generation.complete(3).is_err());
        generation.start_processing().unwrap();
        generation.complete(3).unwrap();
        assert_eq!(generation.item_count, Some(3));
        assert!(generation.status.is_terminal());
    }
}
