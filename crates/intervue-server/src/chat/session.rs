//! One authenticated interview conversation.
//!
//! A [`ChatSession`] is created only after the caller's token has been
//! verified. It owns no socket: the WebSocket task feeds it text frames and
//! writes out whatever frames it returns, which keeps every turn strictly
//! sequential and testable without a connection.

use std::sync::Arc;

use intervue_provider::Gateway;
use tracing::{info, warn};
use uuid::Uuid;

use super::protocol::{parse_inbound, Command, Inbound, OutboundFrame};
use super::templates;
use crate::auth::Identity;
use crate::config::ChatConfig;
use crate::error::IntervueError;
use crate::models::{Assessment, AssessmentStatus, Message, Sender};
use crate::store::Store;

/// Close code for a normal shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code for an authentication or authorization failure.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

const PROVIDER_UNAVAILABLE: &str =
    "The interviewer is unavailable right now. Please send your message again.";

/// Why a connection is closed instead of starting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason sent to the client.
    pub reason: String,
}

impl Rejection {
    fn policy(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_POLICY_VIOLATION,
            reason: reason.into(),
        }
    }

    fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: reason.into(),
        }
    }

    /// Rejection for a missing, unknown or expired token.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::policy("Authentication required")
    }
}

/// Frames produced by one inbound frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Turn {
    /// Frames to send, in order.
    pub frames: Vec<OutboundFrame>,
    /// Close with 1000 once the frames are sent.
    pub close: bool,
}

impl Turn {
    fn single(frame: OutboundFrame) -> Self {
        Self {
            frames: vec![frame],
            close: false,
        }
    }
}

/// Conversation state for one connection.
#[derive(Debug, Clone)]
pub struct ChatSession {
    assessment_id: Uuid,
    store: Store,
    gateway: Gateway,
    settings: Arc<ChatConfig>,
}

impl ChatSession {
    /// Authorizes `identity` for the assessment and moves a `Created`
    /// assessment to `InProgress`.
    pub async fn open(
        store: Store,
        gateway: Gateway,
        settings: Arc<ChatConfig>,
        assessment_id: Uuid,
        identity: Identity,
    ) -> Result<Self, Rejection> {
        let assessment = store
            .owned_assessment(assessment_id, identity.user_id)
            .await
            .map_err(|_| Rejection::policy("Assessment not found"))?;

        match assessment.status {
            AssessmentStatus::Completed | AssessmentStatus::Cancelled => {
                return Err(Rejection::normal(format!(
                    "Assessment is {}",
                    assessment.status
                )));
            }
            AssessmentStatus::AwaitingFeedback => {
                return Err(Rejection::policy("Assessment is not accepting messages"));
            }
            AssessmentStatus::Created => {
                store
                    .update_assessment(assessment_id, Assessment::start)
                    .await
                    .map_err(|e| {
                        warn!(%assessment_id, error = %e, "Could not start assessment");
                        Rejection::policy("Assessment is not accepting messages")
                    })?;
                info!(%assessment_id, "Assessment started");
            }
            AssessmentStatus::InProgress => {}
        }

        Ok(Self {
            assessment_id,
            store,
            gateway,
            settings,
        })
    }

    /// Assessment this session talks about.
    #[must_use]
    pub const fn assessment_id(&self) -> Uuid {
        self.assessment_id
    }

    /// Frames sent right after connecting: welcome and opening question for
    /// a new conversation, otherwise the most recent history.
    pub async fn initialize(&self) -> Vec<OutboundFrame> {
        let history = self
            .store
            .recent_messages(self.assessment_id, self.settings.replay_limit)
            .await;
        if !history.is_empty() {
            return history.iter().map(OutboundFrame::from_message).collect();
        }

        let Ok(assessment) = self.store.assessment(self.assessment_id).await else {
            return vec![OutboundFrame::error("Assessment no longer exists")];
        };
        let Ok(welcome) = self
            .persist(Sender::Ai, templates::welcome_message(&assessment))
            .await
        else {
            return vec![OutboundFrame::error("Assessment no longer exists")];
        };
        let question = self.opening_question(&assessment).await;
        let Ok(question) = self.persist(Sender::Ai, question).await else {
            return vec![
                OutboundFrame::from_message(&welcome),
                OutboundFrame::error("Assessment no longer exists"),
            ];
        };
        vec![
            OutboundFrame::from_message(&welcome),
            OutboundFrame::from_message(&question),
        ]
    }

    /// Handles one inbound text frame.
    pub async fn handle_text(&self, text: &str) -> Turn {
        let Ok(assessment) = self.store.assessment(self.assessment_id).await else {
            return Turn {
                frames: vec![OutboundFrame::error("Assessment no longer exists")],
                close: true,
            };
        };
        if assessment.status.is_terminal() {
            return Turn {
                frames: vec![OutboundFrame::notification(format!(
                    "Assessment is {}",
                    assessment.status
                ))],
                close: true,
            };
        }

        let mut turn = match parse_inbound(text) {
            Inbound::UserMessage(content) => self.user_turn(content).await,
            Inbound::Command(Command::Hint) => {
                Turn::single(OutboundFrame::ephemeral_ai(templates::hint(assessment.difficulty)))
            }
            Inbound::Command(Command::Repeat) => {
                match self.store.latest_ai_message(self.assessment_id).await {
                    Some(message) => Turn::single(OutboundFrame::from_message(&message)),
                    None => Turn::single(OutboundFrame::error("No interviewer message to repeat")),
                }
            }
            Inbound::Invalid(reason) => Turn::single(OutboundFrame::error(reason)),
        };

        turn.close = self
            .store
            .assessment(self.assessment_id)
            .await
            .map_or(true, |a| a.status.is_terminal());
        turn
    }

    async fn user_turn(&self, content: String) -> Turn {
        let Ok(message) = self.persist(Sender::User, content).await else {
            return Turn {
                frames: vec![OutboundFrame::error("Assessment no longer exists")],
                close: true,
            };
        };
        let mut frames = vec![OutboundFrame::from_message(&message)];

        let in_progress = self
            .store
            .assessment(self.assessment_id)
            .await
            .ok()
            .filter(|a| a.status == AssessmentStatus::InProgress);
        if let Some(assessment) = in_progress {
            frames.push(self.interviewer_reply(&assessment).await);
        }
        Turn {
            frames,
            close: false,
        }
    }

    async fn interviewer_reply(&self, assessment: &Assessment) -> OutboundFrame {
        let history = self
            .store
            .recent_messages(self.assessment_id, self.settings.context_messages)
            .await;
        let prompt = templates::conversation_prompt(assessment, &history);

        match self
            .gateway
            .generate(
                templates::INTERVIEWER_SYSTEM_PROMPT,
                &prompt,
                self.settings.chat_temperature,
                self.settings.chat_max_tokens,
            )
            .await
        {
            Ok(generation) => match self.persist(Sender::Ai, generation.content.trim()).await {
                Ok(reply) => OutboundFrame::from_message(&reply),
                Err(e) => {
                    warn!(assessment_id = %self.assessment_id, error = %e, "Dropping reply for removed assessment");
                    OutboundFrame::error("Assessment no longer exists")
                }
            },
            Err(e) => {
                warn!(assessment_id = %self.assessment_id, error = %e, "Interviewer reply failed");
                OutboundFrame::error(PROVIDER_UNAVAILABLE)
            }
        }
    }

    async fn opening_question(&self, assessment: &Assessment) -> String {
        if !self.settings.generate_opening_question {
            if let Some(question) =
                templates::opening_question(&assessment.topic, assessment.difficulty)
            {
                return question.to_string();
            }
        }

        match self
            .gateway
            .generate(
                templates::INTERVIEWER_SYSTEM_PROMPT,
                &templates::opening_question_prompt(assessment),
                self.settings.chat_temperature,
                self.settings.chat_max_tokens,
            )
            .await
        {
            Ok(generation) if !generation.content.trim().is_empty() => {
                generation.content.trim().to_string()
            }
            Ok(_) => templates::FALLBACK_QUESTION.to_string(),
            Err(e) => {
                warn!(assessment_id = %self.assessment_id, error = %e, "Opening question generation failed");
                templates::FALLBACK_QUESTION.to_string()
            }
        }
    }

    async fn persist(
        &self,
        sender: Sender,
        content: impl Into<String>,
    ) -> Result<Message, IntervueError> {
        let message = Message::new(self.assessment_id, sender, content);
        self.store.append_message(message.clone()).await?;
        Ok(message)
    }
}

// ============================================================================
// Tests
// ============================================================================
