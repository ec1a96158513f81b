//! Deterministic provider and transcriber used in tests and whenever no
//! vendor credentials are configured.
//!
//! Without a script, [`MockProvider`] recognises the three prompt families
//! the server sends (feedback scoring, practice generation and interview
//! chat) by the response format they ask for, and answers each with a
//! well-formed canned payload.

use std::collections::VecDeque;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;

use crate::{Completion, CompletionRequest, ModelProvider, ProviderError, Result, Transcriber};

/// Model identifier reported by the mock provider.
pub const MOCK_MODEL_ID: &str = "mock-model";

static PRACTICE_COUNT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"exactly (\d+) practice items").ok());

const CHAT_REPLY: &str = "Thanks, that helps. Can you walk me through the time and space \
complexity of your approach, and how it behaves on edge cases?";

/// A provider that returns scripted or canned responses without network access.
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Result<String>>>,
}

impl MockProvider {
    /// Creates a mock with an empty script (canned responses only).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response; scripted entries are consumed in order
    /// before falling back to canned responses.
    #[must_use]
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.script.get_mut().push_back(Ok(content.into()));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn with_error(mut self, error: ProviderError) -> Self {
        self.script.get_mut().push_back(Err(error));
        self
    }

    fn canned_response(request: &CompletionRequest) -> String {
        let prompt = format!("{}\n{}", request.system_prompt, request.user_prompt);
        if prompt.contains("\"practices\"") {
            let count = PRACTICE_COUNT
                .as_ref()
                .and_then(|re| re.captures(&prompt))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(3);
            canned_practices(count)
        } else if prompt.contains("overall_score") {
            canned_feedback()
        } else {
            CHAT_REPLY.to_string()
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        MOCK_MODEL_ID
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let scripted = self.script.lock().await.pop_front();
        let content = match scripted {
            Some(Ok(content)) => content,
            Some(Err(e)) => return Err(e),
            None => Self::canned_response(request),
        };

        Ok(Completion {
            input_tokens: approximate_tokens(&request.system_prompt)
                + approximate_tokens(&request.user_prompt),
            output_tokens: approximate_tokens(&content),
            content,
            model_id: MOCK_MODEL_ID.to_string(),
        })
    }
}

fn approximate_tokens(text: &str) -> u64 {
    u64::try_from(text.split_whitespace().count()).unwrap_or(u64::MAX)
}

fn canned_feedback() -> String {
    let body = serde_json::json!({
        "overall_score": 72,
        "criterion_scores": {
            "correctness": 75,
            "communication": 70,
            "complexity_analysis": 65
        },
        "strengths": [
            "Clear explanation of the overall approach",
            "Handled the empty-input case"
        ],
        "weaknesses": [
            "Did not analyse time complexity",
            "Missed duplicate elements as an edge case"
        ],
        "suggestions": [
            "State the Big-O cost of each step before coding",
            "Enumerate edge cases up front"
        ],
        "detailed_feedback": "A solid attempt with a working core idea. Tighten the complexity discussion and edge-case coverage.",
        "safety_flags": []
    });
    format!("```json\n{body:#}\n```")
}

fn canned_practices(count: usize) -> String {
    let kinds = ["question", "code_exercise", "concept_review", "mock_scenario"];
    let practices: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "type": kinds[i % kinds.len()],
                "target_weakness": "Did not analyse time complexity",
                "prompt": format!("Practice item {}: analyse the complexity of a two-pointer scan.", i + 1),
                "expected_answer": "O(n) time, O(1) extra space.",
                "hints": ["Count how many times each pointer moves."]
            })
        })
        .collect();
    serde_json::json!({ "practices": practices }).to_string()
}

/// A transcriber that echoes a deterministic transcript.
#[derive(Debug, Default)]
pub struct MockTranscriber {
    failure: Option<ProviderError>,
}

impl MockTranscriber {
    /// Creates a transcriber that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transcriber that always fails with `error`.
    #[must_use]
    pub const fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(&self, audio_ref: &str) -> Result<String> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        Ok(format!("Transcript of recorded answer ({audio_ref})"))
    }
}
