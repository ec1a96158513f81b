//! The [`ModelProvider`] trait and the request/response types shared by
//! every backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A single text-generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Instructions framing the model's behavior.
    pub system_prompt: String,
    /// The user-turn content to complete.
    pub user_prompt: String,
    /// Sampling temperature (lower is more deterministic).
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Creates a new completion request.
    #[must_use]
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature,
            max_tokens,
        }
    }
}

/// Raw output of a provider, before the gateway adds timing and cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub content: String,
    /// Identifier of the model that actually served the request.
    pub model_id: String,
    /// Prompt tokens billed.
    pub input_tokens: u64,
    /// Completion tokens billed.
    pub output_tokens: u64,
}

/// Unified interface over interchangeable text-generation backends.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier (e.g. "mock", "openai", "anthropic").
    fn name(&self) -> &str;

    /// The model this provider is configured to call.
    fn model_id(&self) -> &str;

    /// Performs one completion call. Implementations never retry.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}
