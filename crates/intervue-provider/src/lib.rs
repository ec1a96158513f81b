//! Intervue Model Provider Gateway
//!
//! A uniform interface over interchangeable text-generation backends with
//! cost, latency and token accounting, plus the speech-to-text collaborator
//! used by the feedback pipeline.

pub mod anthropic;
pub mod error;
pub mod factory;
pub mod gateway;
pub mod mock;
pub mod openai;
pub mod pricing;
pub mod provider;
pub mod transcribe;

pub use anthropic::AnthropicProvider;
pub use error::{ProviderError, ProviderErrorKind, Result};
pub use factory::{build_gateway, build_provider, build_transcriber, ProviderConfig, ProviderKind};
pub use gateway::{Gateway, Generation, DEFAULT_CALL_TIMEOUT};
pub use mock::{MockProvider, MockTranscriber, MOCK_MODEL_ID};
pub use openai::{OpenAiProvider, OpenAiTranscriber};
pub use pricing::{ModelPrice, PriceTable};
pub use provider::{Completion, CompletionRequest, ModelProvider};
pub use transcribe::{Transcriber, UnavailableTranscriber};
