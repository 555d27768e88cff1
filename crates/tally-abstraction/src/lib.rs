//! Language-model abstraction for Tally.
//!
//! The answering pipeline only ever needs one capability from a model runtime:
//! turn a prompt into text. This crate defines that contract so the core never
//! depends on a specific runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when asking a language model for a completion.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// The runtime could not be reached (connection refused, DNS, broken pipe).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The runtime answered with an error (unknown model, out of memory).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// The runtime's reply could not be decoded.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The configured provider is not known to this build.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// A scripted model ran out of canned replies.
    #[error("No scripted reply left for model '{0}'")]
    Exhausted(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// Parameters for controlling a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParameters {
    /// Sampling temperature. Query generation runs close to zero.
    pub temperature: Option<f32>,

    /// The maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sequences at which generation stops.
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for CompletionParameters {
    fn default() -> Self {
        Self { temperature: Some(0.0), max_tokens: Some(512), stop_sequences: None }
    }
}

impl CompletionParameters {
    /// Parameters with the given temperature and the default token budget.
    #[must_use]
    pub fn with_temperature(temperature: f32) -> Self {
        Self { temperature: Some(temperature), ..Self::default() }
    }
}

/// The text returned by a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text.
    pub text: String,

    /// Optional: The ID of the model that produced the text.
    pub model_id: Option<String>,

    /// Optional: token accounting reported by the runtime.
    pub usage: Option<CompletionUsage>,
}

impl Completion {
    /// A completion carrying only text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), model_id: None, usage: None }
    }
}

/// Usage statistics for a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,
}

impl CompletionUsage {
    /// Total tokens consumed by the request.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The request/response capability the pipeline needs from a language model.
///
/// All models must be `Send + Sync` so one instance can serve a whole batch of
/// questions processed concurrently.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completes the given prompt.
    ///
    /// # Errors
    /// Returns a `ModelError` if the runtime is unreachable or rejects the request.
    async fn complete(
        &self,
        prompt: &str,
        parameters: Option<CompletionParameters>,
    ) -> Result<Completion, ModelError>;

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}
