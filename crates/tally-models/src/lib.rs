//! Model implementations for Tally.
//!
//! This crate provides concrete implementations of the `LanguageModel` trait.
//!
//! # Supported Providers
//!
//! - **Scripted**: Deterministic canned replies for tests and offline runs
//! - **Ollama**: Local models via Ollama (no API key, local execution)

pub mod factory;
pub mod ollama;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tally_abstraction::{Completion, CompletionParameters, CompletionUsage, LanguageModel, ModelError};
use tracing::debug;

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use ollama::{OllamaModel, DEFAULT_OLLAMA_URL};

/// A model that replays a fixed queue of replies and records every prompt it saw.
///
/// Once the queue is empty every call fails with `ModelError::Exhausted`, which
/// the pipeline treats like an unreachable runtime.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    id: String,
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// Creates a new `ScriptedModel` with the given ID and replies.
    #[must_use]
    pub fn new(id: String, replies: Vec<String>) -> Self {
        Self { id, replies: Mutex::new(replies.into()), prompts: Mutex::new(Vec::new()) }
    }

    /// A scripted model with no replies at all.
    #[must_use]
    pub fn silent() -> Self {
        Self::new("silent".to_string(), Vec::new())
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        prompt: &str,
        parameters: Option<CompletionParameters>,
    ) -> Result<Completion, ModelError> {
        debug!(
            model_id = %self.id,
            prompt_len = prompt.len(),
            parameters = ?parameters,
            "ScriptedModel completing prompt"
        );

        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self
            .replies
            .lock()
            .map_err(|e| ModelError::Other(format!("script lock poisoned: {e}")))?
            .pop_front()
            .ok_or_else(|| ModelError::Exhausted(self.id.clone()))?;

        Ok(Completion {
            usage: Some(CompletionUsage {
                prompt_tokens: count_tokens(prompt),
                completion_tokens: count_tokens(&reply),
            }),
            text: reply,
            model_id: Some(self.id.clone()),
        })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Count tokens in a string (simplified: word count).
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
