//! Model factory for creating model instances from configuration.

use crate::{OllamaModel, ScriptedModel};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tally_abstraction::{LanguageModel, ModelError};
use tracing::{debug, error};

/// Model provider enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Scripted model replaying canned replies (tests, offline runs).
    Scripted,
    /// Ollama local model.
    Ollama,
}

impl FromStr for ModelType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scripted" | "mock" => Ok(Self::Scripted),
            "ollama" | "local" => Ok(Self::Ollama),
            other => {
                error!(model_type = %other, "Unrecognized model type");
                Err(ModelError::UnsupportedModelProvider(format!(
                    "Unrecognized model type: {}",
                    other
                )))
            }
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The provider to create.
    pub model_type: ModelType,
    /// The model ID (e.g., "qwen2:1.5b").
    pub model_id: String,
    /// Optional base URL of the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Canned replies for the scripted provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub script: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(ModelType::Ollama, "qwen2:1.5b".to_string())
    }
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given type and model ID.
    #[must_use]
    pub fn new(model_type: ModelType, model_id: String) -> Self {
        Self { model_type, model_id, base_url: None, script: Vec::new() }
    }

    /// Sets the base URL for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the canned replies used by the scripted provider.
    #[must_use]
    pub fn with_script(mut self, script: Vec<String>) -> Self {
        self.script = script;
        self
    }
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model instance from the given configuration.
    pub fn create(config: ModelConfig) -> Result<Arc<dyn LanguageModel>, ModelError> {
        debug!(
            model_type = ?config.model_type,
            model_id = %config.model_id,
            "Creating model instance"
        );

        match config.model_type {
            ModelType::Scripted => Ok(Arc::new(ScriptedModel::new(config.model_id, config.script))),
            ModelType::Ollama => {
                let model = match config.base_url {
                    Some(base_url) => OllamaModel::with_base_url(config.model_id, base_url),
                    None => OllamaModel::new(config.model_id),
                };
                Ok(Arc::new(model))
            }
        }
    }

    /// Creates a model instance from a provider string and model ID.
    pub fn create_from_str(
        model_type_str: &str,
        model_id: String,
    ) -> Result<Arc<dyn LanguageModel>, ModelError> {
        let model_type = ModelType::from_str(model_type_str)?;
        Self::create(ModelConfig::new(model_type, model_id))
    }
}
