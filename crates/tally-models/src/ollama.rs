//! Ollama model implementation.
//!
//! This module provides an implementation of the `LanguageModel` trait for
//! Ollama's local `/api/generate` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tally_abstraction::{
    Completion, CompletionParameters, CompletionUsage, LanguageModel, ModelError,
};
use tracing::{debug, error};

/// Default address of a local Ollama runtime.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama model implementation.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    /// The model ID (e.g., "qwen2:1.5b").
    model_id: String,
    /// The base URL for the Ollama API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OllamaModel {
    /// Creates a new `OllamaModel` against the default local runtime.
    #[must_use]
    pub fn new(model_id: String) -> Self {
        Self::with_base_url(model_id, DEFAULT_OLLAMA_URL.to_string())
    }

    /// Creates a new `OllamaModel` with a custom base URL.
    ///
    /// # Arguments
    /// * `model_id` - The Ollama model ID to use
    /// * `base_url` - The base URL for the Ollama API (e.g., "http://192.168.1.100:11434")
    #[must_use]
    pub fn with_base_url(model_id: String, base_url: String) -> Self {
        Self { model_id, base_url: base_url.trim_end_matches('/').to_string(), client: Client::new() }
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>, // max_tokens equivalent
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaModel {
    fn build_options(parameters: Option<CompletionParameters>) -> Option<OllamaOptions> {
        parameters.map(|p| OllamaOptions {
            temperature: p.temperature,
            num_predict: p.max_tokens,
            stop: p.stop_sequences,
        })
    }

    fn classify_error_body(&self, status: reqwest::StatusCode, body: &str) -> ModelError {
        if let Ok(error_json) = serde_json::from_str::<OllamaError>(body) {
            if error_json.error.contains("model") && error_json.error.contains("not found") {
                return ModelError::ModelResponseError(format!(
                    "Model '{}' not found. Pull it with 'ollama pull {}'.",
                    self.model_id, self.model_id
                ));
            }
            if error_json.error.contains("out of memory") || error_json.error.contains("OOM") {
                return ModelError::ModelResponseError(
                    "Insufficient memory to load model. Try a smaller variant.".to_string(),
                );
            }
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return ModelError::ModelResponseError(format!(
                "Model '{}' not found. Pull it with 'ollama pull {}'.",
                self.model_id, self.model_id
            ));
        }

        ModelError::ModelResponseError(format!("API error ({}): {}", status, body))
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(
        &self,
        prompt: &str,
        parameters: Option<CompletionParameters>,
    ) -> Result<Completion, ModelError> {
        debug!(
            model_id = %self.model_id,
            prompt_len = prompt.len(),
            parameters = ?parameters,
            "OllamaModel completing prompt"
        );

        let url = format!("{}/api/generate", self.base_url);
        let request_body = OllamaGenerateRequest {
            model: &self.model_id,
            prompt,
            stream: false,
            options: Self::build_options(parameters),
        };

        let response = self.client.post(&url).json(&request_body).send().await.map_err(|e| {
            error!(error = %e, base_url = %self.base_url, "Failed to connect to Ollama");
            if e.is_connect() {
                ModelError::RequestError(format!(
                    "Ollama server not reachable at {}. Start it with 'ollama serve'.",
                    self.base_url
                ))
            } else {
                ModelError::RequestError(format!("Network error: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Ollama API returned error status");
            return Err(self.classify_error_body(status, &error_text));
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Ollama API response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        Ok(Completion {
            text: ollama_response.response,
            model_id: Some(self.model_id.clone()),
            usage: Some(CompletionUsage {
                prompt_tokens: ollama_response.prompt_eval_count.unwrap_or(0),
                completion_tokens: ollama_response.eval_count.unwrap_or(0),
            }),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
