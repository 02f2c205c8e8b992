use crate::circuit_breaker::{create_generation_circuit_breaker, GenerationCircuitBreaker};
use crate::config::Config;
use crate::errors::AppError;
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use serde_json::{json, Value};
use std::time::Duration;

/// A provider that turns a prompt into raw text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Runs a single generation call. No retries happen at this level.
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;
}

/// Client for the Gemini `generateContent` REST API.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    breaker: GenerationCircuitBreaker,
}

impl GeminiClient {
    /// Creates a new `GeminiClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://generativelanguage.googleapis.com`.
    /// * `api_key` - Gemini API key.
    /// * `model` - Model name, e.g. `gemini-1.5-flash`.
    /// * `timeout` - Transport timeout for a single call.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create Gemini client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            breaker: create_generation_circuit_breaker(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.gemini_base_url.clone(),
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            Duration::from_secs(config.generation_timeout_secs),
        )
    }

    async fn request(&self, prompt: &str) -> Result<String, AppError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        tracing::debug!(
            "Calling Gemini model {} ({} prompt chars)",
            self.model,
            prompt.chars().count()
        );

        let body = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": { "temperature": 0.2 }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ComputeFailed(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ComputeFailed(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        let data: Value = response.json().await.map_err(|e| {
            AppError::ComputeFailed(format!("Failed to parse Gemini response: {}", e))
        })?;

        extract_candidate_text(&data)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        match self.breaker.call(self.request(prompt)).await {
            Ok(text) => Ok(text),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Gemini circuit open; rejecting generation call");
                Err(AppError::ComputeFailed(
                    "Generation provider circuit is open".to_string(),
                ))
            }
            Err(failsafe::Error::Inner(e)) => Err(e),
        }
    }
}

/// Concatenates the text parts of the first candidate of a `generateContent` response.
pub fn extract_candidate_text(data: &Value) -> Result<String, AppError> {
    if let Some(reason) = data
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Err(AppError::ComputeFailed(format!(
            "Gemini blocked the prompt: {}",
            reason
        )));
    }

    let text: String = data
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AppError::ComputeFailed(
            "Gemini response contained no text".to_string(),
        ));
    }

    Ok(text)
}
