//! Gemini Engine Implementation
//!
//! Google Generative Language API, `models/{model}:generateContent`.
//! Gemini has no separate system role on this endpoint, so the rendered
//! context is prepended to the prompt text.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::stats::EngineStats;
use super::traits::{EngineAdapter, EngineId, EngineMetrics, GenerationContext};
use super::{error_for_status, http_client};
use crate::config::{GeminiConfig, TimeoutConfig};
use crate::error::EngineError;
use crate::health::HealthProbe;

/// Gemini client
pub struct GeminiEngine {
    id: EngineId,
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
    probe: HealthProbe,
    stats: EngineStats,
}

impl GeminiEngine {
    /// Create from configuration, resolving the API key now
    pub fn new(config: &GeminiConfig, timeouts: &TimeoutConfig) -> Result<Self, EngineError> {
        Ok(Self {
            id: EngineId::from("gemini"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            http_client: http_client(timeouts.generate_timeout())?,
            probe: HealthProbe::new(timeouts.health_timeout(), timeouts.health_cache_ttl()),
            stats: EngineStats::new(),
        })
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether an API key is configured
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate_url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    fn prompt_text(prompt: &str, context: &GenerationContext) -> String {
        match context.render() {
            Some(rendered) => format!("{rendered}\n\n{prompt}"),
            None => prompt.to_string(),
        }
    }

    async fn complete(&self, prompt: &str, context: &GenerationContext) -> Result<String, EngineError> {
        let api_key = self.api_key.as_deref().ok_or(EngineError::MissingCredential)?;

        let body = json!({
            "contents": [{
                "parts": [{ "text": Self::prompt_text(prompt, context) }]
            }]
        });

        let response = self
            .http_client
            .post(self.generate_url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;
        let data: Value = error_for_status(response).await?.json().await?;

        extract_text(&data)
    }
}

/// Concatenate the text parts of the first candidate
///
/// A candidate without any text part (safety block, empty content) is an
/// error so the router can fail over.
fn extract_text(data: &Value) -> Result<String, EngineError> {
    let candidate = data
        .pointer("/candidates/0")
        .ok_or_else(|| EngineError::MalformedResponse("no candidates in response".to_string()))?;

    let texts: Vec<&str> = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        let message = match candidate.get("finishReason").and_then(Value::as_str) {
            Some(reason) => format!("candidate has no text (finishReason: {reason})"),
            None => "candidate has no text".to_string(),
        };
        return Err(EngineError::MalformedResponse(message));
    }

    Ok(texts.concat())
}

#[async_trait]
impl EngineAdapter for GeminiEngine {
    fn id(&self) -> &EngineId {
        &self.id
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, EngineError> {
        let timer = self.stats.start();
        timer.finish(self.complete(prompt, context).await)
    }

    async fn health_check(&self) -> bool {
        let has_key = self.has_credentials();
        self.probe.check(async move { has_key }).await.healthy
    }

    fn metrics(&self) -> EngineMetrics {
        self.stats.snapshot(&self.id)
    }
}
