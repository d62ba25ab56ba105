//! OpenAI Engine Implementation
//!
//! Chat completions over `/v1/chat/completions`. The generation context is
//! sent as the system message and the prompt as the single user message.
//!
//! Health only reflects whether an API key is configured; the API is not
//! called, so probing costs nothing and never burns quota.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::stats::EngineStats;
use super::traits::{EngineAdapter, EngineId, EngineMetrics, GenerationContext};
use super::{error_for_status, http_client};
use crate::config::{OpenAiConfig, TimeoutConfig};
use crate::error::EngineError;
use crate::health::HealthProbe;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completions client
pub struct OpenAiEngine {
    id: EngineId,
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
    probe: HealthProbe,
    stats: EngineStats,
}

impl OpenAiEngine {
    /// Create from configuration, resolving the API key now
    pub fn new(config: &OpenAiConfig, timeouts: &TimeoutConfig) -> Result<Self, EngineError> {
        Ok(Self {
            id: EngineId::from("openai"),
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

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    async fn complete(&self, prompt: &str, context: &GenerationContext) -> Result<String, EngineError> {
        let api_key = self.api_key.as_deref().ok_or(EngineError::MissingCredential)?;

        let system = context.render();
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await?;

        let body: ChatResponse = error_for_status(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EngineError::MalformedResponse("no choices in response".to_string()))
    }
}

#[async_trait]
impl EngineAdapter for OpenAiEngine {
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
