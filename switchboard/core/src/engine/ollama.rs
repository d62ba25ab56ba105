//! Ollama Engine Implementation
//!
//! Engine adapter for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Single-shot completion (used with `stream: false`)
//! - `/api/tags` - List available models (used as the health probe)
//!
//! The generation context is rendered into the `system` field, so the model
//! sees memory, personality and mood ahead of the user prompt.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::stats::EngineStats;
use super::traits::{EngineAdapter, EngineId, EngineMetrics, GenerationContext};
use super::{error_for_status, http_client};
use crate::config::{OllamaConfig, TimeoutConfig};
use crate::error::EngineError;
use crate::health::{model_available, HealthProbe};

/// Ollama engine client
pub struct OllamaEngine {
    id: EngineId,
    host: String,
    port: u16,
    base_url: String,
    model: String,
    required_model: Option<String>,
    unload_on_shutdown: bool,
    http_client: reqwest::Client,
    probe: HealthProbe,
    stats: EngineStats,
    shut_down: AtomicBool,
}

impl OllamaEngine {
    /// Create from configuration
    pub fn new(config: &OllamaConfig, timeouts: &TimeoutConfig) -> Result<Self, EngineError> {
        Ok(Self {
            id: EngineId::from("ollama"),
            host: config.host.clone(),
            port: config.port,
            base_url: format!("http://{}:{}", config.host, config.port),
            model: config.model.clone(),
            required_model: config.required_model.clone(),
            unload_on_shutdown: config.unload_on_shutdown,
            http_client: http_client(timeouts.generate_timeout())?,
            probe: HealthProbe::new(timeouts.health_timeout(), timeouts.health_cache_ttl()),
            stats: EngineStats::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Point at an explicit base URL instead of `http://host:port`
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Base URL of the server
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model used for generation
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    fn request_body(&self, prompt: &str, context: &GenerationContext) -> Value {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(system) = context.render() {
            body["system"] = Value::String(system);
        }
        body
    }

    async fn complete(&self, prompt: &str, context: &GenerationContext) -> Result<String, EngineError> {
        let response = self
            .http_client
            .post(self.generate_url())
            .json(&self.request_body(prompt, context))
            .send()
            .await?;
        let data: Value = error_for_status(response).await?.json().await?;

        data.get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::MalformedResponse("missing 'response' field".to_string()))
    }

    /// Names of the models the server has pulled
    pub async fn list_models(&self) -> Result<Vec<String>, EngineError> {
        let response = self
            .http_client
            .get(self.tags_url())
            .timeout(self.probe.timeout())
            .send()
            .await?;
        let data: Value = error_for_status(response).await?.json().await?;

        Ok(data
            .get("models")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name")?.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn reachable(&self) -> bool {
        match &self.required_model {
            None => {
                let response = self.http_client.get(self.tags_url()).send().await;
                matches!(response, Ok(r) if r.status().is_success())
            }
            Some(required) => match self.list_models().await {
                Ok(models) => {
                    let available = model_available(Some(required), &models);
                    if !available {
                        tracing::warn!(model = %required, "Required Ollama model not pulled");
                    }
                    available
                }
                Err(_) => false,
            },
        }
    }
}

#[async_trait]
impl EngineAdapter for OllamaEngine {
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
        let status = self.probe.check(self.reachable()).await;
        self.stats.set_healthy(status.healthy);
        status.healthy
    }

    fn metrics(&self) -> EngineMetrics {
        self.stats.snapshot(&self.id)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        if !self.unload_on_shutdown || self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // keep_alive 0 asks Ollama to evict the model from memory
        let response = self
            .http_client
            .post(self.generate_url())
            .timeout(self.probe.timeout())
            .json(&json!({ "model": self.model, "keep_alive": 0 }))
            .send()
            .await?;
        error_for_status(response).await?;

        tracing::info!(host = %self.host, port = self.port, model = %self.model, "Unloaded Ollama model");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_engine_creation() {
        let engine = OllamaEngine::new(&OllamaConfig::default(), &TimeoutConfig::default()).unwrap();
        assert_eq!(engine.id().as_str(), "ollama");
        assert_eq!(engine.base_url(), "http://localhost:11434");
        assert_eq!(engine.model(), "llama3");
        assert_eq!(engine.tags_url(), "http://localhost:11434/api/tags");
    }

    #[test]
    fn test_from_config() {
        let config = OllamaConfig {
            host: "example.com".to_string(),
            port: 8080,
            model: "mistral".to_string(),
            ..OllamaConfig::default()
        };
        let engine = OllamaEngine::new(&config, &TimeoutConfig::default()).unwrap();
        assert_eq!(engine.host, "example.com");
        assert_eq!(engine.port, 8080);
        assert_eq!(engine.generate_url(), "http://example.com:8080/api/generate");

        let engine = engine.with_base_url("http://127.0.0.1:9999/");
        assert_eq!(engine.base_url(), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_request_body() {
        let engine = OllamaEngine::new(&OllamaConfig::default(), &TimeoutConfig::default()).unwrap();

        let body = engine.request_body("Hello", &GenerationContext::new());
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["stream"], false);
        assert!(body.get("system").is_none());

        let context = GenerationContext::new().with("mood", json!("cheerful"));
        let body = engine.request_body("Hello", &context);
        assert_eq!(body["system"], r#"{"mood":"cheerful"}"#);
    }

    #[tokio::test]
    async fn test_shutdown_is_noop_without_unload() {
        let engine = OllamaEngine::new(&OllamaConfig::default(), &TimeoutConfig::default())
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        assert!(engine.shutdown().await.is_ok());
        assert!(engine.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        let engine = OllamaEngine::new(&OllamaConfig::default(), &TimeoutConfig::default())
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        assert!(!engine.health_check().await);
        assert!(!engine.metrics().healthy);
    }
}
