//! AI Engine Integration
//!
//! This module provides access to text-generation backends through the
//! common [`EngineAdapter`] trait.
//!
//! # Available Engines
//!
//! - **Ollama**: Local model server (default)
//! - **OpenAI**: Chat completions API
//! - **Gemini**: Google Generative Language API
//!
//! # Usage
//!
//! ```ignore
//! use switchboard_core::config::{OllamaConfig, TimeoutConfig};
//! use switchboard_core::engine::{EngineAdapter, GenerationContext, OllamaEngine};
//!
//! let engine = OllamaEngine::new(&OllamaConfig::default(), &TimeoutConfig::default())?;
//! let reply = engine.generate("Hello!", &GenerationContext::new()).await?;
//! ```

mod gemini;
mod ollama;
mod openai;
mod stats;
mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiEngine;
pub use ollama::OllamaEngine;
pub use openai::OpenAiEngine;
pub use stats::{EngineStats, RequestTimer};
pub use traits::{EngineAdapter, EngineId, EngineMetrics, GenerationContext};

use crate::config::SwitchboardConfig;
use crate::error::EngineError;

/// Longest response body kept in an [`EngineError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client shared by all calls of one engine
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EngineError::Internal(format!("failed to create HTTP client: {e}")))
}

/// Turn a non-success response into the matching [`EngineError`]
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(EngineError::AuthenticationFailed),
        429 => {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            Err(EngineError::RateLimited { retry_after_secs })
        }
        code => {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            Err(EngineError::Status { status: code, body })
        }
    }
}

/// Create every engine enabled in the configuration
///
/// Order is stable: local engine first, then cloud engines.
pub fn build_engines(
    config: &SwitchboardConfig,
) -> Result<Vec<Arc<dyn EngineAdapter>>, EngineError> {
    let mut engines: Vec<Arc<dyn EngineAdapter>> = Vec::new();

    if let Some(ollama) = config.engines.ollama.as_ref().filter(|c| c.enabled) {
        engines.push(Arc::new(OllamaEngine::new(ollama, &config.timeouts)?));
    }
    if let Some(openai) = config.engines.openai.as_ref().filter(|c| c.enabled) {
        engines.push(Arc::new(OpenAiEngine::new(openai, &config.timeouts)?));
    }
    if let Some(gemini) = config.engines.gemini.as_ref().filter(|c| c.enabled) {
        engines.push(Arc::new(GeminiEngine::new(gemini, &config.timeouts)?));
    }

    Ok(engines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeminiConfig, OllamaConfig, OpenAiConfig};

    #[test]
    fn test_build_engines_default_is_ollama_only() {
        let config = SwitchboardConfig::default();
        let engines = build_engines(&config).unwrap();
        let ids: Vec<&str> = engines.iter().map(|e| e.id().as_str()).collect();
        assert_eq!(ids, vec!["ollama"]);
    }

    #[test]
    fn test_build_engines_all_enabled() {
        let mut config = SwitchboardConfig::default();
        config.engines.openai = Some(OpenAiConfig::default());
        config.engines.gemini = Some(GeminiConfig::default());
        let engines = build_engines(&config).unwrap();
        let ids: Vec<&str> = engines.iter().map(|e| e.id().as_str()).collect();
        assert_eq!(ids, vec!["ollama", "openai", "gemini"]);
    }

    #[test]
    fn test_disabled_sections_are_skipped() {
        let mut config = SwitchboardConfig::default();
        config.engines.ollama = Some(OllamaConfig {
            enabled: false,
            ..OllamaConfig::default()
        });
        assert!(build_engines(&config).unwrap().is_empty());
    }
}
