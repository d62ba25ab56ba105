//! Engine Traits
//!
//! Trait definitions for AI engines. This abstraction allows the router to
//! work with different text-generation providers (Ollama, OpenAI, Gemini)
//! without changing routing logic.
//!
//! # Design Philosophy
//!
//! The `EngineAdapter` trait provides a common interface for:
//! - Generating a reply for a prompt plus opaque conversation context
//! - Health checking the backend
//! - Reporting live request/latency metrics
//! - Releasing resources when the engine is swapped out
//!
//! Implementations handle provider-specific details (API formats, auth, etc.)

use std::borrow::Borrow;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineError;

/// Unique identifier of an engine within a registry
///
/// Stable for the lifetime of the engine instance (e.g. `"ollama"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(String);

impl EngineId {
    /// Create an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EngineId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EngineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for EngineId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EngineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Auxiliary data handed to an engine alongside the prompt
///
/// The router passes this through untouched. Its shape belongs to the
/// collaborators that build it (memory excerpts, personality and mood
/// snapshots); engines only render it into their provider's prompt format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationContext(Map<String, Value>);

impl GenerationContext {
    /// Empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the conventional `{memory, personality, mood}` context
    #[must_use]
    pub fn from_parts(memory: Value, personality: Value, mood: Value) -> Self {
        let mut map = Map::new();
        map.insert("memory".to_string(), memory);
        map.insert("personality".to_string(), personality);
        map.insert("mood".to_string(), mood);
        Self(map)
    }

    /// Set a top-level entry
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Whether the context carries anything at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw map
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Render as compact JSON for inclusion in a system prompt
    ///
    /// Returns `None` for an empty context so engines can omit the system
    /// section entirely.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(Value::Object(self.0.clone()).to_string())
        }
    }
}

impl From<Map<String, Value>> for GenerationContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Point-in-time metrics for one engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Engine the numbers belong to
    pub engine_id: EngineId,
    /// Calls to `generate`, successful or not
    pub requests: u64,
    /// Mean wall-clock duration of `generate` in seconds (0 before any call)
    pub avg_latency_secs: f64,
    /// Sum of all `generate` durations in seconds
    pub total_latency_secs: f64,
    /// Last known health
    pub healthy: bool,
    /// When `generate` was last called
    pub last_request_at: Option<DateTime<Utc>>,
}

/// AI engine trait
///
/// Implement this trait to add support for another text-generation provider.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Registry key for this engine (e.g. "ollama", "openai")
    fn id(&self) -> &EngineId;

    /// Produce a reply for `prompt`
    ///
    /// Implementations record the call in their metrics and update their
    /// health flag whatever the outcome.
    async fn generate(&self, prompt: &str, context: &GenerationContext)
        -> Result<String, EngineError>;

    /// Cheap liveness probe; never fails, errors collapse to `false`
    async fn health_check(&self) -> bool;

    /// Snapshot of live metrics; never blocks on I/O
    fn metrics(&self) -> EngineMetrics;

    /// Release resources when the engine is replaced or unregistered
    ///
    /// Must be idempotent. The registry logs errors and carries on.
    async fn shutdown(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_id_roundtrip() {
        let id = EngineId::from("ollama");
        assert_eq!(id.as_str(), "ollama");
        assert_eq!(id.to_string(), "ollama");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ollama\"");
    }

    #[test]
    fn test_context_from_parts() {
        let ctx = GenerationContext::from_parts(
            json!(["user likes cats"]),
            json!({"humor": 0.8}),
            json!("cheerful"),
        );
        assert_eq!(ctx.as_map().len(), 3);
        assert_eq!(ctx.as_map()["mood"], json!("cheerful"));
    }

    #[test]
    fn test_context_render() {
        assert_eq!(GenerationContext::new().render(), None);

        let ctx = GenerationContext::new().with("mood", json!("calm"));
        assert_eq!(ctx.render().as_deref(), Some(r#"{"mood":"calm"}"#));
    }
}
