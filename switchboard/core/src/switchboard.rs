//! Switchboard - composition root
//!
//! Owns one registry, router, state store and event bus per process and
//! hands out cheap clones to every consumer (HTTP handlers, websocket
//! sessions, chat front-ends). Nothing in this crate is a global.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::config::SwitchboardConfig;
use crate::engine::{build_engines, EngineId};
use crate::error::{EngineError, RouterError};
use crate::events::EventBus;
use crate::metrics::{MetricsCollector, RouterMetrics};
use crate::registry::EngineRegistry;
use crate::router::EngineRouter;
use crate::state::SharedState;

/// Startup failures
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// An engine could not be constructed
    #[error("failed to build engines: {0}")]
    Engine(#[from] EngineError),

    /// The configured active engine is not among the enabled engines
    #[error("failed to apply routing config: {0}")]
    Router(#[from] RouterError),
}

/// Shared handles to the routing layer
#[derive(Clone)]
pub struct Switchboard {
    registry: Arc<EngineRegistry>,
    router: Arc<EngineRouter>,
    state: Arc<SharedState>,
    events: EventBus,
    router_metrics: Arc<RouterMetrics>,
}

impl Default for Switchboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Switchboard {
    /// Empty switchboard: no engines, no active engine
    #[must_use]
    pub fn new() -> Self {
        let events = EventBus::new();
        let state = Arc::new(SharedState::new());
        let router_metrics = Arc::new(RouterMetrics::new());
        let registry = Arc::new(EngineRegistry::with_events(events.clone()));
        let router = Arc::new(
            EngineRouter::new(registry.clone())
                .with_shared_state(state.clone())
                .with_events(events.clone())
                .with_metrics(router_metrics.clone()),
        );

        Self {
            registry,
            router,
            state,
            events,
            router_metrics,
        }
    }

    /// Build every enabled engine, then apply `[router]`
    ///
    /// The active engine must be one of the enabled engines; the fallback is
    /// accepted as-is and resolved per request.
    pub async fn bootstrap(config: &SwitchboardConfig) -> Result<Self, BootstrapError> {
        let switchboard = Self::new();
        for engine in build_engines(config)? {
            switchboard.registry.register(engine).await;
        }

        if let Some(active) = &config.router.active {
            switchboard.router.set_active(active.as_str()).await?;
        }
        if let Some(fallback) = &config.router.fallback {
            switchboard.router.set_fallback(fallback.as_str()).await;
        }

        tracing::info!(
            engines = switchboard.registry.len().await,
            active = ?switchboard.router.active(),
            fallback = ?switchboard.router.fallback(),
            "Switchboard ready"
        );
        Ok(switchboard)
    }

    /// Rebuild engines from `config`
    ///
    /// Every enabled engine is re-registered (replacing and shutting down
    /// its previous instance) and engines no longer enabled are removed.
    /// Router selection is left alone. Returns the registered identifiers.
    pub async fn reload_engines(
        &self,
        config: &SwitchboardConfig,
    ) -> Result<Vec<EngineId>, EngineError> {
        let engines = build_engines(config)?;
        let keep: BTreeSet<EngineId> = engines.iter().map(|e| e.id().clone()).collect();

        for id in self.registry.ids().await {
            if !keep.contains(&id) {
                self.registry.unregister(id.as_str()).await;
            }
        }
        for engine in engines {
            self.registry.register(engine).await;
        }

        if let Some(active) = self.router.active() {
            if !keep.contains(&active) {
                tracing::warn!(engine = %active, "Active engine removed by reload");
            }
        }
        Ok(self.registry.ids().await)
    }

    /// Engine registry
    #[must_use]
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Router
    #[must_use]
    pub fn router(&self) -> &Arc<EngineRouter> {
        &self.router
    }

    /// Shared state store
    #[must_use]
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Event bus
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Metrics over every registered engine plus router counters
    #[must_use]
    pub fn metrics(&self) -> MetricsCollector {
        MetricsCollector::new(self.registry.clone(), self.router_metrics.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OllamaConfig, OpenAiConfig};
    use crate::engine::GenerationContext;
    use crate::events::RouterEvent;
    use crate::state::{AI_NAMESPACE, LAST_FALLBACK_KEY};
    use crate::test_utils::MockEngine;
    use serde_json::json;

    #[tokio::test]
    async fn test_bootstrap_defaults() {
        let switchboard = Switchboard::bootstrap(&SwitchboardConfig::default())
            .await
            .unwrap();
        assert_eq!(switchboard.registry().ids().await, vec![EngineId::from("ollama")]);
        assert_eq!(switchboard.router().active(), Some(EngineId::from("ollama")));
        assert_eq!(switchboard.router().fallback(), None);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_disabled_active() {
        let mut config = SwitchboardConfig::default();
        config.router.active = Some("openai".to_string());

        let err = Switchboard::bootstrap(&config).await.err().unwrap();
        assert!(matches!(
            err,
            BootstrapError::Router(RouterError::UnknownEngine(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_accepts_unregistered_fallback() {
        let mut config = SwitchboardConfig::default();
        config.router.fallback = Some("gemini".to_string());

        let switchboard = Switchboard::bootstrap(&config).await.unwrap();
        assert_eq!(switchboard.router().fallback(), Some(EngineId::from("gemini")));
    }

    #[tokio::test]
    async fn test_reload_adds_and_removes() {
        let mut config = SwitchboardConfig::default();
        let switchboard = Switchboard::bootstrap(&config).await.unwrap();

        config.engines.openai = Some(OpenAiConfig::default());
        config.engines.ollama = Some(OllamaConfig {
            enabled: false,
            ..OllamaConfig::default()
        });
        let ids = switchboard.reload_engines(&config).await.unwrap();

        assert_eq!(ids, vec![EngineId::from("openai")]);
        // Selection is untouched even though the engine is gone
        assert_eq!(switchboard.router().active(), Some(EngineId::from("ollama")));
    }

    #[tokio::test]
    async fn test_handles_share_state() {
        let switchboard = Switchboard::new();
        let mut rx = switchboard.events().subscribe();
        let registry = switchboard.registry().clone();
        registry
            .register(Arc::new(MockEngine::new("a").failing()))
            .await;
        registry.register(Arc::new(MockEngine::new("b"))).await;

        let router = switchboard.clone().router().clone();
        router.set_active("a").await.unwrap();
        router.set_fallback("b").await;
        router.generate("hi", &GenerationContext::new()).await.unwrap();

        assert_eq!(
            switchboard.state().get(AI_NAMESPACE, LAST_FALLBACK_KEY),
            Some(json!("b"))
        );
        assert_eq!(switchboard.metrics().router_metrics().total_fallbacks, 1);
        assert_eq!(switchboard.metrics().engine_metrics().await.len(), 2);
        assert!(matches!(
            rx.recv().await.unwrap(),
            RouterEvent::EngineRegistered { .. }
        ));
    }
}
