//! Engine Router
//!
//! Routes each generation request to the active engine and, when that
//! engine is unhealthy or fails, retries exactly once on the fallback.
//!
//! # Routing Flow
//!
//! ```text
//! generate(prompt, context)
//!   -> active set?            no  -> NoActiveEngine
//!   -> active registered?     no  -> EngineNotFound
//!   -> active.health_check()  false -> primary failure (Unhealthy)
//!   -> active.generate()      Ok  -> reply
//!   -> fallback set (and different from active)?  no -> primary error
//!   -> fallback registered?   no  -> FallbackNotFound
//!   -> record fallback, fallback.generate() -> reply or error
//! ```
//!
//! The fallback is not health-checked: it is only reached on an already
//! degraded path, and a second probe would add its timeout to the latency.
//!
//! # Concurrency
//!
//! Router state sits behind a `parking_lot::Mutex` that is only ever held
//! for a copy or an assignment, never across an `.await`. Each call reads
//! the active/fallback identifiers once up front, so a concurrent
//! `set_active` affects the next call, not one already in flight.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{EngineId, GenerationContext};
use crate::error::{EngineError, RouterError};
use crate::events::{EventBus, RouterEvent};
use crate::metrics::RouterMetrics;
use crate::registry::EngineRegistry;
use crate::state::{SharedState, AI_NAMESPACE, LAST_FALLBACK_KEY};

/// Configuration phase, derived from router state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterPhase {
    /// No active engine (a fallback may still be set)
    Uninitialized,
    /// Active engine set, no fallback
    ActiveSet,
    /// Both active and fallback set
    ActiveAndFallbackSet,
}

/// Most recent failover
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FallbackEvent {
    /// Engine that failed
    pub from: EngineId,
    /// Engine the request was retried on
    pub to: EngineId,
    /// Why the first engine failed
    pub reason: String,
    /// When the failover happened
    pub at: DateTime<Utc>,
}

/// Serializable view of the router for dashboards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterStatus {
    /// Current phase
    pub phase: RouterPhase,
    /// Active engine
    pub active: Option<EngineId>,
    /// Fallback engine
    pub fallback: Option<EngineId>,
    /// Most recent failover
    pub last_fallback: Option<FallbackEvent>,
    /// Registered engines, sorted
    pub engines: Vec<EngineId>,
}

#[derive(Debug, Default)]
struct RouterState {
    active: Option<EngineId>,
    fallback: Option<EngineId>,
    last_fallback: Option<FallbackEvent>,
}

impl RouterState {
    fn phase(&self) -> RouterPhase {
        match (&self.active, &self.fallback) {
            (None, _) => RouterPhase::Uninitialized,
            (Some(_), None) => RouterPhase::ActiveSet,
            (Some(_), Some(_)) => RouterPhase::ActiveAndFallbackSet,
        }
    }
}

/// Active/fallback router over an [`EngineRegistry`]
pub struct EngineRouter {
    registry: Arc<EngineRegistry>,
    shared_state: Arc<SharedState>,
    events: EventBus,
    metrics: Arc<RouterMetrics>,
    state: Mutex<RouterState>,
}

impl EngineRouter {
    /// Router over `registry` with its own state store, event bus and counters
    #[must_use]
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            shared_state: Arc::new(SharedState::new()),
            events: EventBus::new(),
            metrics: Arc::new(RouterMetrics::new()),
            state: Mutex::new(RouterState::default()),
        }
    }

    /// Publish the last fallback into an existing state store
    #[must_use]
    pub fn with_shared_state(mut self, shared_state: Arc<SharedState>) -> Self {
        self.shared_state = shared_state;
        self
    }

    /// Emit events on an existing bus
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Count into existing router metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Registry the router resolves engines from
    #[must_use]
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Event bus
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Router-wide counters
    #[must_use]
    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// Make `id` the active engine
    ///
    /// Fails with [`RouterError::UnknownEngine`] if `id` is not registered,
    /// leaving the previous active engine in place.
    pub async fn set_active(&self, id: impl Into<EngineId>) -> Result<(), RouterError> {
        let id = id.into();
        if !self.registry.contains(id.as_str()).await {
            tracing::warn!(engine = %id, "Refusing to activate unregistered engine");
            return Err(RouterError::UnknownEngine(id));
        }

        let previous = self.state.lock().active.replace(id.clone());
        tracing::info!(
            engine = %id,
            previous = previous.as_ref().map_or("none", EngineId::as_str),
            "Active AI engine set"
        );
        self.events.emit(RouterEvent::EngineSwitched { engine_id: id });
        Ok(())
    }

    /// Set the fallback engine
    ///
    /// Never fails. An unregistered identifier is accepted and only checked
    /// when a request actually needs the fallback. Returns whether the engine
    /// is registered right now.
    pub async fn set_fallback(&self, id: impl Into<EngineId>) -> bool {
        let id = id.into();
        let registered = self.registry.contains(id.as_str()).await;

        self.state.lock().fallback = Some(id.clone());
        if registered {
            tracing::info!(engine = %id, "Fallback AI engine set");
        } else {
            tracing::warn!(engine = %id, "Fallback AI engine set but not registered yet");
        }
        self.events.emit(RouterEvent::FallbackConfigured {
            engine_id: id,
            registered,
        });
        registered
    }

    /// Remove the fallback engine
    pub fn clear_fallback(&self) {
        if let Some(previous) = self.state.lock().fallback.take() {
            tracing::info!(engine = %previous, "Fallback AI engine cleared");
        }
    }

    /// Active engine identifier
    #[must_use]
    pub fn active(&self) -> Option<EngineId> {
        self.state.lock().active.clone()
    }

    /// Fallback engine identifier
    #[must_use]
    pub fn fallback(&self) -> Option<EngineId> {
        self.state.lock().fallback.clone()
    }

    /// Most recent failover, if any
    #[must_use]
    pub fn last_fallback(&self) -> Option<FallbackEvent> {
        self.state.lock().last_fallback.clone()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> RouterPhase {
        self.state.lock().phase()
    }

    /// Snapshot for dashboards
    pub async fn status(&self) -> RouterStatus {
        let engines = self.registry.ids().await;
        let state = self.state.lock();
        RouterStatus {
            phase: state.phase(),
            active: state.active.clone(),
            fallback: state.fallback.clone(),
            last_fallback: state.last_fallback.clone(),
            engines,
        }
    }

    /// Generate a reply through the active engine, failing over once
    pub async fn generate(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, RouterError> {
        let request_id = Uuid::new_v4();
        self.metrics.total_requests.inc();

        let result = self.route(request_id, prompt, context).await;
        if let Err(e) = &result {
            self.metrics.total_failures.inc();
            tracing::warn!(%request_id, error = %e, "Generation failed");
        }
        result
    }

    async fn route(
        &self,
        request_id: Uuid,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, RouterError> {
        let (active_id, fallback_id) = {
            let state = self.state.lock();
            (state.active.clone(), state.fallback.clone())
        };

        let active_id = active_id.ok_or(RouterError::NoActiveEngine)?;
        let active = self
            .registry
            .get(active_id.as_str())
            .await
            .ok_or_else(|| RouterError::EngineNotFound(active_id.clone()))?;

        let primary_error = if active.health_check().await {
            match active.generate(prompt, context).await {
                Ok(reply) => {
                    self.metrics.primary_successes.inc();
                    tracing::debug!(%request_id, engine = %active_id, "Served by active engine");
                    return Ok(reply);
                }
                Err(e) => e,
            }
        } else {
            EngineError::Unhealthy {
                engine: active_id.clone(),
            }
        };

        // Never retry the engine that just failed
        let Some(fallback_id) = fallback_id.filter(|f| *f != active_id) else {
            return Err(RouterError::Backend {
                engine: active_id,
                source: primary_error,
            });
        };

        let fallback = self
            .registry
            .get(fallback_id.as_str())
            .await
            .ok_or_else(|| RouterError::FallbackNotFound(fallback_id.clone()))?;

        tracing::warn!(
            %request_id,
            from = %active_id,
            to = %fallback_id,
            reason = %primary_error,
            "Switching to fallback AI engine"
        );
        let event = FallbackEvent {
            from: active_id,
            to: fallback_id.clone(),
            reason: primary_error.to_string(),
            at: Utc::now(),
        };
        self.state.lock().last_fallback = Some(event.clone());
        self.shared_state
            .set(AI_NAMESPACE, LAST_FALLBACK_KEY, fallback_id.as_str());
        self.metrics.total_fallbacks.inc();
        self.events.emit(RouterEvent::FallbackTriggered {
            from: event.from,
            to: event.to,
            reason: event.reason,
            at: event.at,
        });

        fallback
            .generate(prompt, context)
            .await
            .map_err(|source| RouterError::Backend {
                engine: fallback_id,
                source,
            })
    }
}
