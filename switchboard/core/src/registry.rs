//! Engine Registry - Runtime Engine Management
//!
//! The `EngineRegistry` maps engine identifiers to live adapters and lets the
//! set of engines change while the service runs (cloud engines toggled from
//! the dashboard, config reloads).
//!
//! # Thread Safety
//!
//! Every operation takes the same async mutex, so register, unregister, get
//! and list never interleave. The lock is held across the outgoing adapter's
//! shutdown hook: a replacement only becomes visible once the engine it
//! replaces has shut down.
//!
//! Callers get `Arc` clones. A caller holding an adapter keeps it alive even
//! if it is unregistered meanwhile; in-flight calls are never torn down by a
//! registry change.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::{EngineAdapter, EngineId};
use crate::events::{EventBus, RouterEvent};

/// Registry of available engines
pub struct EngineRegistry {
    engines: Mutex<HashMap<EngineId, Arc<dyn EngineAdapter>>>,
    events: Option<EventBus>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Create an empty registry that publishes registration events
    #[must_use]
    pub fn with_events(events: EventBus) -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            events: Some(events),
        }
    }

    /// Register an engine under its own identifier
    ///
    /// An engine already registered under that identifier is shut down first,
    /// then replaced.
    pub async fn register(&self, engine: Arc<dyn EngineAdapter>) {
        let id = engine.id().clone();
        let mut engines = self.engines.lock().await;

        let replaced = if let Some(previous) = engines.remove(&id) {
            shutdown_engine(&id, previous.as_ref()).await;
            true
        } else {
            false
        };
        engines.insert(id.clone(), engine);
        drop(engines);

        tracing::info!(engine = %id, replaced, "Engine registered");
        if let Some(events) = &self.events {
            events.emit(RouterEvent::EngineRegistered {
                engine_id: id,
                replaced,
            });
        }
    }

    /// Remove an engine and run its shutdown hook
    ///
    /// Returns `false` (and does nothing) if no engine has that identifier.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut engines = self.engines.lock().await;
        let Some((id, engine)) = engines.remove_entry(id) else {
            return false;
        };
        shutdown_engine(&id, engine.as_ref()).await;
        drop(engines);

        tracing::info!(engine = %id, "Engine unregistered");
        if let Some(events) = &self.events {
            events.emit(RouterEvent::EngineUnregistered { engine_id: id });
        }
        true
    }

    /// Look up an engine
    pub async fn get(&self, id: &str) -> Option<Arc<dyn EngineAdapter>> {
        self.engines.lock().await.get(id).cloned()
    }

    /// Check if an engine is registered
    pub async fn contains(&self, id: &str) -> bool {
        self.engines.lock().await.contains_key(id)
    }

    /// Number of registered engines
    pub async fn len(&self) -> usize {
        self.engines.lock().await.len()
    }

    /// Whether no engine is registered
    pub async fn is_empty(&self) -> bool {
        self.engines.lock().await.is_empty()
    }

    /// Registered identifiers, sorted
    pub async fn ids(&self) -> Vec<EngineId> {
        let mut ids: Vec<EngineId> = self.engines.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of all engines
    ///
    /// The returned map is a copy; later registry changes do not affect it.
    pub async fn list(&self) -> BTreeMap<EngineId, Arc<dyn EngineAdapter>> {
        self.engines
            .lock()
            .await
            .iter()
            .map(|(id, engine)| (id.clone(), Arc::clone(engine)))
            .collect()
    }

    /// Unregister everything, shutting each engine down
    pub async fn clear(&self) {
        let mut engines = self.engines.lock().await;
        for (id, engine) in engines.drain() {
            shutdown_engine(&id, engine.as_ref()).await;
            if let Some(events) = &self.events {
                events.emit(RouterEvent::EngineUnregistered { engine_id: id });
            }
        }
    }
}

async fn shutdown_engine(id: &EngineId, engine: &dyn EngineAdapter) {
    if let Err(e) = engine.shutdown().await {
        tracing::warn!(engine = %id, error = %e, "Engine shutdown failed");
    }
}
