//! Router Events
//!
//! Notifications published by the registry and router for collaborators
//! such as the dashboard and log views.
//!
//! # Design Philosophy
//!
//! Emitting never blocks and never fails. Events go out on a broadcast
//! channel; with nobody subscribed they are simply dropped, and a slow
//! subscriber only loses its own backlog (it sees `Lagged`), never holding
//! up the router.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::engine::EngineId;

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Events from the routing layer to observers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RouterEvent {
    /// The active engine changed
    #[serde(rename = "engine.switched")]
    EngineSwitched {
        /// New active engine
        engine_id: EngineId,
    },

    /// A fallback identifier was configured
    #[serde(rename = "engine.fallback_configured")]
    FallbackConfigured {
        /// Fallback engine
        engine_id: EngineId,
        /// Whether it was registered at the time
        registered: bool,
    },

    /// A request failed over from the active engine to the fallback
    #[serde(rename = "engine.fallback")]
    FallbackTriggered {
        /// Engine that failed
        from: EngineId,
        /// Engine retried on
        to: EngineId,
        /// Why the active engine failed
        reason: String,
        /// When it happened
        at: DateTime<Utc>,
    },

    /// An engine was added (or replaced)
    #[serde(rename = "engine.registered")]
    EngineRegistered {
        /// Engine identifier
        engine_id: EngineId,
        /// Whether an existing engine was replaced
        replaced: bool,
    },

    /// An engine was removed
    #[serde(rename = "engine.unregistered")]
    EngineUnregistered {
        /// Engine identifier
        engine_id: EngineId,
    },
}

impl RouterEvent {
    /// Dotted topic name, e.g. `engine.switched`
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::EngineSwitched { .. } => "engine.switched",
            Self::FallbackConfigured { .. } => "engine.fallback_configured",
            Self::FallbackTriggered { .. } => "engine.fallback",
            Self::EngineRegistered { .. } => "engine.registered",
            Self::EngineUnregistered { .. } => "engine.unregistered",
        }
    }
}

/// Fire-and-forget publisher for [`RouterEvent`]s
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<RouterEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Bus with the default per-subscriber buffer
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Bus with a custom per-subscriber buffer
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event
    ///
    /// Returns the number of subscribers that will see it (0 when nobody is
    /// listening, which is not an error).
    pub fn emit(&self, event: RouterEvent) -> usize {
        tracing::debug!(topic = event.topic(), "Router event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.tx.subscribe()
    }

    /// Current subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
