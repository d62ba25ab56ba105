//! Health Probing
//!
//! Routing decisions must never wait on a dead backend for the full
//! generation timeout. Every probe runs under a short timeout of its own; a
//! probe that times out counts as unhealthy.
//!
//! Engines embed a [`HealthProbe`] and feed it their provider-specific check
//! (an HTTP reachability test, a credential check). The probe can optionally
//! reuse a recent result for a short TTL.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::engine::EngineId;
use crate::registry::EngineRegistry;

/// Result of one probe
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the engine answered in time and met its requirements
    pub healthy: bool,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    fn now(healthy: bool) -> Self {
        Self {
            healthy,
            checked_at: Utc::now(),
        }
    }
}

/// Timeout-bounded, optionally cached health probe
#[derive(Debug)]
pub struct HealthProbe {
    timeout: Duration,
    cache_ttl: Option<Duration>,
    cached: Mutex<Option<(Instant, HealthStatus)>>,
}

impl HealthProbe {
    /// Probe bounded by `timeout`, caching results for `cache_ttl` if set
    #[must_use]
    pub fn new(timeout: Duration, cache_ttl: Option<Duration>) -> Self {
        Self {
            timeout,
            cache_ttl,
            cached: Mutex::new(None),
        }
    }

    /// Probe timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `probe` unless a fresh cached result exists
    pub async fn check<F>(&self, probe: F) -> HealthStatus
    where
        F: Future<Output = bool>,
    {
        if let Some(ttl) = self.cache_ttl {
            if let Some((at, status)) = self.cached.lock().as_ref() {
                if at.elapsed() < ttl {
                    return status.clone();
                }
            }
        }

        let healthy = match tokio::time::timeout(self.timeout, probe).await {
            Ok(healthy) => healthy,
            Err(_) => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Health probe timed out");
                false
            }
        };
        let status = HealthStatus::now(healthy);

        if self.cache_ttl.is_some() {
            *self.cached.lock() = Some((Instant::now(), status.clone()));
        }
        status
    }

    /// Drop any cached result
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }
}

/// Whether `required` (if any) is among the models a backend reports
///
/// A requirement without a tag also matches the `:latest` tag, since Ollama
/// lists `llama3` as `llama3:latest`.
#[must_use]
pub fn model_available(required: Option<&str>, reported: &[String]) -> bool {
    let Some(required) = required else {
        return true;
    };
    reported.iter().any(|name| {
        name == required
            || (!required.contains(':') && name.strip_suffix(":latest") == Some(required))
    })
}

/// Aggregated health of every registered engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Always "ok": the service itself is up if it can answer
    pub status: String,
    /// Per-engine probe results
    pub engines: BTreeMap<EngineId, bool>,
}

impl HealthSummary {
    /// Whether at least one engine is healthy
    #[must_use]
    pub fn any_healthy(&self) -> bool {
        self.engines.values().any(|h| *h)
    }
}

/// Probe every registered engine concurrently
///
/// Read-only: works on a registry snapshot and never touches router state.
pub async fn health_summary(registry: &EngineRegistry) -> HealthSummary {
    let engines = registry.list().await;
    let probes = engines.into_iter().map(|(id, engine)| async move {
        let healthy = engine.health_check().await;
        (id, healthy)
    });

    HealthSummary {
        status: "ok".to_string(),
        engines: futures::future::join_all(probes).await.into_iter().collect(),
    }
}
