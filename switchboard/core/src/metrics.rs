//! Router Metrics
//!
//! Observability for the routing layer:
//! - Per-engine request counts and latency (kept by each engine, read here)
//! - Router-wide counters (requests, fallbacks, failures)
//! - Prometheus text export
//!
//! Everything here is read-only with respect to the registry and router.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::engine::{EngineId, EngineMetrics};
use crate::registry::EngineRegistry;

// ============================================================================
// Counter
// ============================================================================

/// A simple atomic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Counter at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n`
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Router Metrics
// ============================================================================

/// Router-wide counters
#[derive(Debug)]
pub struct RouterMetrics {
    /// Calls to `generate`
    pub total_requests: Counter,
    /// Requests answered by the active engine
    pub primary_successes: Counter,
    /// Requests that went to the fallback engine
    pub total_fallbacks: Counter,
    /// Requests that ended in an error
    pub total_failures: Counter,
    started_at: Instant,
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterMetrics {
    /// Fresh counters
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_requests: Counter::new(),
            primary_successes: Counter::new(),
            total_fallbacks: Counter::new(),
            total_failures: Counter::new(),
            started_at: Instant::now(),
        }
    }

    /// Seconds since creation
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Serializable snapshot
    #[must_use]
    pub fn summary(&self) -> RouterMetricsSummary {
        RouterMetricsSummary {
            uptime_seconds: self.uptime_secs(),
            total_requests: self.total_requests.get(),
            primary_successes: self.primary_successes.get(),
            total_fallbacks: self.total_fallbacks.get(),
            total_failures: self.total_failures.get(),
        }
    }
}

/// Snapshot of router counters
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouterMetricsSummary {
    /// Seconds since the router started
    pub uptime_seconds: u64,
    /// Calls to `generate`
    pub total_requests: u64,
    /// Requests answered by the active engine
    pub primary_successes: u64,
    /// Requests that went to the fallback engine
    pub total_fallbacks: u64,
    /// Requests that ended in an error
    pub total_failures: u64,
}

// ============================================================================
// Collector
// ============================================================================

/// Reads metrics from every registered engine
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<EngineRegistry>,
    router: Arc<RouterMetrics>,
}

impl MetricsCollector {
    /// Collector over `registry`, reporting `router` counters alongside
    #[must_use]
    pub fn new(registry: Arc<EngineRegistry>, router: Arc<RouterMetrics>) -> Self {
        Self { registry, router }
    }

    /// Per-engine snapshots, keyed by identifier
    pub async fn engine_metrics(&self) -> BTreeMap<EngineId, EngineMetrics> {
        self.registry
            .list()
            .await
            .into_iter()
            .map(|(id, engine)| (id, engine.metrics()))
            .collect()
    }

    /// Router counters
    #[must_use]
    pub fn router_metrics(&self) -> RouterMetricsSummary {
        self.router.summary()
    }

    /// Export as Prometheus text format
    pub async fn to_prometheus(&self) -> String {
        let router = self.router.summary();
        let engines = self.engine_metrics().await;
        let mut output = String::new();

        let _ = write!(
            output,
            "# HELP switchboard_requests_total Generation requests received\n\
             # TYPE switchboard_requests_total counter\n\
             switchboard_requests_total {}\n\n\
             # HELP switchboard_primary_success_total Requests served by the active engine\n\
             # TYPE switchboard_primary_success_total counter\n\
             switchboard_primary_success_total {}\n\n\
             # HELP switchboard_fallbacks_total Requests retried on the fallback engine\n\
             # TYPE switchboard_fallbacks_total counter\n\
             switchboard_fallbacks_total {}\n\n\
             # HELP switchboard_failures_total Requests that returned an error\n\
             # TYPE switchboard_failures_total counter\n\
             switchboard_failures_total {}\n\n",
            router.total_requests,
            router.primary_successes,
            router.total_fallbacks,
            router.total_failures
        );

        if engines.is_empty() {
            return output;
        }

        output.push_str(
            "# HELP engine_requests_total Generate calls per engine\n\
             # TYPE engine_requests_total counter\n",
        );
        let labels: Vec<(String, &EngineMetrics)> = engines
            .iter()
            .map(|(id, m)| (escape_label(id.as_str()), m))
            .collect();

        for (id, m) in &labels {
            let _ = writeln!(output, "engine_requests_total{{engine=\"{id}\"}} {}", m.requests);
        }

        output.push_str(
            "\n# HELP engine_latency_seconds_avg Mean generate latency per engine\n\
             # TYPE engine_latency_seconds_avg gauge\n",
        );
        for (id, m) in &labels {
            let _ = writeln!(
                output,
                "engine_latency_seconds_avg{{engine=\"{id}\"}} {}",
                m.avg_latency_secs
            );
        }

        output.push_str(
            "\n# HELP engine_healthy Last known engine health (1 = healthy)\n\
             # TYPE engine_healthy gauge\n",
        );
        for (id, m) in &labels {
            let _ = writeln!(
                output,
                "engine_healthy{{engine=\"{id}\"}} {}",
                u8::from(m.healthy)
            );
        }

        output
    }
}

/// Escape a Prometheus label value (`\\`, `"` and newline)
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineAdapter, GenerationContext};
    use crate::test_utils::MockEngine;

    #[test]
    fn test_counter() {
        let c = Counter::new();
        c.inc();
        c.add(4);
        assert_eq!(c.get(), 5);
    }

    #[tokio::test]
    async fn test_collects_every_engine() {
        let registry = Arc::new(EngineRegistry::new());
        let ollama = Arc::new(MockEngine::new("ollama"));
        registry.register(ollama.clone()).await;
        registry
            .register(Arc::new(MockEngine::new("openai").failing()))
            .await;

        ollama.generate("hi", &GenerationContext::new()).await.unwrap();

        let collector = MetricsCollector::new(registry, Arc::new(RouterMetrics::new()));
        let metrics = collector.engine_metrics().await;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics.get("ollama").unwrap().requests, 1);
        assert_eq!(metrics.get("openai").unwrap().requests, 0);
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let registry = Arc::new(EngineRegistry::new());
        registry.register(Arc::new(MockEngine::new("ollama"))).await;
        let router = Arc::new(RouterMetrics::new());
        router.total_requests.add(3);
        router.total_fallbacks.inc();

        let text = MetricsCollector::new(registry, router).to_prometheus().await;
        assert!(text.contains("switchboard_requests_total 3"));
        assert!(text.contains("switchboard_fallbacks_total 1"));
        assert!(text.contains("engine_requests_total{engine=\"ollama\"} 0"));
        assert!(text.contains("engine_healthy{engine=\"ollama\"} 1"));
    }

    #[test]
    fn test_escape_label() {
        assert_eq!(escape_label("ollama"), "ollama");
        assert_eq!(escape_label(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label("line\nbreak"), "line\\nbreak");
    }

    #[tokio::test]
    async fn test_prometheus_escapes_engine_ids() {
        let registry = Arc::new(EngineRegistry::new());
        registry
            .register(Arc::new(MockEngine::new("bad\"id\nx")))
            .await;

        let text = MetricsCollector::new(registry, Arc::new(RouterMetrics::new()))
            .to_prometheus()
            .await;
        assert!(text.contains("engine_requests_total{engine=\"bad\\\"id\\nx\"} 0"));
        for line in text.lines().filter(|l| l.starts_with("engine_")) {
            assert!(line.ends_with(" 0") || line.ends_with(" 1"), "broken line: {line}");
        }
    }
}
