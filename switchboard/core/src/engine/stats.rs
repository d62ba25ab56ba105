//! Per-engine request accounting
//!
//! Every engine owns an [`EngineStats`]. A call to `generate` starts a
//! [`RequestTimer`]; the timer records the request exactly once, either when
//! the call finishes or when its future is dropped mid-flight.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::traits::{EngineId, EngineMetrics};
use crate::metrics::Counter;

/// Request/latency accumulator for one engine
#[derive(Debug)]
pub struct EngineStats {
    requests: Counter,
    /// Total latency in microseconds
    total_latency_us: AtomicU64,
    healthy: AtomicBool,
    /// Unix millis of the last request, 0 = never
    last_request_ms: AtomicI64,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineStats {
    /// Fresh stats; engines start out presumed healthy
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Counter::new(),
            total_latency_us: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
            last_request_ms: AtomicI64::new(0),
        }
    }

    /// Begin timing a `generate` call
    #[must_use]
    pub fn start(&self) -> RequestTimer<'_> {
        self.last_request_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        RequestTimer {
            stats: self,
            started: Instant::now(),
        }
    }

    /// Overwrite the last-known health
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Last-known health
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Calls recorded so far
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.get()
    }

    fn record(&self, elapsed_us: u64) {
        self.requests.inc();
        self.total_latency_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    /// Build the public snapshot
    #[must_use]
    pub fn snapshot(&self, engine_id: &EngineId) -> EngineMetrics {
        let requests = self.requests.get();
        let total_secs = self.total_latency_us.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let last_ms = self.last_request_ms.load(Ordering::Relaxed);

        EngineMetrics {
            engine_id: engine_id.clone(),
            requests,
            avg_latency_secs: if requests > 0 {
                total_secs / requests as f64
            } else {
                0.0
            },
            total_latency_secs: total_secs,
            healthy: self.is_healthy(),
            last_request_at: if last_ms == 0 {
                None
            } else {
                DateTime::<Utc>::from_timestamp_millis(last_ms)
            },
        }
    }
}

/// Guard that records one request on drop
#[must_use = "dropping the timer immediately records a zero-length request"]
pub struct RequestTimer<'a> {
    stats: &'a EngineStats,
    started: Instant,
}

impl RequestTimer<'_> {
    /// Finish the call, updating health from the outcome
    ///
    /// Returns the result unchanged so it can be used in tail position.
    pub fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        self.stats.set_healthy(result.is_ok());
        result
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        let elapsed = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.stats.record(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_latency_zero_without_requests() {
        let stats = EngineStats::new();
        let snap = stats.snapshot(&EngineId::from("a"));
        assert_eq!(snap.requests, 0);
        assert!(snap.avg_latency_secs.abs() < f64::EPSILON);
        assert!(snap.healthy);
        assert!(snap.last_request_at.is_none());
    }

    #[test]
    fn test_timer_records_exactly_once() {
        let stats = EngineStats::new();
        let timer = stats.start();
        let result: Result<&str, ()> = timer.finish(Ok("ok"));
        assert!(result.is_ok());
        assert_eq!(stats.requests(), 1);
        assert!(stats.is_healthy());
    }

    #[test]
    fn test_error_marks_unhealthy_and_counts() {
        let stats = EngineStats::new();
        let result: Result<(), &str> = stats.start().finish(Err("boom"));
        assert!(result.is_err());
        assert_eq!(stats.requests(), 1);
        assert!(!stats.is_healthy());
    }

    #[test]
    fn test_dropped_timer_still_counts() {
        let stats = EngineStats::new();
        {
            let _timer = stats.start();
        }
        assert_eq!(stats.requests(), 1);
        // Health untouched by an abandoned call
        assert!(stats.is_healthy());
        assert!(stats.snapshot(&EngineId::from("a")).last_request_at.is_some());
    }

    #[test]
    fn test_snapshot_is_stable() {
        let stats = EngineStats::new();
        let _ = stats.start().finish::<(), ()>(Ok(()));
        let id = EngineId::from("a");
        assert_eq!(stats.snapshot(&id), stats.snapshot(&id));
    }
}
