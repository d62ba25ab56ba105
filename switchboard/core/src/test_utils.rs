//! Scriptable in-memory engine for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::engine::{EngineAdapter, EngineId, EngineMetrics, EngineStats, GenerationContext};
use crate::error::EngineError;

/// Engine whose behaviour is set up by the test
pub struct MockEngine {
    id: EngineId,
    reply: String,
    healthy: AtomicBool,
    failing: AtomicBool,
    failing_shutdown: bool,
    delay: Option<Duration>,
    shutdown_delay: Option<Duration>,
    shutdown_finished: AtomicBool,
    stats: EngineStats,
    generate_calls: AtomicUsize,
    health_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    last_call: Mutex<Option<(String, GenerationContext)>>,
}

impl MockEngine {
    /// Healthy engine replying "reply from <id>"
    pub fn new(id: &str) -> Self {
        Self {
            id: EngineId::from(id),
            reply: format!("reply from {id}"),
            healthy: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            failing_shutdown: false,
            delay: None,
            shutdown_delay: None,
            shutdown_finished: AtomicBool::new(false),
            stats: EngineStats::new(),
            generate_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    /// `generate` fails with a connection error
    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    /// `health_check` reports false
    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_failing_shutdown(mut self) -> Self {
        self.failing_shutdown = true;
        self
    }

    /// `generate` sleeps before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `shutdown` sleeps before returning
    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = Some(delay);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Whether a `shutdown` call has run to completion
    pub fn shutdown_finished(&self) -> bool {
        self.shutdown_finished.load(Ordering::SeqCst)
    }

    /// Prompt and context of the most recent `generate`
    pub fn last_call(&self) -> Option<(String, GenerationContext)> {
        self.last_call.lock().clone()
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    fn id(&self) -> &EngineId {
        &self.id
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, EngineError> {
        let timer = self.stats.start();
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock() = Some((prompt.to_string(), context.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.failing.load(Ordering::SeqCst) {
            Err(EngineError::Connection(format!("{} is down", self.id)))
        } else {
            Ok(self.reply.clone())
        };
        timer.finish(result)
    }

    async fn health_check(&self) -> bool {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    fn metrics(&self) -> EngineMetrics {
        self.stats.snapshot(&self.id)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.shutdown_delay {
            tokio::time::sleep(delay).await;
        }
        self.shutdown_finished.store(true, Ordering::SeqCst);
        if self.failing_shutdown {
            Err(EngineError::Internal("shutdown failed".to_string()))
        } else {
            Ok(())
        }
    }
}
