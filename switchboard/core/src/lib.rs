//! Switchboard Core - AI Engine Routing & Failover
//!
//! This crate routes chatbot generation requests to interchangeable AI
//! backends (a local Ollama server, OpenAI, Gemini), fails over to a
//! fallback engine when the active one is down, and lets the active engine
//! be swapped while requests are in flight. It has no HTTP server and no
//! chat-platform dependencies; the daemon and chat front-ends drive it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │        Callers (chat front-end, dashboard, HTTP daemon)       │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ generate(prompt, context)
//! ┌──────────────────────────────┴───────────────────────────────┐
//! │                        SWITCHBOARD CORE                       │
//! │  ┌──────────────┐   lookup by id   ┌───────────────────────┐ │
//! │  │ EngineRouter │ ───────────────▶ │    EngineRegistry     │ │
//! │  │ active +     │                  │  id -> EngineAdapter  │ │
//! │  │ fallback     │                  └───────────┬───────────┘ │
//! │  └──────┬───────┘                              │             │
//! │         │ events / last_fallback   ┌───────────┴───────────┐ │
//! │  ┌──────┴───────┐                  │ Ollama │ OpenAI │ ... │ │
//! │  │ EventBus     │                  │ HealthProbe + Stats   │ │
//! │  │ SharedState  │                  └───────────────────────┘ │
//! │  └──────────────┘        MetricsCollector reads everything    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Switchboard`]: Composition root holding every shared handle
//! - [`EngineRouter`]: Active/fallback routing with one-hop failover
//! - [`EngineRegistry`]: Runtime map of engine id to adapter
//! - [`EngineAdapter`]: Contract every backend implements
//! - [`MetricsCollector`]: Per-engine and router metrics, Prometheus export
//!
//! # Quick Start
//!
//! ```ignore
//! use switchboard_core::{load_config, ConfigOverrides, GenerationContext, Switchboard};
//!
//! let (config, _source) = load_config(None, &ConfigOverrides::default())?;
//! let switchboard = Switchboard::bootstrap(&config).await?;
//!
//! let reply = switchboard
//!     .router()
//!     .generate("Hello!", &GenerationContext::new())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod state;
pub mod switchboard;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenience
pub use engine::{
    build_engines, EngineAdapter, EngineId, EngineMetrics, GeminiEngine, GenerationContext,
    OllamaEngine, OpenAiEngine,
};
pub use error::{EngineError, RouterError};
pub use events::{EventBus, RouterEvent};
pub use health::{health_summary, HealthProbe, HealthStatus, HealthSummary};
pub use metrics::{MetricsCollector, RouterMetrics, RouterMetricsSummary};
pub use registry::EngineRegistry;
pub use router::{EngineRouter, FallbackEvent, RouterPhase, RouterStatus};
pub use state::SharedState;
pub use switchboard::{BootstrapError, Switchboard};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, SwitchboardConfig,
};
