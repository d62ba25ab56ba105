//! HTTP Control Surface
//!
//! REST endpoints over one [`Switchboard`]:
//!
//! ### Observability (read-only)
//! - `GET /health` - liveness of the daemon itself
//! - `GET /ai/engines` - registered engines with their metrics
//! - `GET /ai/status` - router phase, active and fallback engines
//! - `GET /monitoring/metrics` - router counters and per-engine metrics
//! - `GET /monitoring/metrics/prometheus` - same, Prometheus text format
//! - `GET /monitoring/health` - probe every engine now
//!
//! ### Admin
//! - `POST /ai/engine/active` - `{"engine_id": "..."}`
//! - `POST /ai/engine/fallback` - `{"engine_id": "..."}`
//! - `DELETE /ai/engine/fallback`
//! - `DELETE /ai/engines/:id` - unregister an engine
//! - `POST /ai/engines/reload` - re-read `.env` and the config, rebuild engines
//!
//! ### Generation
//! - `POST /ai/generate` - `{"prompt": "...", "context": {...}}`
//!
//! ### Dashboard
//! - `GET /ws` - see [`crate::ws`]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use switchboard_core::{
    health_summary, load_config, ConfigError, ConfigOverrides, EngineError, EngineId,
    EngineMetrics, GenerationContext, RouterError, RouterStatus, Switchboard,
};

use crate::ws;

/// Shared handler state
pub struct AppState {
    /// Routing layer
    pub switchboard: Switchboard,
    /// Config file to re-read on reload (`None` = default lookup)
    pub config_path: Option<PathBuf>,
    /// Command-line overrides re-applied on reload
    pub overrides: ConfigOverrides,
    /// `.env` loaded at startup; re-read on reload (`None` = search again)
    pub env_file: Option<PathBuf>,
}

// ============================================================================
// Errors
// ============================================================================

/// Handler failures, mapped to HTTP statuses
#[derive(Debug, Error)]
pub enum ApiError {
    /// Routing failure
    #[error(transparent)]
    Router(#[from] RouterError),

    /// No engine registered under this id
    #[error("engine '{0}' is not registered")]
    NotFound(EngineId),

    /// Reload could not read the config
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reload could not build an engine
    #[error("failed to build engines: {0}")]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Router(RouterError::UnknownEngine(_)) => StatusCode::BAD_REQUEST,
            Self::Router(RouterError::NoActiveEngine | RouterError::EngineNotFound(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Router(RouterError::FallbackNotFound(_) | RouterError::Backend { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "error": self.to_string() });
        if let Self::Router(e) = &self {
            body["retryable"] = Value::Bool(e.is_retryable());
        }
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
struct EngineSelection {
    engine_id: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    prompt: String,
    #[serde(default)]
    context: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateResponse {
    reply: String,
}

/// Engines view shared by `/ai/engines` and the dashboard
#[derive(Debug, Serialize)]
pub struct EnginesView {
    /// Active engine
    pub active: Option<EngineId>,
    /// Fallback engine
    pub fallback: Option<EngineId>,
    /// Metrics of every registered engine, sorted by id
    pub engines: Vec<EngineMetrics>,
}

/// Snapshot of the engines and their metrics
pub async fn engines_view(switchboard: &Switchboard) -> EnginesView {
    EnginesView {
        active: switchboard.router().active(),
        fallback: switchboard.router().fallback(),
        engines: switchboard
            .metrics()
            .engine_metrics()
            .await
            .into_values()
            .collect(),
    }
}

/// Router counters plus per-engine metrics
pub async fn metrics_view(switchboard: &Switchboard) -> Value {
    let collector = switchboard.metrics();
    json!({
        "router": collector.router_metrics(),
        "engines": collector.engine_metrics().await,
    })
}

// ============================================================================
// Server
// ============================================================================

/// Build the application router
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ai/engines", get(engines_handler))
        .route("/ai/engines/reload", post(reload_handler))
        .route("/ai/engines/:id", delete(unregister_handler))
        .route("/ai/status", get(status_handler))
        .route("/ai/engine/active", post(set_active_handler))
        .route(
            "/ai/engine/fallback",
            post(set_fallback_handler).delete(clear_fallback_handler),
        )
        .route("/ai/generate", post(generate_handler))
        .route("/monitoring/metrics", get(metrics_handler))
        .route("/monitoring/metrics/prometheus", get(prometheus_handler))
        .route("/monitoring/health", get(monitoring_health_handler))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Control surface listening");
    }
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn engines_handler(State(state): State<Arc<AppState>>) -> Json<EnginesView> {
    Json(engines_view(&state.switchboard).await)
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<RouterStatus> {
    Json(state.switchboard.router().status().await)
}

async fn set_active_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EngineSelection>,
) -> Result<Json<Value>, ApiError> {
    state
        .switchboard
        .router()
        .set_active(body.engine_id.as_str())
        .await?;
    Ok(Json(json!({ "active": body.engine_id })))
}

async fn set_fallback_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EngineSelection>,
) -> Json<Value> {
    let registered = state
        .switchboard
        .router()
        .set_fallback(body.engine_id.as_str())
        .await;
    Json(json!({ "fallback": body.engine_id, "registered": registered }))
}

async fn clear_fallback_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.switchboard.router().clear_fallback();
    Json(json!({ "fallback": null }))
}

async fn unregister_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.switchboard.registry().unregister(&id).await {
        return Err(ApiError::NotFound(EngineId::new(id)));
    }
    if state.switchboard.router().active().as_ref().map(EngineId::as_str) == Some(id.as_str()) {
        warn!(engine = %id, "Unregistered the active engine");
    }
    Ok(Json(json!({ "removed": id })))
}

/// Re-read `.env`, overriding variables already in the environment
fn reload_env_file(env_file: Option<&std::path::Path>) {
    let loaded = match env_file {
        Some(path) => dotenvy::from_path_override(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv_override(),
    };
    match loaded {
        Ok(path) => info!(path = ?path, "Reloaded .env"),
        Err(e) if e.not_found() => debug!("No .env file"),
        Err(e) => warn!(error = %e, "Failed to reload .env"),
    }
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    reload_env_file(state.env_file.as_deref());
    let (config, source) = load_config(state.config_path.as_deref(), &state.overrides)?;
    let engines = state.switchboard.reload_engines(&config).await?;
    info!(source = ?source, engines = engines.len(), "Engines reloaded");
    Ok(Json(json!({ "engines": engines })))
}

async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let context = GenerationContext::from(body.context);
    let reply = state
        .switchboard
        .router()
        .generate(&body.prompt, &context)
        .await?;
    Ok(Json(GenerateResponse { reply }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(metrics_view(&state.switchboard).await)
}

async fn prometheus_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.switchboard.metrics().to_prometheus().await,
    )
}

async fn monitoring_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(health_summary(state.switchboard.registry()).await)
}
