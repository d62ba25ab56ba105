//! Switchboard Daemon
//!
//! Runs the engine router behind an HTTP and WebSocket control surface so a
//! chat front-end can generate replies and a dashboard can watch and steer
//! engine selection.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: local Ollama, listening on 127.0.0.1:8080
//! switchboard-daemon
//!
//! # Ollama first, OpenAI when it fails
//! OPENAI_API_KEY=sk-... switchboard-daemon --active ollama --fallback openai
//!
//! # Explicit config file, verbose logging
//! RUST_LOG=debug switchboard-daemon --config ./switchboard.toml
//! ```
//!
//! # Environment Variables
//!
//! A `.env` file in the working directory is loaded first and re-read on
//! `POST /ai/engines/reload`.
//!
//! - `SWITCHBOARD_CONFIG`: Config file path
//! - `SWITCHBOARD_ACTIVE_ENGINE`, `SWITCHBOARD_FALLBACK_ENGINE`: Routing
//! - `SWITCHBOARD_HOST`, `SWITCHBOARD_PORT`: Bind address
//! - `OLLAMA_HOST`, `OLLAMA_PORT`, `OLLAMA_MODEL`: Local engine
//! - `OPENAI_API_KEY`, `GEMINI_API_KEY`: Enable cloud engines
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown (engines are shut down before exit)

mod api;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

use switchboard_core::{load_config, ConfigOverrides, Switchboard};

use crate::api::AppState;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "switchboard-daemon", version, about = "AI engine router with failover")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/switchboard/config.toml if present)
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Active engine
    #[arg(long)]
    active: Option<String>,

    /// Fallback engine
    #[arg(long)]
    fallback: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            active: self.active.clone(),
            fallback: self.fallback.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so it can feed both flags and RUST_LOG
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("switchboard_daemon=info".parse()?)
                .add_directive("switchboard_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let env_file = match dotenv {
        Ok(path) => {
            info!(path = ?path, "Loaded .env");
            Some(path)
        }
        Err(e) if e.not_found() => {
            debug!("No .env file");
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to load .env");
            None
        }
    };

    info!("Starting Switchboard Daemon");

    let overrides = args.overrides();
    let (config, source) =
        load_config(args.config.as_deref(), &overrides).context("Failed to load configuration")?;
    info!(source = ?source, "Configuration loaded");

    let switchboard = Switchboard::bootstrap(&config)
        .await
        .context("Failed to start engine router")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let state = Arc::new(AppState {
        switchboard: switchboard.clone(),
        config_path: args.config.clone(),
        overrides,
        env_file,
    });

    let served = api::serve(listener, state, shutdown_signal()).await;

    info!("Shutting down engines");
    switchboard.registry().clear().await;

    served.context("Control surface failed")?;
    info!("Switchboard Daemon stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
