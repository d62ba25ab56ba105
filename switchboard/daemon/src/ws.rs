//! Dashboard WebSocket
//!
//! `GET /ws` streams live routing state to the dashboard:
//!
//! - an `init` snapshot on connect (active engine, engines, metrics)
//! - every [`RouterEvent`] as it happens, serialized with its topic as `type`
//! - a `monitoring.update` with fresh metrics every [`UPDATE_INTERVAL`]
//!
//! The dashboard can send commands back:
//!
//! ```json
//! {"action": "switch", "engine": "openai"}
//! {"action": "set_fallback", "engine": "gemini"}
//! {"action": "clear_fallback"}
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use switchboard_core::{RouterEvent, Switchboard};

use crate::api::{engines_view, metrics_view, AppState};

/// Period of `monitoring.update` pushes
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(2);

/// Commands accepted from the dashboard
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DashboardCommand {
    /// Make `engine` the active engine
    Switch {
        /// Engine identifier
        engine: String,
    },
    /// Make `engine` the fallback engine
    SetFallback {
        /// Engine identifier
        engine: String,
    },
    /// Remove the fallback engine
    ClearFallback,
}

/// `GET /ws` upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| dashboard_session(socket, state))
}

async fn dashboard_session(mut socket: WebSocket, state: Arc<AppState>) {
    info!("Dashboard connected");
    let switchboard = &state.switchboard;
    let mut events = switchboard.events().subscribe();

    if send_json(&mut socket, &init_message(switchboard).await).await.is_err() {
        return;
    }

    let mut updates = tokio::time::interval(UPDATE_INTERVAL);
    // First tick fires immediately; init already carried the metrics
    updates.tick().await;

    loop {
        let outgoing = tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => handle_command(switchboard, &text).await,
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(error = %e, "Dashboard receive error");
                    break;
                }
                Some(Ok(_)) => continue,
            },
            event = events.recv() => match event {
                Ok(event) => event_message(&event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Dashboard lagged behind router events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = updates.tick() => json!({
                "type": "monitoring.update",
                "data": metrics_view(switchboard).await,
            }),
        };

        if send_json(&mut socket, &outgoing).await.is_err() {
            break;
        }
    }

    info!("Dashboard disconnected");
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string())).await
}

/// Snapshot sent when a dashboard connects
pub async fn init_message(switchboard: &Switchboard) -> Value {
    json!({
        "type": "init",
        "data": {
            "engines": engines_view(switchboard).await,
            "status": switchboard.router().status().await,
            "metrics": metrics_view(switchboard).await,
        }
    })
}

fn event_message(event: &RouterEvent) -> Value {
    serde_json::to_value(event).unwrap_or_else(|e| {
        json!({ "type": "error", "message": format!("failed to encode event: {e}") })
    })
}

/// Apply one dashboard command and build the reply
pub async fn handle_command(switchboard: &Switchboard, text: &str) -> Value {
    let command: DashboardCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            return json!({ "type": "error", "message": format!("invalid command: {e}") });
        }
    };
    debug!(?command, "Dashboard command");

    match command {
        DashboardCommand::Switch { engine } => {
            match switchboard.router().set_active(engine.as_str()).await {
                Ok(()) => json!({ "type": "switched", "engine": engine }),
                Err(e) => json!({ "type": "error", "message": e.to_string() }),
            }
        }
        DashboardCommand::SetFallback { engine } => {
            let registered = switchboard.router().set_fallback(engine.as_str()).await;
            json!({ "type": "fallback_set", "engine": engine, "registered": registered })
        }
        DashboardCommand::ClearFallback => {
            switchboard.router().clear_fallback();
            json!({ "type": "fallback_cleared" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::StaticEngine;
    use switchboard_core::EngineId;

    async fn switchboard() -> Switchboard {
        let switchboard = Switchboard::new();
        switchboard
            .registry()
            .register(StaticEngine::ok("ollama", "local"))
            .await;
        switchboard
            .registry()
            .register(StaticEngine::ok("openai", "cloud"))
            .await;
        switchboard.router().set_active("ollama").await.unwrap();
        switchboard
    }

    #[test]
    fn test_parse_commands() {
        let cmd: DashboardCommand =
            serde_json::from_str(r#"{"action":"switch","engine":"openai"}"#).unwrap();
        assert_eq!(
            cmd,
            DashboardCommand::Switch {
                engine: "openai".to_string()
            }
        );

        let cmd: DashboardCommand = serde_json::from_str(r#"{"action":"clear_fallback"}"#).unwrap();
        assert_eq!(cmd, DashboardCommand::ClearFallback);
    }

    #[tokio::test]
    async fn test_switch_command() {
        let switchboard = switchboard().await;
        let reply = handle_command(&switchboard, r#"{"action":"switch","engine":"openai"}"#).await;
        assert_eq!(reply, json!({"type": "switched", "engine": "openai"}));
        assert_eq!(switchboard.router().active(), Some(EngineId::from("openai")));
    }

    #[tokio::test]
    async fn test_switch_to_unknown_engine_is_error() {
        let switchboard = switchboard().await;
        let reply = handle_command(&switchboard, r#"{"action":"switch","engine":"gemini"}"#).await;
        assert_eq!(reply["type"], "error");
        assert!(reply["message"].as_str().unwrap().contains("gemini"));
        assert_eq!(switchboard.router().active(), Some(EngineId::from("ollama")));
    }

    #[tokio::test]
    async fn test_fallback_commands() {
        let switchboard = switchboard().await;
        let reply =
            handle_command(&switchboard, r#"{"action":"set_fallback","engine":"openai"}"#).await;
        assert_eq!(reply["registered"], true);
        assert_eq!(switchboard.router().fallback(), Some(EngineId::from("openai")));

        handle_command(&switchboard, r#"{"action":"clear_fallback"}"#).await;
        assert_eq!(switchboard.router().fallback(), None);
    }

    #[tokio::test]
    async fn test_malformed_command() {
        let switchboard = switchboard().await;
        let reply = handle_command(&switchboard, "not json").await;
        assert_eq!(reply["type"], "error");

        let reply = handle_command(&switchboard, r#"{"action":"reboot"}"#).await;
        assert_eq!(reply["type"], "error");
    }

    #[tokio::test]
    async fn test_init_message() {
        let switchboard = switchboard().await;
        let init = init_message(&switchboard).await;
        assert_eq!(init["type"], "init");
        assert_eq!(init["data"]["engines"]["active"], "ollama");
        assert_eq!(init["data"]["status"]["phase"], "active_set");
        assert!(init["data"]["metrics"]["router"].is_object());
    }

    #[test]
    fn test_event_message_uses_topic() {
        let message = event_message(&RouterEvent::EngineSwitched {
            engine_id: EngineId::from("openai"),
        });
        assert_eq!(message["type"], "engine.switched");
        assert_eq!(message["engine_id"], "openai");
    }
}
