//! Chat channel walkthrough.
//!
//! Connects to a chat room, logs every event, sends one message and keeps the connection alive
//! with a reconnector until Ctrl-C.
//!
//! Run with tracing enabled:
//! ```sh
//! APRENDE_WS_URL=ws://localhost:8000/ws/chat/1/ APRENDE_TOKEN=... \
//!     RUST_LOG=info cargo run --example chat --features tracing
//! ```

use std::env;
use std::sync::Arc;

use aprende_realtime::auth::StaticToken;
use aprende_realtime::ws::config::ReconnectConfig;
use aprende_realtime::ws::reconnect::Reconnector;
use aprende_realtime::ws::{Config, ConnectionManager, Event, EventKind, listener};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = env::var("APRENDE_WS_URL")
        .unwrap_or_else(|_| "ws://localhost:8000/ws/chat/1/".to_owned());
    let mut config = Config::new(url)?;
    if let Ok(token) = env::var("APRENDE_TOKEN") {
        config = config.with_auth(Arc::new(StaticToken::new(token)));
    }

    let manager = ConnectionManager::new(config);
    manager.on(
        EventKind::StateChange,
        listener(|event| {
            if let Event::StateChange(state) = event {
                info!(%state, "connection state");
            }
        }),
    );
    manager.on(
        EventKind::Message,
        listener(|event| {
            if let Event::Message(payload) = event {
                info!(
                    kind = payload.get("type").and_then(|t| t.as_str()).unwrap_or("unknown"),
                    %payload,
                    "message"
                );
            }
        }),
    );
    manager.on(
        EventKind::Error,
        listener(|event| {
            if let Event::Error(error) = event {
                warn!(kind = ?error.kind, message = %error.message, "error");
            }
        }),
    );

    let reconnector = Reconnector::spawn(manager.clone(), ReconnectConfig::default());

    manager.connect().await?;
    manager.send(&json!({ "type": "chat_message", "message": "Olá a todos!" }))?;

    tokio::signal::ctrl_c().await?;

    reconnector.cancel();
    manager.disconnect();

    Ok(())
}
