mod config;

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use duet_gateway::connection;
use duet_gateway::dispatcher::Dispatcher;

use crate::config::ServerConfig;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    heartbeat: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=debug,duet_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let state = ServerState {
        dispatcher: Dispatcher::new(),
        heartbeat: config.heartbeat,
    };

    let app = router(state);

    let addr = config.addr()?;
    info!("Duet relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.heartbeat)
    })
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "rooms": state.dispatcher.room_count().await,
        "sessions": state.dispatcher.session_count().await,
    }))
}
