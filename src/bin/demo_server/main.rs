//! Demo server for the claims realtime client
//!
//! Serves the claims REST API from an in-memory store and pushes envelopes over
//! `/ws` whenever a claim or fraud alert changes.
//! Run with: `cargo run --bin demo-server --features demo`

use axum::{response::IntoResponse, routing::get, Json, Router};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod routes;
mod state;

use state::AppState;

/// Listen address unless `CLAIMS_DEMO_ADDR` overrides it
const DEFAULT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8000);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demo_server=debug,claims_realtime=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = AppState::new();

    // Configure CORS - allow any origin for demo purposes
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes::api_routes())
        .merge(routes::ws_routes())
        .layer(cors)
        .with_state(state);

    let addr = match std::env::var("CLAIMS_DEMO_ADDR") {
        Ok(raw) => match raw.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!("Invalid CLAIMS_DEMO_ADDR {:?}: {}", raw, e);
                return;
            }
        },
        Err(_) => SocketAddr::from(DEFAULT_ADDR),
    };
    tracing::info!("Demo server listening on http://{} (push socket at /ws)", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "claims-demo-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
