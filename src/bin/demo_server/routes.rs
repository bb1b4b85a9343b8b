//! API and push routes for the demo server

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, delete, get, post},
    Json, Router,
};
use chrono::Utc;
use claims_realtime::websocket::{
    CLAIM_UPDATED, CONNECTION_ESTABLISHED, FRAUD_ALERT_CREATED, FRAUD_ALERT_DISMISSED, PING_FRAME,
};
use claims_realtime::{ClaimStatus, FraudAlert, RecordId};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::state::{envelope, AppState};

/// Error body understood by the REST client
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Build API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/claims", get(list_claims))
        .route("/claims/:id", get(get_claim))
        .route("/claims/:id/status", post(update_claim_status))
        .route("/dashboard/stats", get(get_dashboard_stats))
        .route("/fraud/alerts", get(list_fraud_alerts).post(create_fraud_alert))
        .route("/fraud/alerts/:id", delete(dismiss_fraud_alert))
}

/// Push route
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", any(ws_handler))
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Deserialize)]
pub struct StatusChange {
    pub status: ClaimStatus,
}

#[derive(Deserialize)]
pub struct NewFraudAlert {
    pub claim_id: i64,
    pub risk_score: Option<f64>,
    pub reason: Option<String>,
}

// =============================================================================
// Claims
// =============================================================================

/// GET /api/claims - All claims
async fn list_claims(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    Json(store.claims.values().cloned().collect::<Vec<_>>())
}

/// GET /api/claims/:id - One claim
async fn get_claim(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let store = state.store.read().await;
    match store.claims.get(&id) {
        Some(claim) => Json(claim.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Claim not found"),
    }
}

/// POST /api/claims/:id/status - Change a claim's status and push the change
async fn update_claim_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> Response {
    let (claim, previous) = {
        let mut store = state.store.write().await;
        let Some(claim) = store.claims.get_mut(&id) else {
            return api_error(StatusCode::NOT_FOUND, "Claim not found");
        };
        let previous = claim.status;
        claim.status = change.status;
        claim.updated_at = Some(Utc::now().to_rfc3339());
        (claim.clone(), previous)
    };

    tracing::info!(claim = id, from = ?previous, to = ?claim.status, "claim status changed");
    state.push(
        CLAIM_UPDATED,
        json!({
            "claim_id": id,
            "status": claim.status,
            "previous_status": previous,
        }),
    );
    state.push_stats().await;

    Json(claim).into_response()
}

// =============================================================================
// Dashboard
// =============================================================================

/// GET /api/dashboard/stats - Aggregated figures
async fn get_dashboard_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.read().await.stats())
}

// =============================================================================
// Fraud Alerts
// =============================================================================

/// GET /api/fraud/alerts - Open fraud alerts
async fn list_fraud_alerts(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    Json(store.alerts.values().cloned().collect::<Vec<_>>())
}

/// POST /api/fraud/alerts - Raise an alert against a claim
async fn create_fraud_alert(
    State(state): State<AppState>,
    Json(request): Json<NewFraudAlert>,
) -> Response {
    let alert = {
        let mut store = state.store.write().await;
        if !store.claims.contains_key(&request.claim_id) {
            return api_error(StatusCode::NOT_FOUND, "Claim not found");
        }
        let id = store.next_alert_id();
        let alert = FraudAlert {
            id: Some(RecordId::Number(id)),
            claim_id: Some(RecordId::Number(request.claim_id)),
            risk_score: request.risk_score,
            reason: request.reason,
            status: Some("open".to_string()),
            extra: Default::default(),
        };
        store.alerts.insert(id, alert.clone());
        alert
    };

    tracing::info!(alert = ?alert.id, claim = request.claim_id, "fraud alert created");
    match serde_json::to_value(&alert) {
        Ok(payload) => state.push(FRAUD_ALERT_CREATED, payload),
        Err(e) => tracing::error!(error = %e, "failed to encode fraud alert"),
    }
    state.push_stats().await;

    (StatusCode::CREATED, Json(alert)).into_response()
}

/// DELETE /api/fraud/alerts/:id - Dismiss an alert
async fn dismiss_fraud_alert(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let removed = state.store.write().await.alerts.remove(&id);
    let Some(mut alert) = removed else {
        return api_error(StatusCode::NOT_FOUND, "Fraud alert not found");
    };
    alert.status = Some("dismissed".to_string());

    tracing::info!(alert = id, "fraud alert dismissed");
    match serde_json::to_value(&alert) {
        Ok(payload) => state.push(FRAUD_ALERT_DISMISSED, payload),
        Err(e) => tracing::error!(error = %e, "failed to encode fraud alert"),
    }
    state.push_stats().await;

    Json(alert).into_response()
}

// =============================================================================
// Push Socket
// =============================================================================

/// Upgrade to the push socket
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4().to_string();
    let mut pushes = state.pushes.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let greeting = envelope(
        CONNECTION_ESTABLISHED,
        json!({ "client_id": client_id, "message": "Connected to claims updates" }),
    );
    match greeting.encode() {
        Ok(text) => {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode greeting");
            return;
        }
    }
    tracing::info!(%client_id, "push client connected");

    loop {
        tokio::select! {
            push = pushes.recv() => match push {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%client_id, skipped, "push client lagging");
                }
                Err(RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) if text == PING_FRAME => {
                    tracing::trace!(%client_id, "ping");
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(%client_id, %text, "ignoring client message");
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(%client_id, "push client disconnected");
}
