//! Application state for the demo server

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use claims_realtime::websocket::{Envelope, DASHBOARD_STATS};
use claims_realtime::{Claim, ClaimStatus, DashboardStats, FraudAlert, RecordId};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

/// Name reported in the `server` field of every envelope
pub const SERVER_NAME: &str = "claims-demo";

/// In-memory claims and fraud alerts
#[derive(Debug, Default)]
pub struct Store {
    pub claims: BTreeMap<i64, Claim>,
    pub alerts: BTreeMap<i64, FraudAlert>,
    next_alert_id: i64,
}

impl Store {
    /// A store with a handful of sample claims
    pub fn seeded() -> Self {
        let now = Utc::now().to_rfc3339();
        let samples = [
            (1, "Ada Brooks", 1250.0, ClaimStatus::Pending, 0.12),
            (2, "Ben Ortiz", 18400.0, ClaimStatus::UnderReview, 0.81),
            (3, "Chen Wei", 560.25, ClaimStatus::Approved, 0.05),
            (4, "Dana Kim", 7300.0, ClaimStatus::Rejected, 0.64),
        ];

        let claims = samples
            .into_iter()
            .map(|(id, name, amount, status, score)| {
                let claim = Claim {
                    id: RecordId::Number(id),
                    claim_number: Some(format!("CLM-{id:04}")),
                    policy_number: Some(format!("POL-{:05}", 1000 + id)),
                    claimant_name: Some(name.to_string()),
                    amount,
                    status,
                    fraud_score: Some(score),
                    created_at: Some(now.clone()),
                    updated_at: Some(now.clone()),
                };
                (id, claim)
            })
            .collect();

        Self {
            claims,
            alerts: BTreeMap::new(),
            next_alert_id: 1,
        }
    }

    /// Reserve the next fraud alert id
    pub fn next_alert_id(&mut self) -> i64 {
        let id = self.next_alert_id.max(1);
        self.next_alert_id = id + 1;
        id
    }

    /// Aggregate the dashboard figures from the current store
    pub fn stats(&self) -> DashboardStats {
        let count = |status: ClaimStatus| {
            self.claims.values().filter(|c| c.status == status).count() as u64
        };
        DashboardStats {
            total_claims: self.claims.len() as u64,
            pending_claims: count(ClaimStatus::Pending) + count(ClaimStatus::UnderReview),
            approved_claims: count(ClaimStatus::Approved) + count(ClaimStatus::Paid),
            rejected_claims: count(ClaimStatus::Rejected),
            active_fraud_alerts: self.alerts.len() as u64,
            total_amount: self.claims.values().map(|c| c.amount).sum(),
            extra: Default::default(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
    /// Encoded envelopes fanned out to every connected socket
    pub pushes: broadcast::Sender<String>,
}

impl AppState {
    pub fn new() -> Self {
        let (pushes, _) = broadcast::channel(256);
        Self {
            store: Arc::new(RwLock::new(Store::seeded())),
            pushes,
        }
    }

    /// Push an envelope to every connected socket
    pub fn push(&self, kind: &str, payload: Value) {
        let envelope = envelope(kind, payload);
        match envelope.encode() {
            Ok(text) => {
                let receivers = self.pushes.send(text).unwrap_or(0);
                tracing::debug!(kind, receivers, "pushed envelope");
            }
            Err(e) => tracing::error!(kind, error = %e, "failed to encode envelope"),
        }
    }

    /// Push the current dashboard statistics
    pub async fn push_stats(&self) {
        let stats = self.store.read().await.stats();
        match serde_json::to_value(stats) {
            Ok(payload) => self.push(DASHBOARD_STATS, payload),
            Err(e) => tracing::error!(error = %e, "failed to encode dashboard stats"),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Envelope stamped with the current time and this server's name
pub fn envelope(kind: &str, payload: Value) -> Envelope {
    Envelope::new(kind, payload)
        .with_timestamp(Utc::now().to_rfc3339())
        .with_server(SERVER_NAME)
}
