//! Routing of decoded envelopes to the listener registries

use serde_json::Value;

use crate::types::{ClaimUpdate, DashboardStats, FraudAlert};
use crate::websocket::message::{Envelope, PushMessage};
use crate::websocket::registry::{EventRegistry, Registry, Subscription};

/// What connection listeners receive
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Whether the server has acknowledged the connection
    pub connected: bool,
    /// Id assigned by the server, present only while connected
    pub client_id: Option<String>,
    /// Set on the final disconnect after the reconnect ceiling was hit
    pub retries_exhausted: bool,
}

impl ConnectionStatus {
    /// Connection acknowledged by the server
    pub fn connected(client_id: Option<String>) -> Self {
        Self {
            connected: true,
            client_id,
            retries_exhausted: false,
        }
    }

    /// Connection lost or closed
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Connection lost and no more reconnects will be attempted
    pub fn exhausted() -> Self {
        Self {
            retries_exhausted: true,
            ..Self::default()
        }
    }
}

/// The registries every push is fanned out to
///
/// Fraud listeners are not told whether an alert was created or dismissed; subscribe to
/// the literal tag through [`Router::on_event`] when the distinction matters.
#[derive(Debug, Clone)]
pub struct Router {
    claims: Registry<ClaimUpdate>,
    fraud: Registry<FraudAlert>,
    stats: Registry<DashboardStats>,
    connection: Registry<ConnectionStatus>,
    events: EventRegistry,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with empty registries
    pub fn new() -> Self {
        Self {
            claims: Registry::new("claims"),
            fraud: Registry::new("fraud"),
            stats: Registry::new("stats"),
            connection: Registry::new("connection"),
            events: EventRegistry::new(),
        }
    }

    /// Listen for claim status changes
    pub fn on_claim_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ClaimUpdate) + Send + Sync + 'static,
    {
        self.claims.subscribe(callback)
    }

    /// Listen for created and dismissed fraud alerts
    pub fn on_fraud_alert<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&FraudAlert) + Send + Sync + 'static,
    {
        self.fraud.subscribe(callback)
    }

    /// Listen for dashboard statistics snapshots
    pub fn on_dashboard_stats<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DashboardStats) + Send + Sync + 'static,
    {
        self.stats.subscribe(callback)
    }

    /// Listen for connection status changes
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.connection.subscribe(callback)
    }

    /// Listen for the raw payload of every envelope tagged `kind`
    pub fn on_event<F>(&self, kind: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    /// Parse a text frame into its envelope and typed message
    ///
    /// Frames that are not JSON or lack a `type` are logged and yield `None`; nothing
    /// is dispatched for them.
    pub(crate) fn decode(&self, text: &str) -> Option<(Envelope, PushMessage)> {
        match Envelope::decode(text) {
            Ok(envelope) => {
                let message = envelope.to_message();
                Some((envelope, message))
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                None
            }
        }
    }

    /// Fan a decoded message out to its registry, then to the tag's generic listeners
    pub(crate) fn dispatch(&self, envelope: &Envelope, message: &PushMessage) {
        let delivered = match message {
            PushMessage::ConnectionEstablished(payload) => self
                .connection
                .emit(&ConnectionStatus::connected(payload.client_id.clone())),
            PushMessage::ClaimUpdated(update) => self.claims.emit(update),
            PushMessage::FraudAlertCreated(alert) | PushMessage::FraudAlertDismissed(alert) => {
                self.fraud.emit(alert)
            }
            PushMessage::DashboardStats(stats) => self.stats.emit(stats),
            PushMessage::Other { .. } => 0,
        };
        let generic = self.events.emit(&envelope.kind, &envelope.payload);

        tracing::debug!(kind = %envelope.kind, delivered, generic, "dispatched envelope");
    }

    /// Decode and dispatch a text frame in one step
    #[cfg(test)]
    pub(crate) fn route_text(&self, text: &str) -> Option<PushMessage> {
        let (envelope, message) = self.decode(text)?;
        self.dispatch(&envelope, &message);
        Some(message)
    }

    /// Notify connection listeners of a status change outside the message stream
    pub(crate) fn notify_connection(&self, status: ConnectionStatus) {
        self.connection.emit(&status);
    }
}
