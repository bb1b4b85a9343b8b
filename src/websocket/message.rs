//! Push envelopes and their typed form

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{ClaimUpdate, ConnectionEstablished, DashboardStats, FraudAlert};

/// Tag sent once the server has registered the connection
pub const CONNECTION_ESTABLISHED: &str = "connection_established";
/// Tag for a claim status change
pub const CLAIM_UPDATED: &str = "claim_updated";
/// Tag for a newly raised fraud alert
pub const FRAUD_ALERT_CREATED: &str = "fraud_alert_created";
/// Tag for a dismissed fraud alert
pub const FRAUD_ALERT_DISMISSED: &str = "fraud_alert_dismissed";
/// Tag for a dashboard statistics snapshot
pub const DASHBOARD_STATS: &str = "dashboard_stats";

/// Keepalive frame sent by the client
pub const PING_FRAME: &str = "ping";

/// JSON frame wrapping every pushed payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Tag-specific payload
    #[serde(default)]
    pub payload: Value,
    /// ISO-8601 send time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Id of the server instance that sent the frame
    #[serde(default, alias = "serverId", skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl Envelope {
    /// Create an envelope without timestamp or server id
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: None,
            server: None,
        }
    }

    /// Set the send time
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Set the server id
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Parse a text frame
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Decode(format!("invalid envelope: {e}")))
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the payload according to the tag
    ///
    /// A recognized tag always yields its variant. A payload that is missing or does
    /// not fit the typed shape is logged and delivered as the default value with the
    /// raw fields kept in `extra`; the push only signals that state changed.
    pub fn to_message(&self) -> PushMessage {
        match self.kind.as_str() {
            CONNECTION_ESTABLISHED => PushMessage::ConnectionEstablished(self.payload_as()),
            CLAIM_UPDATED => PushMessage::ClaimUpdated(self.payload_as()),
            FRAUD_ALERT_CREATED => PushMessage::FraudAlertCreated(self.payload_as()),
            FRAUD_ALERT_DISMISSED => PushMessage::FraudAlertDismissed(self.payload_as()),
            DASHBOARD_STATS => PushMessage::DashboardStats(self.payload_as()),
            _ => PushMessage::Other {
                kind: self.kind.clone(),
                payload: self.payload.clone(),
            },
        }
    }

    fn payload_as<T: Payload>(&self) -> T {
        match T::deserialize(&self.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "payload does not match its tag, keeping raw fields");
                let raw = match &self.payload {
                    Value::Object(fields) => fields.clone(),
                    Value::Null => Map::new(),
                    other => Map::from_iter([("value".to_string(), other.clone())]),
                };
                T::from_raw(raw)
            }
        }
    }
}

/// Typed payload that can be rebuilt from raw fields when strict decoding fails
trait Payload: DeserializeOwned + Default {
    fn from_raw(raw: Map<String, Value>) -> Self;
}

impl Payload for ConnectionEstablished {
    fn from_raw(raw: Map<String, Value>) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            client_id: text("client_id").or_else(|| text("clientId")),
            message: text("message"),
            timestamp: text("timestamp"),
        }
    }
}

impl Payload for ClaimUpdate {
    fn from_raw(raw: Map<String, Value>) -> Self {
        Self {
            extra: raw,
            ..Self::default()
        }
    }
}

impl Payload for FraudAlert {
    fn from_raw(raw: Map<String, Value>) -> Self {
        Self {
            extra: raw,
            ..Self::default()
        }
    }
}

impl Payload for DashboardStats {
    fn from_raw(raw: Map<String, Value>) -> Self {
        Self {
            extra: raw,
            ..Self::default()
        }
    }
}

/// Typed push message, one variant per recognized tag
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    ConnectionEstablished(ConnectionEstablished),
    ClaimUpdated(ClaimUpdate),
    FraudAlertCreated(FraudAlert),
    FraudAlertDismissed(FraudAlert),
    DashboardStats(DashboardStats),
    /// Any tag this client does not model
    Other { kind: String, payload: Value },
}

impl PushMessage {
    /// The envelope tag this message was decoded from
    pub fn kind(&self) -> &str {
        match self {
            PushMessage::ConnectionEstablished(_) => CONNECTION_ESTABLISHED,
            PushMessage::ClaimUpdated(_) => CLAIM_UPDATED,
            PushMessage::FraudAlertCreated(_) => FRAUD_ALERT_CREATED,
            PushMessage::FraudAlertDismissed(_) => FRAUD_ALERT_DISMISSED,
            PushMessage::DashboardStats(_) => DASHBOARD_STATS,
            PushMessage::Other { kind, .. } => kind,
        }
    }

    /// Whether the tag is one of the modelled ones
    pub fn is_recognized(&self) -> bool {
        !matches!(self, PushMessage::Other { .. })
    }
}
