//! Domain types shared by the REST collaborator and the push payloads
//!
//! Push payloads are decoded leniently: every field the dashboard does not strictly
//! need is optional, and unknown fields are kept in `extra` so nothing the server
//! sends is silently lost.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Common Types
// ============================================================================

/// Identifier of a claim or alert
///
/// The backend has used both numeric and string identifiers, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric database id
    Number(i64),
    /// Opaque string id
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{n}"),
            RecordId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Number(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

/// Processing status of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Submitted, not yet looked at
    Pending,
    /// Assigned to an adjuster
    UnderReview,
    /// Approved for payment
    Approved,
    /// Rejected
    Rejected,
    /// Paid out
    Paid,
    /// A status this client does not know about yet
    #[serde(other)]
    Unknown,
}

impl ClaimStatus {
    /// Whether no further transitions are expected
    pub fn is_final(&self) -> bool {
        matches!(self, ClaimStatus::Rejected | ClaimStatus::Paid)
    }
}

// ============================================================================
// REST Types
// ============================================================================

/// A claim as returned by the claims endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimant_name: Option<String>,
    #[serde(default)]
    pub amount: f64,
    pub status: ClaimStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

// ============================================================================
// Push Payload Types
// ============================================================================

/// Payload of a `connection_established` envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    /// Id the server assigned to this connection
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Payload of a `claim_updated` envelope
///
/// Treat this as an invalidation signal; the claims endpoint stays authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimUpdate {
    #[serde(default, alias = "claimId", skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClaimStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<ClaimStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `fraud_alert_created` and `fraud_alert_dismissed` envelopes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, alias = "claimId", skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dashboard statistics snapshot, pushed as `dashboard_stats` and served by REST
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_claims: u64,
    #[serde(default)]
    pub pending_claims: u64,
    #[serde(default)]
    pub approved_claims: u64,
    #[serde(default)]
    pub rejected_claims: u64,
    #[serde(default)]
    pub active_fraud_alerts: u64,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_accepts_numbers_and_strings() {
        let n: RecordId = serde_json::from_str("42").unwrap();
        let s: RecordId = serde_json::from_str(r#""CLM-7""#).unwrap();
        assert_eq!(n, RecordId::Number(42));
        assert_eq!(s, RecordId::Text("CLM-7".to_string()));
        assert_eq!(n.to_string(), "42");
        assert_eq!(s.to_string(), "CLM-7");
    }

    #[test]
    fn test_claim_status_snake_case() {
        let status: ClaimStatus = serde_json::from_str(r#""under_review""#).unwrap();
        assert_eq!(status, ClaimStatus::UnderReview);
        assert_eq!(
            serde_json::to_string(&ClaimStatus::Approved).unwrap(),
            r#""approved""#
        );
    }

    #[test]
    fn test_claim_status_unknown_falls_back() {
        let status: ClaimStatus = serde_json::from_str(r#""escalated""#).unwrap();
        assert_eq!(status, ClaimStatus::Unknown);
    }

    #[test]
    fn test_claim_status_is_final() {
        assert!(ClaimStatus::Paid.is_final());
        assert!(ClaimStatus::Rejected.is_final());
        assert!(!ClaimStatus::Pending.is_final());
    }

    #[test]
    fn test_claim_deserialize_minimal() {
        let claim: Claim = serde_json::from_str(r#"{"id": 1, "status": "pending"}"#).unwrap();
        assert_eq!(claim.id, RecordId::Number(1));
        assert_eq!(claim.amount, 0.0);
        assert!(claim.claimant_name.is_none());
    }

    #[test]
    fn test_connection_established_accepts_both_spellings() {
        let snake: ConnectionEstablished =
            serde_json::from_str(r#"{"client_id": "abc123"}"#).unwrap();
        let camel: ConnectionEstablished =
            serde_json::from_str(r#"{"clientId": "abc123"}"#).unwrap();
        assert_eq!(snake.client_id.as_deref(), Some("abc123"));
        assert_eq!(camel.client_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_claim_update_keeps_unknown_fields() {
        let update: ClaimUpdate = serde_json::from_str(
            r#"{"claim_id": 9, "status": "approved", "adjuster": "kim"}"#,
        )
        .unwrap();
        assert_eq!(update.claim_id, Some(RecordId::Number(9)));
        assert_eq!(update.status, Some(ClaimStatus::Approved));
        assert_eq!(update.extra.get("adjuster"), Some(&Value::from("kim")));
    }

    #[test]
    fn test_dashboard_stats_defaults_missing_counts() {
        let stats: DashboardStats = serde_json::from_str(r#"{"total_claims": 10}"#).unwrap();
        assert_eq!(stats.total_claims, 10);
        assert_eq!(stats.pending_claims, 0);
        assert!(stats.extra.is_empty());
    }
}
