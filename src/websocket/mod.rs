//! Realtime push client for claim, fraud and dashboard updates
//!
//! This module owns the persistent WebSocket connection to the claims server. It
//! handles connection management, linear-backoff reconnection and keepalive pings,
//! decodes every pushed envelope and fans it out to independent listener registries.
//!
//! # Example
//!
//! ```ignore
//! use claims_realtime::websocket::RealtimeClient;
//!
//! let client = RealtimeClient::local();
//! let subscription = client.on_claim_update(|update| {
//!     println!("claim {:?} changed", update.claim_id);
//! });
//! client.connect();
//!
//! // Later, when the consumer goes away
//! subscription.unsubscribe();
//! ```

mod client;
mod message;
mod reconnect;
mod registry;
mod router;

pub use client::{ConnectionState, RealtimeClient};
pub use message::{
    Envelope, PushMessage, CLAIM_UPDATED, CONNECTION_ESTABLISHED, DASHBOARD_STATS,
    FRAUD_ALERT_CREATED, FRAUD_ALERT_DISMISSED, PING_FRAME,
};
pub use reconnect::{Backoff, ReconnectConfig, DEFAULT_MAX_ATTEMPTS};
pub use registry::{EventRegistry, Registry, Subscription};
pub use router::ConnectionStatus;
pub(crate) use router::Router;
