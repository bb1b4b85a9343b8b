//! Claims realtime client
//!
//! A Rust client for the claims-processing backend, including:
//! - A shared WebSocket connection with reconnection and keepalive
//! - Typed push events fanned out to independent listener registries
//! - Bindings that track the latest push and trigger REST re-fetches
//! - REST endpoints for claims, fraud alerts and dashboard statistics

mod api;
pub mod binding;
pub mod client;
pub mod config;
pub mod error;
pub mod refresh;
pub mod types;
pub mod websocket;

pub use binding::Binding;
pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use refresh::{RefreshSource, RefreshState, Refresher};
pub use types::*;
pub use websocket::{
    ConnectionState, ConnectionStatus, RealtimeClient, ReconnectConfig, Subscription,
};
