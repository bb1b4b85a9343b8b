//! Endpoint and connection configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::websocket::ReconnectConfig;

/// Push endpoint of the local development server
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// REST base URL of the local development server
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Interval between keepalive pings
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint pushing envelopes
    pub ws_url: String,
    /// Base URL of the REST API
    pub api_url: String,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
    /// Keepalive interval (None disables the heartbeat)
    pub heartbeat_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
        }
    }
}

impl Config {
    /// Build a configuration from the process environment
    ///
    /// Reads `CLAIMS_WS_URL`, `CLAIMS_API_URL`, `CLAIMS_RECONNECT_DELAY_MS`,
    /// `CLAIMS_RECONNECT_MAX_ATTEMPTS` and `CLAIMS_HEARTBEAT_SECS`. Unset variables
    /// keep their defaults; a heartbeat of `0` disables it.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CLAIMS_WS_URL") {
            config.ws_url = url;
        }
        if let Some(url) = lookup("CLAIMS_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CLAIMS_RECONNECT_DELAY_MS")? {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<u32>(&lookup, "CLAIMS_RECONNECT_MAX_ATTEMPTS")? {
            config.reconnect.max_attempts = max;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CLAIMS_HEARTBEAT_SECS")? {
            config.heartbeat_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Set the WebSocket endpoint
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the REST base URL
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the reconnection policy
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set or disable the keepalive interval
    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        None => Ok(None),
    }
}
