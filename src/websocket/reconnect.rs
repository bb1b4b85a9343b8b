//! Reconnection policy
//!
//! Delays grow linearly: attempt `n` waits `base_delay * n`.

use std::time::Duration;

/// Default ceiling on consecutive reconnect attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Configuration for automatic reconnection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Whether to automatically reconnect after an abnormal close
    pub enabled: bool,
    /// Delay unit; attempt `n` waits `base_delay * n`
    pub base_delay: Duration,
    /// Maximum number of consecutive reconnect attempts
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_secs(1),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect config with reconnection disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1))
    }

    /// Check if reconnect attempt number `attempt` (1-indexed) may be made
    pub fn should_attempt(&self, attempt: u32) -> bool {
        self.enabled && attempt >= 1 && attempt <= self.max_attempts
    }
}

/// Attempt counter driving [`ReconnectConfig`]
///
/// One `Backoff` lives per connection cycle. It is bumped on every abnormal close and
/// reset when a socket opens, so delays never compound across separate outages.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    /// Start counting from zero attempts
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Attempts made since the last successful open
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Register a failure and return the delay before the next attempt
    ///
    /// Returns `None` once the ceiling is exceeded (or reconnection is disabled); the
    /// counter then stays put so repeated calls keep returning `None`.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let next = self.attempt.saturating_add(1);
        if !self.config.should_attempt(next) {
            return None;
        }
        self.attempt = next;
        Some(self.config.delay_for_attempt(next))
    }

    /// Forget earlier failures after a successful open
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
