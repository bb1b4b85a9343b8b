//! Re-fetching authoritative state after a push
//!
//! A push only says that something changed. A [`Refresher`] answers by fetching the
//! full state from a [`RefreshSource`] (usually the REST [`Client`]) and publishing
//! the result on a `watch` channel.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::client::Client;
use crate::error::Result;
use crate::types::{Claim, DashboardStats, FraudAlert};

/// Something that can produce the authoritative value behind a push
pub trait RefreshSource: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Fetch the current value
    fn fetch(&self) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// All claims, from `GET /claims`
#[derive(Debug, Clone)]
pub struct ClaimsSource(pub Client);

impl RefreshSource for ClaimsSource {
    type Output = Vec<Claim>;

    fn fetch(&self) -> impl Future<Output = Result<Self::Output>> + Send {
        self.0.claims()
    }
}

/// Dashboard statistics, from `GET /dashboard/stats`
#[derive(Debug, Clone)]
pub struct DashboardStatsSource(pub Client);

impl RefreshSource for DashboardStatsSource {
    type Output = DashboardStats;

    fn fetch(&self) -> impl Future<Output = Result<Self::Output>> + Send {
        self.0.dashboard_stats()
    }
}

/// Fraud alerts, from `GET /fraud/alerts`
#[derive(Debug, Clone)]
pub struct FraudAlertsSource(pub Client);

impl RefreshSource for FraudAlertsSource {
    type Output = Vec<FraudAlert>;

    fn fetch(&self) -> impl Future<Output = Result<Self::Output>> + Send {
        self.0.fraud_alerts()
    }
}

/// Latest refresh outcome
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshState<T> {
    /// Last successfully fetched value
    pub data: Option<T>,
    /// Error of the most recent fetch, cleared by the next success
    pub last_error: Option<String>,
    /// Sequence number of the fetch that produced this state (0 before any)
    pub generation: u64,
}

impl<T> Default for RefreshState<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_error: None,
            generation: 0,
        }
    }
}

struct RefresherInner<S: RefreshSource> {
    source: S,
    state_tx: watch::Sender<RefreshState<S::Output>>,
    issued: AtomicU64,
}

/// Runs fetches against a [`RefreshSource`] and keeps the newest result
///
/// Fetches may overlap; a fetch that completes after a newer one was applied is
/// discarded. Clones share the same state.
pub struct Refresher<S: RefreshSource> {
    inner: Arc<RefresherInner<S>>,
}

impl<S: RefreshSource> Clone for Refresher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RefreshSource> std::fmt::Debug for Refresher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("issued", &self.issued())
            .field("applied", &self.inner.state_tx.borrow().generation)
            .finish()
    }
}

impl<S: RefreshSource> Refresher<S> {
    pub fn new(source: S) -> Self {
        let (state_tx, _) = watch::channel(RefreshState::default());
        Self {
            inner: Arc::new(RefresherInner {
                source,
                state_tx,
                issued: AtomicU64::new(0),
            }),
        }
    }

    /// Start a fetch in the background
    ///
    /// Must be called from within a tokio runtime; otherwise it logs and does nothing.
    pub fn trigger(&self) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "refresh requested outside a tokio runtime");
                return;
            }
        };

        let generation = self.inner.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let outcome = inner.source.fetch().await.map_err(|e| e.to_string());
            inner.apply(generation, outcome);
        });
    }

    /// Fetch now and wait for the result to be applied
    pub async fn refresh(&self) -> Result<()> {
        let generation = self.inner.issued.fetch_add(1, Ordering::Relaxed) + 1;
        match self.inner.source.fetch().await {
            Ok(data) => {
                self.inner.apply(generation, Ok(data));
                Ok(())
            }
            Err(e) => {
                self.inner.apply(generation, Err(e.to_string()));
                Err(e)
            }
        }
    }

    /// Watch refresh results
    pub fn receiver(&self) -> watch::Receiver<RefreshState<S::Output>> {
        self.inner.state_tx.subscribe()
    }

    /// Number of fetches started so far
    pub fn issued(&self) -> u64 {
        self.inner.issued.load(Ordering::Relaxed)
    }

    /// The latest successfully fetched value
    pub fn current(&self) -> Option<S::Output>
    where
        S::Output: Clone,
    {
        self.inner.state_tx.borrow().data.clone()
    }
}

impl<S: RefreshSource> RefresherInner<S> {
    fn apply(&self, generation: u64, outcome: std::result::Result<S::Output, String>) {
        self.state_tx.send_if_modified(|state| {
            if generation < state.generation {
                tracing::debug!(generation, applied = state.generation, "discarding stale refresh");
                return false;
            }
            state.generation = generation;
            match outcome {
                Ok(data) => {
                    state.data = Some(data);
                    state.last_error = None;
                }
                Err(e) => {
                    tracing::warn!(generation, error = %e, "refresh failed");
                    state.last_error = Some(e);
                }
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Source that answers each fetch after a scripted delay
    struct ScriptedSource {
        calls: AtomicU64,
        script: Mutex<Vec<(Duration, Result<u32>)>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Result<u32>)>) -> Self {
            Self {
                calls: AtomicU64::new(0),
                script: Mutex::new(script),
            }
        }
    }

    impl RefreshSource for ScriptedSource {
        type Output = u32;

        fn fetch(&self) -> impl Future<Output = Result<u32>> + Send {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let (delay, result) = self.script.lock().unwrap().remove(0);
            async move {
                tokio::time::sleep(delay).await;
                result
            }
        }
    }

    #[tokio::test]
    async fn test_refresh_applies_value() {
        let refresher = Refresher::new(ScriptedSource::new(vec![(Duration::ZERO, Ok(7))]));
        refresher.refresh().await.unwrap();

        assert_eq!(refresher.inner.source.calls.load(Ordering::Relaxed), 1);
        assert_eq!(refresher.current(), Some(7));
        assert_eq!(refresher.issued(), 1);
        assert_eq!(refresher.receiver().borrow().generation, 1);
    }

    #[tokio::test]
    async fn test_refresh_error_keeps_previous_data() {
        let refresher = Refresher::new(ScriptedSource::new(vec![
            (Duration::ZERO, Ok(1)),
            (Duration::ZERO, Err(Error::Api("HTTP 500 - boom".to_string()))),
        ]));
        refresher.refresh().await.unwrap();
        let err = refresher.refresh().await.unwrap_err();
        assert!(matches!(err, Error::Api(_)));

        let state = refresher.receiver().borrow().clone();
        assert_eq!(state.data, Some(1));
        assert!(state.last_error.unwrap().contains("boom"));
        assert_eq!(state.generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fetch_does_not_overwrite_newer() {
        // First fetch is slow, second is fast; the slow answer must be dropped
        let refresher = Refresher::new(ScriptedSource::new(vec![
            (Duration::from_millis(100), Ok(1)),
            (Duration::from_millis(10), Ok(2)),
        ]));
        let mut rx = refresher.receiver();

        refresher.trigger();
        refresher.trigger();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().data, Some(2));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(refresher.current(), Some(2));
        assert_eq!(rx.borrow().generation, 2);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_trigger_outside_runtime_is_a_no_op() {
        let refresher = Refresher::new(ScriptedSource::new(vec![]));
        refresher.trigger();
        assert_eq!(refresher.issued(), 0);
    }
}
