//! Consumer-side bindings over the shared realtime connection
//!
//! A [`Binding`] is what a view holds while it is mounted: it makes sure the shared
//! connection is up, listens to exactly one registry, and remembers the latest
//! payload together with how many deliveries it has seen. Dropping it (or calling
//! [`Binding::deactivate`]) removes the listener; the connection stays open for
//! other bindings.
//!
//! # Example
//! ```ignore
//! use claims_realtime::{Binding, Client, RealtimeClient};
//! use claims_realtime::refresh::{ClaimsSource, Refresher};
//!
//! let realtime = RealtimeClient::local();
//! let claims = Refresher::new(ClaimsSource(Client::local()?));
//! let binding = Binding::claim_updates(&realtime).refreshing(&claims);
//!
//! // later, once the view goes away
//! drop(binding);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::refresh::{RefreshSource, Refresher};
use crate::types::{ClaimUpdate, DashboardStats, FraudAlert};
use crate::websocket::{ConnectionStatus, RealtimeClient, Subscription};

type Hook = Arc<dyn Fn() + Send + Sync>;

struct Tracked<T> {
    last: Option<T>,
    update_count: u64,
    hooks: Vec<Hook>,
}

impl<T> Default for Tracked<T> {
    fn default() -> Self {
        Self {
            last: None,
            update_count: 0,
            hooks: Vec::new(),
        }
    }
}

/// A live subscription to one kind of push, with the last value it received
#[must_use = "a binding stops listening as soon as it is dropped"]
pub struct Binding<T> {
    client: RealtimeClient,
    subscription: Option<Subscription>,
    tracked: Arc<Mutex<Tracked<T>>>,
}

impl<T> std::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("active", &self.is_active())
            .field("update_count", &self.update_count())
            .finish_non_exhaustive()
    }
}

impl Binding<ClaimUpdate> {
    /// Track `claim_updated` pushes
    pub fn claim_updates(client: &RealtimeClient) -> Self {
        Self::activate(client, |client, deliver| {
            client.on_claim_update(move |update| deliver(update))
        })
    }
}

impl Binding<FraudAlert> {
    /// Track fraud alerts, created and dismissed alike
    pub fn fraud_alerts(client: &RealtimeClient) -> Self {
        Self::activate(client, |client, deliver| {
            client.on_fraud_alert(move |alert| deliver(alert))
        })
    }
}

impl Binding<DashboardStats> {
    /// Track dashboard statistics snapshots
    pub fn dashboard_stats(client: &RealtimeClient) -> Self {
        Self::activate(client, |client, deliver| {
            client.on_dashboard_stats(move |stats| deliver(stats))
        })
    }
}

impl Binding<ConnectionStatus> {
    /// Track connection status changes
    pub fn connection_status(client: &RealtimeClient) -> Self {
        Self::activate(client, |client, deliver| {
            client.on_connection_change(move |status| deliver(status))
        })
    }
}

impl Binding<Value> {
    /// Track the raw payload of every envelope tagged `kind`
    pub fn event(client: &RealtimeClient, kind: &str) -> Self {
        Self::activate(client, |client, deliver| {
            client.on_event(kind, move |payload| deliver(payload))
        })
    }
}

impl<T> Binding<T>
where
    T: Clone + Send + 'static,
{
    fn activate<F>(client: &RealtimeClient, subscribe: F) -> Self
    where
        F: FnOnce(&RealtimeClient, Arc<dyn Fn(&T) + Send + Sync>) -> Subscription,
    {
        let tracked: Arc<Mutex<Tracked<T>>> = Arc::new(Mutex::new(Tracked::default()));

        let sink = Arc::clone(&tracked);
        let deliver: Arc<dyn Fn(&T) + Send + Sync> = Arc::new(move |value: &T| {
            let hooks = {
                let mut tracked = lock(&sink);
                tracked.last = Some(value.clone());
                tracked.update_count += 1;
                tracked.hooks.clone()
            };
            for hook in hooks {
                hook();
            }
        });

        let subscription = subscribe(client, deliver);
        client.connect();

        Self {
            client: client.clone(),
            subscription: Some(subscription),
            tracked,
        }
    }

    /// Most recent payload, if any has arrived
    pub fn last_payload(&self) -> Option<T> {
        lock(&self.tracked).last.clone()
    }
}

impl<T> Binding<T> {
    /// Number of deliveries seen since activation
    pub fn update_count(&self) -> u64 {
        lock(&self.tracked).update_count
    }

    /// Whether the binding is still listening
    pub fn is_active(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// The connection this binding listens on
    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    /// Run `hook` after every delivery
    pub fn on_update<F>(self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.tracked).hooks.push(Arc::new(hook));
        self
    }

    /// Re-fetch through `refresher` now and after every delivery
    pub fn refreshing<S: RefreshSource>(self, refresher: &Refresher<S>) -> Self {
        refresher.trigger();
        let refresher = refresher.clone();
        self.on_update(move || refresher.trigger())
    }

    /// Stop listening; returns false if already inactive
    ///
    /// The shared connection is left open.
    pub fn deactivate(&mut self) -> bool {
        match self.subscription.take() {
            Some(subscription) => subscription.unsubscribe(),
            None => false,
        }
    }
}

impl<T> Drop for Binding<T> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

fn lock<T>(tracked: &Mutex<Tracked<T>>) -> MutexGuard<'_, Tracked<T>> {
    tracked.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClaimStatus, RecordId};
    use crate::websocket::ReconnectConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offline_client() -> RealtimeClient {
        RealtimeClient::with_config("ws://127.0.0.1:9/ws", ReconnectConfig::disabled())
    }

    const CLAIM_FRAME: &str = r#"{"type":"claim_updated","payload":{"claim_id":42,"status":"approved"}}"#;

    #[test]
    fn test_two_bindings_see_the_same_push() {
        let client = offline_client();
        let first = Binding::claim_updates(&client);
        let second = Binding::claim_updates(&client);

        client.router().route_text(CLAIM_FRAME);

        assert_eq!(first.update_count(), 1);
        assert_eq!(second.update_count(), 1);
        let payload = first.last_payload().unwrap();
        assert_eq!(payload.claim_id, Some(RecordId::Number(42)));
        assert_eq!(payload.status, Some(ClaimStatus::Approved));
        assert_eq!(second.last_payload(), Some(payload));
    }

    #[test]
    fn test_binding_ignores_other_kinds() {
        let client = offline_client();
        let stats = Binding::dashboard_stats(&client);

        client.router().route_text(CLAIM_FRAME);
        assert_eq!(stats.update_count(), 0);
        assert!(stats.last_payload().is_none());

        client
            .router()
            .route_text(r#"{"type":"dashboard_stats","payload":{"total_claims":3}}"#);
        assert_eq!(stats.update_count(), 1);
        assert_eq!(stats.last_payload().unwrap().total_claims, 3);
    }

    #[test]
    fn test_deactivate_unsubscribes_once() {
        let client = offline_client();
        let mut binding = Binding::fraud_alerts(&client);
        assert!(binding.is_active());

        assert!(binding.deactivate());
        assert!(!binding.deactivate());
        assert!(!binding.is_active());

        client
            .router()
            .route_text(r#"{"type":"fraud_alert_created","payload":{"id":1,"claim_id":2}}"#);
        assert_eq!(binding.update_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes_but_keeps_others() {
        let client = offline_client();
        let kept = Binding::claim_updates(&client);
        let dropped = Binding::claim_updates(&client);
        drop(dropped);

        client.router().route_text(CLAIM_FRAME);
        client.router().route_text(CLAIM_FRAME);
        assert_eq!(kept.update_count(), 2);
    }

    #[test]
    fn test_event_binding_receives_raw_payload() {
        let client = offline_client();
        let binding = Binding::event(&client, "fraud_alert_dismissed");

        client
            .router()
            .route_text(r#"{"type":"fraud_alert_dismissed","payload":{"id":9}}"#);
        client
            .router()
            .route_text(r#"{"type":"fraud_alert_created","payload":{"id":10}}"#);

        assert_eq!(binding.update_count(), 1);
        assert_eq!(binding.last_payload().unwrap()["id"], 9);
    }

    #[test]
    fn test_connection_binding() {
        let client = offline_client();
        let binding = Binding::connection_status(&client);

        client.router().route_text(
            r#"{"type":"connection_established","payload":{"client_id":"abc123"}}"#,
        );

        let status = binding.last_payload().unwrap();
        assert!(status.connected);
        assert_eq!(status.client_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_on_update_hook_runs_after_each_delivery() {
        let client = offline_client();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let binding = Binding::claim_updates(&client).on_update(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        client.router().route_text(CLAIM_FRAME);
        client.router().route_text("not json");
        client.router().route_text(CLAIM_FRAME);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(binding.update_count(), 2);
    }

    #[tokio::test]
    async fn test_binding_connects_shared_client() {
        let client = RealtimeClient::with_config(
            "ws://127.0.0.1:9/ws",
            ReconnectConfig {
                base_delay: std::time::Duration::from_secs(60),
                ..ReconnectConfig::default()
            },
        );
        let first = Binding::claim_updates(&client);
        let second = Binding::fraud_alerts(&client);

        assert_ne!(client.state(), crate::websocket::ConnectionState::Disconnected);
        assert!(first.client().url() == second.client().url());

        drop(first);
        drop(second);
        client.disconnect();
        assert_eq!(client.state(), crate::websocket::ConnectionState::Disconnected);
    }
}
