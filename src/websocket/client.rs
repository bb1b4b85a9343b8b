//! Connection manager for the push socket

use futures_util::{Sink, SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};

use serde_json::Value;

use crate::config::{Config, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_WS_URL};
use crate::types::{ClaimUpdate, DashboardStats, FraudAlert};
use crate::websocket::message::{PushMessage, PING_FRAME};
use crate::websocket::reconnect::{Backoff, ReconnectConfig};
use crate::websocket::registry::Subscription;
use crate::websocket::router::{ConnectionStatus, Router};

/// How long a client-initiated close may take before the socket is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection state of the realtime client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a socket's life ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketOutcome {
    /// `disconnect()` was called
    Shutdown,
    /// The server closed with 1000
    ClosedNormally,
    /// Any other close code, a transport error, or a failed connection attempt
    Abnormal,
}

/// One `connect()`..`disconnect()` span, covering every reconnect in between
struct Cycle {
    id: u64,
    shutdown: watch::Sender<bool>,
    wake: Arc<Notify>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

#[derive(Default)]
struct Shared {
    cycle: Option<Cycle>,
    client_id: Option<String>,
}

struct Inner {
    url: String,
    reconnect_config: ReconnectConfig,
    heartbeat_interval: Option<Duration>,
    router: Router,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_attempts: AtomicU32,
    next_cycle: AtomicU64,
}

/// Realtime client for the claims push socket
///
/// Owns at most one socket. Clones share the socket, the state and the listener
/// registries, so the composition root creates one client and hands clones to every
/// consumer. `connect`, `disconnect` and `ping` never block and never fail; outcomes
/// are reported to connection listeners and through [`state_receiver`].
///
/// Frames reach the registries only from the socket; callers cannot inject one:
///
/// ```compile_fail
/// let client = claims_realtime::RealtimeClient::local();
/// client
///     .router()
///     .route_text(r#"{"type":"connection_established","payload":{"client_id":"x"}}"#);
/// ```
///
/// [`state_receiver`]: RealtimeClient::state_receiver
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("reconnect_config", &self.inner.reconnect_config)
            .finish_non_exhaustive()
    }
}

impl RealtimeClient {
    /// Create a client for `url` with the default reconnect policy and heartbeat
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, ReconnectConfig::default())
    }

    /// Create a client with a custom reconnect policy
    pub fn with_config(url: impl Into<String>, reconnect_config: ReconnectConfig) -> Self {
        Self::build(url.into(), reconnect_config, Some(DEFAULT_HEARTBEAT_INTERVAL))
    }

    /// Create a client from a full configuration
    pub fn from_config(config: &Config) -> Self {
        Self::build(
            config.ws_url.clone(),
            config.reconnect.clone(),
            config.heartbeat_interval,
        )
    }

    /// Create a client for the local development server
    pub fn local() -> Self {
        Self::new(DEFAULT_WS_URL)
    }

    fn build(
        url: String,
        reconnect_config: ReconnectConfig,
        heartbeat_interval: Option<Duration>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                url,
                reconnect_config,
                heartbeat_interval,
                router: Router::new(),
                shared: Mutex::new(Shared::default()),
                state_tx,
                reconnect_attempts: AtomicU32::new(0),
                next_cycle: AtomicU64::new(0),
            }),
        }
    }

    /// Get the endpoint this client connects to
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Get the reconnect policy
    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.inner.reconnect_config
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Id assigned by the server in `connection_established`
    pub fn client_id(&self) -> Option<String> {
        self.inner.lock().client_id.clone()
    }

    /// Reconnect attempts made since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Subscribe to state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// The registries pushes are routed to
    #[cfg(test)]
    pub(crate) fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Listen for claim status changes
    pub fn on_claim_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ClaimUpdate) + Send + Sync + 'static,
    {
        self.inner.router.on_claim_update(callback)
    }

    /// Listen for created and dismissed fraud alerts
    pub fn on_fraud_alert<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&FraudAlert) + Send + Sync + 'static,
    {
        self.inner.router.on_fraud_alert(callback)
    }

    /// Listen for dashboard statistics snapshots
    pub fn on_dashboard_stats<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DashboardStats) + Send + Sync + 'static,
    {
        self.inner.router.on_dashboard_stats(callback)
    }

    /// Listen for connection status changes
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.router.on_connection_change(callback)
    }

    /// Listen for the raw payload of every envelope tagged `kind`
    pub fn on_event<F>(&self, kind: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.router.on_event(kind, callback)
    }

    /// Open the socket unless one is already open or opening
    ///
    /// While a reconnect is pending this skips the remaining delay. Must be called
    /// from within a tokio runtime; otherwise it logs and does nothing.
    pub fn connect(&self) {
        let mut shared = self.inner.lock();

        if let Some(cycle) = &shared.cycle {
            if self.state() == ConnectionState::Disconnected {
                tracing::debug!(url = %self.inner.url, "connect requested during backoff, retrying now");
                cycle.wake.notify_one();
            }
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(url = %self.inner.url, error = %e, "connect called outside a tokio runtime");
                return;
            }
        };

        let id = self.inner.next_cycle.fetch_add(1, Ordering::Relaxed) + 1;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        shared.cycle = Some(Cycle {
            id,
            shutdown: shutdown_tx,
            wake: Arc::clone(&wake),
            outbound: None,
        });
        self.inner.reconnect_attempts.store(0, Ordering::Relaxed);
        self.inner.state_tx.send_replace(ConnectionState::Connecting);
        drop(shared);

        tracing::debug!(url = %self.inner.url, cycle = id, "connecting");
        handle.spawn(run_cycle(Arc::clone(&self.inner), id, shutdown_rx, wake));
    }

    /// Close the socket with a normal-closure code and cancel any pending reconnect
    pub fn disconnect(&self) {
        let previous = {
            let mut shared = self.inner.lock();
            let Some(cycle) = shared.cycle.take() else {
                return;
            };
            let _ = cycle.shutdown.send(true);
            shared.client_id = None;
            self.inner.reconnect_attempts.store(0, Ordering::Relaxed);
            self.inner.state_tx.send_replace(ConnectionState::Disconnected)
        };

        tracing::debug!(url = %self.inner.url, "disconnected by caller");
        if previous != ConnectionState::Disconnected {
            self.inner.router.notify_connection(ConnectionStatus::disconnected());
        }
    }

    /// Send the keepalive frame; does nothing unless connected
    pub fn ping(&self) {
        let shared = self.inner.lock();
        let outbound = shared.cycle.as_ref().and_then(|cycle| cycle.outbound.as_ref());
        match outbound {
            Some(tx) if self.state() == ConnectionState::Connected => {
                let _ = tx.send(Message::Text(PING_FRAME.to_string()));
            }
            _ => tracing::debug!("ping skipped, not connected"),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Socket opened; returns false when `disconnect()` already ended this cycle
    fn on_open(&self, id: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut shared = self.lock();
        match shared.cycle.as_mut() {
            Some(cycle) if cycle.id == id => {
                cycle.outbound = Some(outbound);
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                self.state_tx.send_replace(ConnectionState::Connected);
                true
            }
            _ => false,
        }
    }

    fn on_connecting(&self, id: u64) {
        let shared = self.lock();
        if shared.cycle.as_ref().is_some_and(|cycle| cycle.id == id) {
            self.state_tx.send_replace(ConnectionState::Connecting);
        }
    }

    /// Socket lost; notifies listeners when this changed the state
    fn on_close(&self, id: u64, status: ConnectionStatus, end_cycle: bool) {
        let previous = {
            let mut shared = self.lock();
            if !shared.cycle.as_ref().is_some_and(|cycle| cycle.id == id) {
                return;
            }
            if end_cycle {
                shared.cycle = None;
            } else if let Some(cycle) = shared.cycle.as_mut() {
                cycle.outbound = None;
            }
            shared.client_id = None;
            self.state_tx.send_replace(ConnectionState::Disconnected)
        };

        if previous != ConnectionState::Disconnected || status.retries_exhausted {
            self.router.notify_connection(status);
        }
    }

    fn handle_text(&self, id: u64, text: &str) {
        let Some((envelope, message)) = self.router.decode(text) else {
            return;
        };

        if let PushMessage::ConnectionEstablished(payload) = &message {
            let mut shared = self.lock();
            if !shared.cycle.as_ref().is_some_and(|cycle| cycle.id == id) {
                return;
            }
            shared.client_id = payload.client_id.clone();
            tracing::debug!(client_id = ?payload.client_id, "connection established");
        }

        self.router.dispatch(&envelope, &message);
    }
}

/// Drive one connection cycle: connect, read, and reconnect until told to stop
async fn run_cycle(
    inner: Arc<Inner>,
    id: u64,
    mut shutdown_rx: watch::Receiver<bool>,
    wake: Arc<Notify>,
) {
    let mut backoff = Backoff::new(inner.reconnect_config.clone());

    loop {
        inner.on_connecting(id);

        let outcome = tokio::select! {
            _ = shutdown_rx.changed() => SocketOutcome::Shutdown,
            result = connect_async(inner.url.as_str()) => match result {
                Ok((stream, _response)) => {
                    backoff.reset();
                    run_socket(&inner, id, stream, &mut shutdown_rx).await
                }
                Err(e) => {
                    tracing::warn!(url = %inner.url, error = %e, "connection attempt failed");
                    SocketOutcome::Abnormal
                }
            },
        };

        match outcome {
            SocketOutcome::Shutdown => return,
            SocketOutcome::ClosedNormally => {
                tracing::debug!(url = %inner.url, "server closed the connection");
                inner.on_close(id, ConnectionStatus::disconnected(), true);
                return;
            }
            SocketOutcome::Abnormal => {}
        }

        let Some(delay) = backoff.next_delay() else {
            tracing::warn!(
                url = %inner.url,
                attempts = backoff.attempt(),
                "giving up after reaching the reconnect limit"
            );
            inner.on_close(id, ConnectionStatus::exhausted(), true);
            return;
        };

        inner
            .reconnect_attempts
            .store(backoff.attempt(), Ordering::Relaxed);
        inner.on_close(id, ConnectionStatus::disconnected(), false);
        tracing::debug!(
            url = %inner.url,
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {}
        }
    }
}

/// Pump one open socket until it closes or the cycle is shut down
async fn run_socket(
    inner: &Inner,
    id: u64,
    stream: WsStream,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SocketOutcome {
    let (mut sink, mut stream) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    if !inner.on_open(id, outbound_tx) {
        close_normally(&mut sink).await;
        return SocketOutcome::Shutdown;
    }
    tracing::debug!(url = %inner.url, "socket open");

    let mut heartbeat = inner.heartbeat_interval.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                close_normally(&mut sink).await;
                return SocketOutcome::Shutdown;
            }
            Some(message) = outbound_rx.recv() => {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "failed to send frame");
                    return SocketOutcome::Abnormal;
                }
            }
            _ = next_tick(&mut heartbeat) => {
                if let Err(e) = sink.send(Message::Text(PING_FRAME.to_string())).await {
                    tracing::warn!(error = %e, "failed to send heartbeat");
                    return SocketOutcome::Abnormal;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.handle_text(id, &text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => inner.handle_text(id, &text),
                    Err(_) => tracing::warn!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| f.code);
                    tracing::debug!(code = ?code, "close frame received");
                    return if code == Some(CloseCode::Normal) {
                        SocketOutcome::ClosedNormally
                    } else {
                        SocketOutcome::Abnormal
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "socket error");
                    return SocketOutcome::Abnormal;
                }
                None => {
                    tracing::warn!("socket ended without a close frame");
                    return SocketOutcome::Abnormal;
                }
            },
        }
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn close_normally<S>(sink: &mut S)
where
    S: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    let close = async {
        let _ = sink.send(Message::Close(Some(frame))).await;
        let _ = sink.close().await;
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, close).await.is_err() {
        tracing::debug!("close handshake timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // ============ ConnectionState Tests ============

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
    }

    // ============ Client Creation Tests ============

    #[test]
    fn test_client_new() {
        let client = RealtimeClient::new("ws://127.0.0.1:9/ws");
        assert_eq!(client.url(), "ws://127.0.0.1:9/ws");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert!(client.client_id().is_none());
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(client.reconnect_config(), &ReconnectConfig::default());
    }

    #[test]
    fn test_client_local() {
        assert_eq!(RealtimeClient::local().url(), DEFAULT_WS_URL);
    }

    #[test]
    fn test_client_from_config() {
        let config = Config::default()
            .with_ws_url("ws://127.0.0.1:9/ws")
            .with_reconnect(ReconnectConfig::disabled());
        let client = RealtimeClient::from_config(&config);
        assert_eq!(client.url(), "ws://127.0.0.1:9/ws");
        assert!(!client.reconnect_config().enabled);
    }

    #[test]
    fn test_client_debug() {
        let client = RealtimeClient::new("ws://127.0.0.1:9/ws");
        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("RealtimeClient"));
        assert!(debug_str.contains("127.0.0.1:9"));
    }

    #[test]
    fn test_clones_share_registries() {
        let client = RealtimeClient::new("ws://127.0.0.1:9/ws");
        let cloned = client.clone();
        let seen = Arc::new(StdMutex::new(0));
        let _sub = {
            let seen = Arc::clone(&seen);
            cloned.on_claim_update(move |_| *seen.lock().unwrap() += 1)
        };

        client
            .router()
            .route_text(r#"{"type":"claim_updated","payload":{"claim_id":1}}"#);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    // ============ Lifecycle Tests Without A Server ============

    #[test]
    fn test_connect_outside_runtime_is_a_no_op() {
        let client = RealtimeClient::new("ws://127.0.0.1:9/ws");
        client.connect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected() {
        let client = RealtimeClient::new("ws://127.0.0.1:9/ws");
        let notified = Arc::new(StdMutex::new(0));
        let _sub = {
            let notified = Arc::clone(&notified);
            client.on_connection_change(move |_| *notified.lock().unwrap() += 1)
        };

        client.disconnect();
        client.disconnect();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(*notified.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ping_when_not_connected() {
        let client = RealtimeClient::new("ws://127.0.0.1:9/ws");
        client.ping();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_marks_connecting_and_disconnect_cancels() {
        // Nothing listens on the discard port, so the attempt fails and backs off
        let client = RealtimeClient::with_config(
            "ws://127.0.0.1:9/ws",
            ReconnectConfig {
                enabled: true,
                base_delay: Duration::from_secs(60),
                max_attempts: 5,
            },
        );
        let mut rx = client.state_receiver();

        client.connect();
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.reconnect_attempts(), 0);
    }

    // ============ Send/Sync Tests ============

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<RealtimeClient>();
        assert_sync::<RealtimeClient>();
        assert_send::<ConnectionState>();
        assert_sync::<ConnectionState>();
    }
}
