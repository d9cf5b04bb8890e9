//! Reconnecting websocket connection with an explicit state machine.
//!
//! One driver task owns the socket. It reports every state transition,
//! lifecycle change and inbound frame on an unbounded channel, so the
//! consumer never shares the socket with the reader.
//!
//! Transitions:
//! - `Disconnected -> Connecting` on [`ConnectionManager::connect`]
//! - `Connecting -> Connected` on handshake (retry counter reset)
//! - `Connecting -> Error -> Reconnecting` on handshake failure
//! - `Connected -> Reconnecting` on close or transport error
//! - `Reconnecting -> Connecting` after the backoff delay
//! - `* -> Disconnected` on [`ConnectionManager::disconnect`] or when the
//!   retry budget is spent (emits [`ConnectionEvent::RetriesExhausted`])

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::WsError;
use crate::config::ConnectionConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// An inbound frame, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Json(Value),
    Text(String),
}

impl InboundFrame {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => InboundFrame::Json(value),
            Err(_) => InboundFrame::Text(text),
        }
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Connected,
    Disconnected {
        reason: String,
    },
    Error(String),
    Message(InboundFrame),
    /// The reconnect budget is spent. Emitted once; the manager is terminal.
    RetriesExhausted {
        attempts: u32,
    },
}

/// Exponential backoff with an optional retry budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Backoff {
    /// Delay before reconnect attempt `retry` (1-based):
    /// `min(initial * 2^(retry - 1), max)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Given the retries already spent, return the next retry number and its
    /// delay, or `None` once the budget is exhausted.
    pub fn next(&self, retries_spent: u32) -> Option<(u32, Duration)> {
        if let Some(max) = self.max_retries {
            if retries_spent >= max {
                return None;
            }
        }
        let retry = retries_spent.saturating_add(1);
        Some((retry, self.delay_for(retry)))
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub backoff: Backoff,
    pub ping_interval: Duration,
}

impl ConnectionSettings {
    pub fn from_config(url: impl Into<String>, config: &ConnectionConfig) -> Self {
        Self {
            url: url.into(),
            backoff: Backoff {
                initial: config.initial_backoff(),
                max: config.max_backoff(),
                max_retries: config.max_retries,
            },
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
        }
    }
}

/// Handles owned by one `connect()` call.
struct Session {
    shutdown: watch::Sender<bool>,
    outbound: mpsc::UnboundedSender<String>,
    driver: JoinHandle<()>,
}

struct Shared {
    settings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
    retry_count: AtomicU32,
    /// Bumped by every `connect()` and `disconnect()`. A driver whose epoch
    /// is stale may no longer touch the state.
    epoch: AtomicU64,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    session: Mutex<Option<Session>>,
}

enum SessionEnd {
    Shutdown,
    Lost(WsError),
}

/// Owner of the single streaming connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                settings,
                state,
                retry_count: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                event_tx,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch channel mirroring the current state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn retry_count(&self) -> u32 {
        self.shared.retry_count.load(Ordering::SeqCst)
    }

    /// Start connecting in the background. No-op while a driver is running.
    pub fn connect(&self) {
        let mut session = self.shared.lock_session();
        let state = self.state();

        let running = session.as_ref().is_some_and(|s| !s.driver.is_finished());
        if running || matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
            warn!(state = %state, "already connecting or connected");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(ConnectionState::Connecting);
        info!(url = %self.shared.settings.url, epoch, "connecting to websocket");

        let shared = self.shared.clone();
        let driver = tokio::spawn(async move {
            shared.run(epoch, shutdown_rx, outbound_rx).await;
        });

        *session = Some(Session {
            shutdown: shutdown_tx,
            outbound: outbound_tx,
            driver,
        });
    }

    /// Queue a text frame. Returns false unless the state is `Connected`.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        if self.state() != ConnectionState::Connected {
            debug!(state = %self.state(), "cannot send: websocket not connected");
            return false;
        }
        let session = self.shared.lock_session();
        match session.as_ref() {
            Some(s) => s.outbound.send(payload.into()).is_ok(),
            None => false,
        }
    }

    pub fn send_json(&self, value: &Value) -> bool {
        self.send(value.to_string())
    }

    /// Cancel any pending reconnect, close the stream and force `Disconnected`.
    pub fn disconnect(&self) {
        info!("disconnecting websocket");
        let mut guard = self.shared.lock_session();
        let session = guard.take();
        // Retire the running driver before touching the state.
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Disconnected);
        drop(guard);
        self.shared.retry_count.store(0, Ordering::SeqCst);
        if let Some(session) = session {
            let _ = session.shutdown.send(true);
        }
    }
}

impl Shared {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn set_state(&self, to: ConnectionState) {
        self.transition(to, |_| true);
    }

    /// Driver transition. Returns false once the driver's epoch is stale or
    /// the state is `Disconnected`.
    fn advance(&self, epoch: u64, to: ConnectionState) -> bool {
        self.transition(to, |current| {
            self.is_current(epoch) && current != ConnectionState::Disconnected
        })
    }

    fn transition(&self, to: ConnectionState, allowed: impl Fn(ConnectionState) -> bool) -> bool {
        let mut from = to;
        let mut blocked = false;
        let changed = self.state.send_if_modified(|current| {
            if !allowed(*current) {
                blocked = true;
                return false;
            }
            if *current == to {
                return false;
            }
            from = std::mem::replace(current, to);
            true
        });
        if changed {
            debug!(from = %from, to = %to, "connection state changed");
            self.emit(ConnectionEvent::StateChanged { from, to });
        }
        !blocked
    }

    async fn run(
        &self,
        epoch: u64,
        mut shutdown: watch::Receiver<bool>,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) {
        loop {
            let attempt = tokio::select! {
                _ = shutdown.changed() => break,
                result = connect_async(self.settings.url.as_str()) => result,
            };

            match attempt {
                Ok((socket, _response)) => {
                    // Frames queued for a previous socket are stale.
                    while outbound.try_recv().is_ok() {}

                    if !self.advance(epoch, ConnectionState::Connected) {
                        break;
                    }
                    self.retry_count.store(0, Ordering::SeqCst);
                    info!(url = %self.settings.url, "websocket connected");
                    self.emit(ConnectionEvent::Connected);

                    match self.stream(socket, &mut shutdown, &mut outbound).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(err) => {
                            warn!(reason = %err, "websocket connection lost");
                            if !self.advance(epoch, ConnectionState::Reconnecting) {
                                break;
                            }
                            self.emit(ConnectionEvent::Disconnected { reason: err.to_string() });
                        }
                    }
                }
                Err(e) => {
                    let err = WsError::from(e);
                    error!(url = %self.settings.url, error = %err, "websocket connect failed");
                    if !self.advance(epoch, ConnectionState::Error) {
                        break;
                    }
                    self.emit(ConnectionEvent::Error(err.to_string()));
                }
            }

            let spent = self.retry_count.load(Ordering::SeqCst);
            let Some((retry, delay)) = self.settings.backoff.next(spent) else {
                if !self.transition(ConnectionState::Disconnected, |_| self.is_current(epoch)) {
                    break;
                }
                error!(
                    max_retries = ?self.settings.backoff.max_retries,
                    "maximum reconnect attempts reached, giving up"
                );
                self.emit(ConnectionEvent::RetriesExhausted { attempts: spent });
                break;
            };
            if !self.is_current(epoch) {
                break;
            }
            self.retry_count.store(retry, Ordering::SeqCst);

            if !self.advance(epoch, ConnectionState::Reconnecting) {
                break;
            }
            info!(
                attempt = retry,
                max = ?self.settings.backoff.max_retries,
                delay_ms = delay.as_millis() as u64,
                "scheduling websocket reconnect"
            );

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.advance(epoch, ConnectionState::Connecting) {
                break;
            }
        }

        debug!("websocket driver stopped");
    }

    async fn stream(
        &self,
        socket: Socket,
        shutdown: &mut watch::Receiver<bool>,
        outbound: &mut mpsc::UnboundedReceiver<String>,
    ) -> SessionEnd {
        let (mut write, mut read) = socket.split();
        let period = self.settings.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    return SessionEnd::Shutdown;
                }
                Some(payload) = outbound.recv() => {
                    debug!(bytes = payload.len(), "sending frame");
                    if let Err(e) = write.send(Message::Text(payload)).await {
                        self.emit(ConnectionEvent::Error(e.to_string()));
                        return SessionEnd::Lost(e.into());
                    }
                }
                _ = ping.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        self.emit(ConnectionEvent::Error(e.to_string()));
                        return SessionEnd::Lost(e.into());
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.emit(ConnectionEvent::Message(InboundFrame::parse(text)));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        self.emit(ConnectionEvent::Message(InboundFrame::parse(text)));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("{} {}", f.code, f.reason))
                            .unwrap_or_else(|| "close frame".to_string());
                        return SessionEnd::Lost(WsError::Closed(reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.emit(ConnectionEvent::Error(e.to_string()));
                        return SessionEnd::Lost(e.into());
                    }
                    None => return SessionEnd::Lost(WsError::Closed("stream ended".to_string())),
                },
            }
        }
    }
}
