//! WebSocket client for the terminal stream endpoint.
//!
//! One connection per handle, driven by a background task. The task owns the
//! socket; callers talk to it through a command channel and receive typed
//! [`StreamEvent`]s. Abnormal closures (close code other than 1000) schedule
//! a reconnect with exponential backoff while auto-reconnect is enabled; a
//! normal closure never does.

use crate::terminal::protocol::{ClientMessage, ServerMessage};
use crate::{DeskhookConfig, DeskhookError, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Close code reported when the socket dies without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;
/// Close code for a close frame that carried no status.
const NO_STATUS_CLOSE: u16 = 1005;

/// Connection lifecycle, observable through [`StreamHandle::state`] and
/// [`StreamEvent::StateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Reconnect backoff: `base_delay × factor^attempt`, at most `max_attempts`
/// attempts per outage.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            factor: 1.5,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = self.base_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }
}

/// Whether a closure with `close_code` warrants a reconnect attempt.
/// Normal closure (1000) never reconnects.
pub fn should_reconnect(
    close_code: u16,
    auto_reconnect: bool,
    attempts_used: u32,
    policy: &ReconnectPolicy,
) -> bool {
    auto_reconnect && close_code != 1000 && attempts_used < policy.max_attempts
}

/// Typed events delivered to the consumer.
#[derive(Debug)]
pub enum StreamEvent {
    StateChanged(ConnectionState),
    Message(ServerMessage),
}

/// Connection factory. `connect()` starts a fresh session with a fresh
/// reconnect budget.
#[derive(Debug, Clone)]
pub struct TerminalStream {
    url: String,
    policy: ReconnectPolicy,
    auto_reconnect: bool,
}

impl TerminalStream {
    pub fn new(config: &DeskhookConfig) -> Self {
        Self {
            url: config.terminal_ws_url.clone(),
            policy: ReconnectPolicy::default(),
            auto_reconnect: config.auto_reconnect,
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect and spawn the connection task. The returned receiver carries
    /// state changes and server messages; dropping it shuts the task down.
    pub fn connect(&self) -> (StreamHandle, mpsc::Receiver<StreamEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ClientMessage>(32);
        let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(256);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let task = tokio::spawn(run_connection(
            self.url.clone(),
            self.policy,
            self.auto_reconnect,
            cmd_rx,
            event_tx,
            state.clone(),
        ));

        (StreamHandle { cmd_tx, state, task }, event_rx)
    }
}

/// Handle to a running connection task.
pub struct StreamHandle {
    cmd_tx: mpsc::Sender<ClientMessage>,
    state: Arc<RwLock<ConnectionState>>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.cmd_tx
            .send(msg)
            .await
            .map_err(|_| DeskhookError::Stream("terminal stream is shut down".to_string()))
    }

    pub async fn list(&self) -> Result<()> {
        self.send(ClientMessage::List).await
    }

    pub async fn subscribe(&self, id: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Subscribe { id: id.into() }).await
    }

    pub async fn subscribe_all(&self) -> Result<()> {
        self.send(ClientMessage::SubscribeAll).await
    }

    pub async fn unsubscribe(&self, id: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Unsubscribe { id: id.into() }).await
    }

    pub async fn input(&self, id: impl Into<String>, data: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Input {
            id: id.into(),
            data: data.into(),
        })
        .await
    }

    pub async fn create_terminal(&self, name: Option<String>) -> Result<()> {
        self.send(ClientMessage::CreateTerminal { name }).await
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Tear the connection down without waiting for the server.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

enum SessionEnd {
    /// Consumer went away; stop entirely
    Shutdown,
    /// Socket closed with this close code
    Closed(u16),
    /// Socket error; treated as an abnormal closure after surfacing the
    /// error state
    Errored(u16),
}

async fn run_connection(
    url: String,
    policy: ReconnectPolicy,
    auto_reconnect: bool,
    mut cmd_rx: mpsc::Receiver<ClientMessage>,
    event_tx: mpsc::Sender<StreamEvent>,
    state: Arc<RwLock<ConnectionState>>,
) {
    // Reconnect attempts used for the current outage; a successful open
    // restores the full budget.
    let mut attempt: u32 = 0;

    loop {
        if !set_state(&state, &event_tx, ConnectionState::Connecting).await {
            return;
        }

        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!("Terminal stream connect failed: {}", e);
                if !set_state(&state, &event_tx, ConnectionState::Error).await {
                    return;
                }
                if !should_reconnect(ABNORMAL_CLOSE, auto_reconnect, attempt, &policy) {
                    let _ = set_state(&state, &event_tx, ConnectionState::Disconnected).await;
                    return;
                }
                let delay = policy.delay_for(attempt);
                attempt += 1;
                debug!("Reconnecting in {:?} (attempt {})", delay, attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        info!("Terminal stream connected to {}", url);
        attempt = 0;
        if !set_state(&state, &event_tx, ConnectionState::Connected).await {
            return;
        }

        let end = drive_session(ws, &mut cmd_rx, &event_tx).await;

        let code = match end {
            SessionEnd::Shutdown => {
                let _ = set_state(&state, &event_tx, ConnectionState::Disconnected).await;
                return;
            }
            SessionEnd::Closed(code) => code,
            SessionEnd::Errored(code) => {
                if !set_state(&state, &event_tx, ConnectionState::Error).await {
                    return;
                }
                code
            }
        };

        debug!("Terminal stream closed with code {}", code);
        if !set_state(&state, &event_tx, ConnectionState::Disconnected).await {
            return;
        }
        if !should_reconnect(code, auto_reconnect, attempt, &policy) {
            return;
        }
        let delay = policy.delay_for(attempt);
        attempt += 1;
        debug!("Reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;
    }
}

/// Pump one connected socket until it closes or the consumer goes away.
async fn drive_session(
    ws: WsStream,
    cmd_rx: &mut mpsc::Receiver<ClientMessage>,
    event_tx: &mpsc::Sender<StreamEvent>,
) -> SessionEnd {
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if event_tx.send(StreamEvent::Message(msg)).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => {
                            warn!("Unparseable terminal stream message: {} - {}", e, text);
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return SessionEnd::Errored(ABNORMAL_CLOSE);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(NO_STATUS_CLOSE);
                    return SessionEnd::Closed(code);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Terminal stream socket error: {}", e);
                    return SessionEnd::Errored(ABNORMAL_CLOSE);
                }
                None => return SessionEnd::Closed(ABNORMAL_CLOSE),
            },
            outgoing = cmd_rx.recv() => match outgoing {
                Some(msg) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to serialize client message: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        return SessionEnd::Errored(ABNORMAL_CLOSE);
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
        }
    }
}

/// Record a state change and notify the consumer. Returns false when the
/// consumer is gone.
async fn set_state(
    state: &Arc<RwLock<ConnectionState>>,
    event_tx: &mpsc::Sender<StreamEvent>,
    next: ConnectionState,
) -> bool {
    {
        let mut guard = state.write().await;
        if *guard == next {
            return true;
        }
        *guard = next;
    }
    event_tx
        .send(StreamEvent::StateChanged(next))
        .await
        .is_ok()
}
