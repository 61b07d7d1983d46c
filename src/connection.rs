//! Async connection handle for the Quick Draw duel protocol.
//!
//! [`QuickDrawConnection`] is a thin handle that communicates with a
//! background connection loop task via an unbounded MPSC channel. Events are
//! emitted on a bounded channel ([`tokio::sync::mpsc::Receiver<QuickDrawEvent>`])
//! returned from [`QuickDrawConnection::start`].
//!
//! The loop owns the reconnect policy: an ordinary disconnect (drop, clean
//! server close, receive error) re-dials through the [`Connector`] with
//! exponential backoff — base delay doubling per failed attempt, capped, and
//! bounded by a maximum attempt count. Exhausting the budget is fatal and
//! surfaced exactly once as [`QuickDrawEvent::ConnectionLost`]. A server
//! `auth-failure` is also fatal: the cached token is discarded and no
//! reconnect is attempted.
//!
//! Every outgoing command is stamped with a monotonically increasing
//! sequence number; replayable claims additionally carry a single-use UUID
//! nonce (see [`ClientMessage::needs_nonce`]). Inbound messages are
//! delivered in transport order — sequence numbers exist for the server's
//! benefit, not for client-side reordering.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("wss://duel.example.com/ws");
//! let config = ConnectionConfig::new(Identity::new("Tex"));
//! let (conn, mut events) = QuickDrawConnection::start(connector, config);
//!
//! conn.join_queue(2)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         QuickDrawEvent::MatchFound { opponent_id, .. } => { /* … */ }
//!         QuickDrawEvent::ConnectionLost { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::duel::CommandSink;
use crate::error::{QuickDrawError, Result};
use crate::event::QuickDrawEvent;
use crate::protocol::{ClientMessage, HitZone, OutboundFrame, PlayerId, ServerMessage, Vec3};
use crate::transport::{Connector, Transport};

/// Event channel capacity when the config does not override it.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`QuickDrawConnection::shutdown`] waits before aborting the task.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default first reconnect delay; doubles per failed attempt.
const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on the reconnect delay.
const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Default bound on consecutive failed connection attempts.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ── Identity ────────────────────────────────────────────────────────

/// Connection identity presented in the `identify` handshake.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Display name for the local participant.
    pub player_name: String,
    /// Cached session token from a previous session, if any.
    pub token: Option<String>,
}

impl Identity {
    /// Create an identity with no cached token.
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            token: None,
        }
    }

    /// Attach a cached session token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`QuickDrawConnection`].
///
/// The only required field is the [`Identity`]; all others have sensible
/// defaults.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use quickdraw_client::connection::{ConnectionConfig, Identity};
///
/// let config = ConnectionConfig::new(Identity::new("Tex"))
///     .with_max_reconnect_attempts(3)
///     .with_reconnect_base_delay(Duration::from_millis(250));
/// assert_eq!(config.max_reconnect_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Identity presented in the `identify` handshake after every connect.
    pub identity: Identity,
    /// First reconnect delay; doubles per consecutive failure.
    pub reconnect_base_delay: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Consecutive failed attempts tolerated before the connection is
    /// declared lost. Exhaustion is fatal and requires a client restart.
    pub max_reconnect_attempts: u32,
    /// How many events the channel buffers before dropping.
    ///
    /// When the consumer cannot keep up with incoming server messages,
    /// events are dropped (with a warning logged) to avoid blocking the
    /// connection loop. Fatal events are always delivered regardless of
    /// capacity. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown before the loop task is aborted.
    pub shutdown_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a configuration with the given identity and default values.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the first reconnect delay.
    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Set the cap on the reconnect delay.
    #[must_use]
    pub fn with_reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = delay;
        self
    }

    /// Set the bound on consecutive failed connection attempts. Values
    /// below 1 are clamped to 1.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts.max(1);
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set how long [`shutdown`](QuickDrawConnection::shutdown) waits for the
    /// loop to exit before aborting it.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the handle and the connection loop.
struct ConnState {
    connected: AtomicBool,
    fatal: AtomicBool,
    token: Mutex<Option<String>>,
}

impl ConnState {
    fn new(token: Option<String>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            fatal: AtomicBool::new(false),
            token: Mutex::new(token),
        }
    }
}

// ── Connection handle ───────────────────────────────────────────────

/// Handle to the background connection loop.
///
/// All public command methods serialize a [`ClientMessage`] and queue it to
/// the loop over an unbounded channel; they return immediately once queued
/// (no round-trip await). Commands queued while a reconnect is in flight are
/// delivered after the transport is re-established.
pub struct QuickDrawConnection {
    /// Sender half of the command channel to the connection loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the connection loop.
    state: Arc<ConnState>,
    /// Handle to the background loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl QuickDrawConnection {
    /// Start the connection loop and return a handle plus event receiver.
    ///
    /// The loop dials the [`Connector`] immediately; the first outgoing
    /// message after every successful connect is the `identify` handshake
    /// built from the configured [`Identity`] (with the most recently
    /// cached token).
    #[must_use = "dropping the event receiver makes every event a dropped event"]
    pub fn start(
        connector: impl Connector,
        config: ConnectionConfig,
    ) -> (Self, mpsc::Receiver<QuickDrawEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<QuickDrawEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ConnState::new(config.identity.token.clone()));
        let loop_state = Arc::clone(&state);
        let shutdown_timeout = config.shutdown_timeout;

        let task = tokio::spawn(connection_loop(
            connector,
            config,
            cmd_rx,
            event_tx,
            loop_state,
            shutdown_rx,
        ));

        let conn = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };

        (conn, event_rx)
    }

    // ── Public command methods ──────────────────────────────────────

    /// Enter matchmaking for an arena slot.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::NotConnected`] if the connection is in a
    /// fatal state or the loop has exited.
    pub fn join_queue(&self, arena_index: u8) -> Result<()> {
        self.send_message(ClientMessage::JoinQueue { arena_index })
    }

    /// Signal local readiness after the teleport to the start pose.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::NotConnected`] if the connection is in a
    /// fatal state or the loop has exited.
    pub fn ready(&self, arena_index: u8) -> Result<()> {
        self.send_message(ClientMessage::Ready { arena_index })
    }

    /// Report a claimed hit for server validation. The frame carries a
    /// single-use nonce so the server can reject replays.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::NotConnected`] if the connection is in a
    /// fatal state or the loop has exited.
    pub fn shoot_claim(&self, opponent_id: PlayerId, hit_zone: HitZone, damage: u16) -> Result<()> {
        self.send_message(ClientMessage::ShootClaim {
            opponent_id,
            hit_zone,
            damage,
        })
    }

    /// Report a self-detected early-draw violation.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::NotConnected`] if the connection is in a
    /// fatal state or the loop has exited.
    pub fn report_penalty(&self) -> Result<()> {
        self.send_message(ClientMessage::Penalty)
    }

    /// Broadcast the local participant's canonical state after a reset.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::NotConnected`] if the connection is in a
    /// fatal state or the loop has exited.
    pub fn broadcast_state(&self, position: Option<Vec3>, health: u16, ammo: u8) -> Result<()> {
        self.send_message(ClientMessage::StateSync {
            position,
            health,
            ammo,
        })
    }

    /// Queue an arbitrary [`ClientMessage`] to the connection loop.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::NotConnected`] if the connection is in a
    /// fatal state or the loop has exited.
    pub fn send_message(&self, msg: ClientMessage) -> Result<()> {
        if self.state.fatal.load(Ordering::Acquire) {
            return Err(QuickDrawError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| QuickDrawError::NotConnected)
    }

    /// Shut down the connection, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the loop exits.
    pub async fn shutdown(&mut self) {
        debug!("QuickDrawConnection: shutdown requested");

        // Signal the loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort
        // it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Whether the loop currently holds a live transport. Best-effort; a
    /// drop is only noticed when the loop next touches the socket.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` after a fatal condition (reconnect budget exhausted or
    /// authentication failure). Fatal connections require a client restart.
    pub fn is_fatal(&self) -> bool {
        self.state.fatal.load(Ordering::Acquire)
    }

    /// The currently cached session token, if any.
    pub async fn cached_token(&self) -> Option<String> {
        self.state.token.lock().await.clone()
    }
}

impl CommandSink for QuickDrawConnection {
    fn send(&mut self, msg: ClientMessage) {
        if let Err(e) = self.send_message(msg) {
            warn!("dropping outbound command: {e}");
        }
    }
}

impl std::fmt::Debug for QuickDrawConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickDrawConnection")
            .field("connected", &self.is_connected())
            .field("fatal", &self.is_fatal())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for QuickDrawConnection {
    fn drop(&mut self) {
        // Drop has no async context, so the graceful path (which awaits
        // `transport.close()`) is out of reach. Aborting the task drops the
        // loop future on the spot; the shutdown oneshot stays unsent because
        // nothing here could drive the close it would trigger.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

/// How an established session ended.
enum SessionExit {
    /// Ordinary disconnect; re-dial through the connector.
    Reconnect,
    /// Terminal condition already surfaced; stop the loop.
    Stop,
}

/// Exponential backoff delay for the given 1-based failure count.
fn backoff_delay(base: Duration, cap: Duration, failures: u32) -> Duration {
    // Factor saturates well past any sane cap; the min() below bounds it.
    let factor = 2u32.saturating_pow(failures.saturating_sub(1).min(16));
    base.saturating_mul(factor).min(cap)
}

/// Background loop: dial, identify, then multiplex send/receive until the
/// transport drops, re-dialing with bounded backoff.
async fn connection_loop(
    mut connector: impl Connector,
    config: ConnectionConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<QuickDrawEvent>,
    state: Arc<ConnState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("connection loop started");

    // Monotonic per-connection-handle sequence number for outgoing frames.
    let mut seq: u64 = 0;
    // Consecutive connection failures; reset on every successful dial.
    let mut failures: u32 = 0;

    loop {
        // ── Dial with bounded exponential backoff ───────────────────
        let mut transport = loop {
            let dialed = tokio::select! {
                result = connector.connect() => result,
                _ = &mut shutdown_rx => {
                    emit_final(&event_tx, &state, QuickDrawEvent::Disconnected {
                        reason: Some("client shut down".into()),
                    }).await;
                    return;
                }
            };

            match dialed {
                Ok(transport) => {
                    failures = 0;
                    break transport;
                }
                Err(e) => {
                    failures += 1;
                    warn!(failures, "connection attempt failed: {e}");
                    if failures >= config.max_reconnect_attempts {
                        error!("reconnect attempts exhausted, giving up");
                        state.fatal.store(true, Ordering::Release);
                        let exhausted = QuickDrawError::ReconnectExhausted { attempts: failures };
                        emit_final(&event_tx, &state, QuickDrawEvent::ConnectionLost {
                            reason: format!("{exhausted}: last error: {e}"),
                        })
                        .await;
                        return;
                    }
                    let delay = backoff_delay(
                        config.reconnect_base_delay,
                        config.reconnect_max_delay,
                        failures,
                    );
                    emit_event(
                        &event_tx,
                        QuickDrawEvent::Reconnecting {
                            attempt: failures,
                            delay,
                        },
                    )
                    .await;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut shutdown_rx => {
                            emit_final(&event_tx, &state, QuickDrawEvent::Disconnected {
                                reason: Some("client shut down".into()),
                            }).await;
                            return;
                        }
                    }
                }
            }
        };

        state.connected.store(true, Ordering::Release);
        emit_event(&event_tx, QuickDrawEvent::Connected).await;

        // ── Identify first, with the most recently cached token ─────
        let identify = ClientMessage::Identify {
            player_name: config.identity.player_name.clone(),
            token: state.token.lock().await.clone(),
        };
        seq += 1;
        if let Err(e) = send_frame(&mut transport, &identify, seq).await {
            warn!("identify failed, reconnecting: {e}");
            state.connected.store(false, Ordering::Release);
            continue;
        }

        // ── Session loop ────────────────────────────────────────────
        let exit = run_session(
            &mut transport,
            &mut seq,
            &mut cmd_rx,
            &event_tx,
            &state,
            &mut shutdown_rx,
        )
        .await;

        state.connected.store(false, Ordering::Release);
        match exit {
            SessionExit::Reconnect => {
                debug!("transport dropped, scheduling reconnect");
            }
            SessionExit::Stop => return,
        }
    }
}

/// Multiplex outgoing commands and incoming messages on one established
/// transport until it drops or a terminal condition occurs.
async fn run_session(
    transport: &mut impl Transport,
    seq: &mut u64,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: &mpsc::Sender<QuickDrawEvent>,
    state: &Arc<ConnState>,
    shutdown_rx: &mut tokio::sync::oneshot::Receiver<()>,
) -> SessionExit {
    loop {
        tokio::select! {
            // Branch 1: outgoing command from the handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        *seq += 1;
                        if let Err(e) = send_frame(transport, &msg, *seq).await {
                            if matches!(e, QuickDrawError::Serialization(_)) {
                                // Serialization errors are programming bugs;
                                // don't kill the connection over one.
                                error!("failed to serialize outbound frame: {e}");
                            } else {
                                error!("transport send error: {e}");
                                return SessionExit::Reconnect;
                            }
                        }
                    }
                    // Command channel closed — handle dropped.
                    None => {
                        debug!("command channel closed, shutting down connection loop");
                        let _ = transport.close().await;
                        emit_final(event_tx, state, QuickDrawEvent::Disconnected {
                            reason: Some("client shut down".into()),
                        }).await;
                        return SessionExit::Stop;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_final(event_tx, state, QuickDrawEvent::Disconnected {
                    reason: Some("client shut down".into()),
                }).await;
                return SessionExit::Stop;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::AuthFailure { reason }) => {
                                // Fatal: discard the cached credential and do
                                // not reconnect. The client needs a restart.
                                error!(%reason, "authentication failure");
                                *state.token.lock().await = None;
                                state.fatal.store(true, Ordering::Release);
                                let _ = transport.close().await;
                                emit_final(event_tx, state, QuickDrawEvent::AuthFailure {
                                    reason,
                                }).await;
                                return SessionExit::Stop;
                            }
                            Ok(server_msg) => {
                                if let ServerMessage::Welcome { token: Some(token), .. } = &server_msg {
                                    *state.token.lock().await = Some(token.clone());
                                }
                                emit_event(event_tx, QuickDrawEvent::from(server_msg)).await;
                            }
                            // One bad message must not prevent processing of
                            // the next: log and drop.
                            Err(e) => {
                                warn!("failed to deserialize server message: {e} (raw: {text})");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return SessionExit::Reconnect;
                    }
                    // Clean close by the server: an ordinary disconnect,
                    // recovered via reconnect.
                    None => {
                        debug!("transport closed by server");
                        return SessionExit::Reconnect;
                    }
                }
            }
        }
    }
}

/// Stamp `msg` with `seq` (and a nonce when required) and send it.
async fn send_frame(
    transport: &mut impl Transport,
    msg: &ClientMessage,
    seq: u64,
) -> Result<()> {
    let nonce = msg.needs_nonce().then(Uuid::new_v4);
    let frame = OutboundFrame {
        message: msg,
        seq,
        nonce,
    };
    let json = serde_json::to_string(&frame)?;
    debug!(seq, "sending frame: {:?}", std::mem::discriminant(msg));
    transport.send(json).await
}

/// Deliver a non-terminal event. A full channel drops the event with a
/// warning rather than stalling the connection loop.
async fn emit_event(event_tx: &mpsc::Sender<QuickDrawEvent>, event: QuickDrawEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event receiver dropped");
        }
    }
}

/// Emit a terminal event and mark the connection down.
///
/// Uses `send().await` (blocking) instead of `try_send` because terminal
/// events are the last on the channel and must never be silently dropped.
async fn emit_final(
    event_tx: &mpsc::Sender<QuickDrawEvent>,
    state: &Arc<ConnState>,
    event: QuickDrawEvent,
) {
    state.connected.store(false, Ordering::Release);
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    // ── Mocks ───────────────────────────────────────────────────────

    type Scripted = Vec<Option<std::result::Result<String, QuickDrawError>>>;

    /// A mock transport that records sent messages and replays scripted
    /// responses.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, QuickDrawError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), QuickDrawError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, QuickDrawError>> {
            // Scripted `None` plays a clean close. Past the end of the
            // script, park forever so the session stays up until shutdown.
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), QuickDrawError> {
            Ok(())
        }
    }

    /// A connector whose dials succeed with scripted transports, then fail
    /// forever once the script runs out.
    struct MockConnector {
        script: StdMutex<VecDeque<Scripted>>,
        sent: Arc<StdMutex<Vec<String>>>,
        attempts: Arc<AtomicU32>,
    }

    impl MockConnector {
        fn new(script: Vec<Scripted>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicU32>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let attempts = Arc::new(AtomicU32::new(0));
            let connector = Self {
                script: StdMutex::new(VecDeque::from(script)),
                sent: Arc::clone(&sent),
                attempts: Arc::clone(&attempts),
            };
            (connector, sent, attempts)
        }

        /// A connector with no scripted transports: every dial fails.
        fn always_failing() -> (Self, Arc<AtomicU32>) {
            let (connector, _sent, attempts) = Self::new(vec![]);
            (connector, attempts)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self) -> std::result::Result<MockTransport, QuickDrawError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(incoming) => Ok(MockTransport {
                    incoming: VecDeque::from(incoming),
                    sent: Arc::clone(&self.sent),
                }),
                None => Err(QuickDrawError::TransportReceive("dial refused".into())),
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn welcome_json() -> String {
        serde_json::to_string(&ServerMessage::Welcome {
            player_id: uuid::Uuid::from_u128(1),
            token: Some("tok-1".into()),
        })
        .unwrap()
    }

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig::new(Identity::new("Tex"))
            .with_reconnect_base_delay(Duration::from_millis(1))
            .with_reconnect_max_delay(Duration::from_millis(4))
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn identify_is_the_first_frame() {
        let (connector, sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(welcome_json()))]]);

        let config = fast_config();
        let (mut conn, mut events) = QuickDrawConnection::start(connector, config);

        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuickDrawEvent::Connected));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuickDrawEvent::Welcome { .. }));

        {
            let frames = sent.lock().unwrap();
            assert!(!frames.is_empty());
            let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
            assert_eq!(first["type"], "identify");
            assert_eq!(first["player_name"], "Tex");
            assert_eq!(first["seq"], 1);
        }

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn sequence_numbers_increase_and_nonce_marks_claims() {
        let (connector, sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(welcome_json()))]]);

        let config = fast_config();
        let (mut conn, mut events) = QuickDrawConnection::start(connector, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Welcome

        conn.join_queue(2).unwrap();
        conn.shoot_claim(uuid::Uuid::from_u128(77), HitZone::Vital, 100)
            .unwrap();

        // Let the loop drain the command queue.
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let frames = sent.lock().unwrap();
            assert_eq!(frames.len(), 3);

            let join: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
            assert_eq!(join["type"], "join-queue");
            assert_eq!(join["seq"], 2);
            // Ordinary commands carry no nonce.
            assert!(join.get("nonce").is_none());

            let claim: serde_json::Value = serde_json::from_str(&frames[2]).unwrap();
            assert_eq!(claim["type"], "shoot-claim");
            assert_eq!(claim["seq"], 3);
            assert_eq!(claim["hit_zone"], "vital");
            assert_eq!(claim["damage"], 100);
            // Replayable claims carry a parseable UUID nonce.
            let nonce = claim["nonce"].as_str().unwrap();
            assert!(uuid::Uuid::parse_str(nonce).is_ok());
        }

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn reconnect_budget_is_bounded_and_fatal_once() {
        let (connector, attempts) = MockConnector::always_failing();

        let config = fast_config().with_max_reconnect_attempts(3);
        let (conn, mut events) = QuickDrawConnection::start(connector, config);

        let mut reconnecting = 0;
        let mut lost = 0;
        while let Some(event) = events.recv().await {
            match event {
                QuickDrawEvent::Reconnecting { .. } => reconnecting += 1,
                QuickDrawEvent::ConnectionLost { .. } => lost += 1,
                other => panic!("unexpected event: {other:?}"),
            }
        }

        // Budget of 3: two backoff waits, then the third failure is fatal.
        assert_eq!(reconnecting, 2);
        assert_eq!(lost, 1);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        assert!(conn.is_fatal());
        assert!(!conn.is_connected());

        // Further sends are rejected.
        assert!(matches!(
            conn.join_queue(0),
            Err(QuickDrawError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn backoff_delay_doubles_and_caps() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff_delay(base, cap, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, cap, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, cap, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, cap, 40), cap);
    }

    #[tokio::test]
    async fn ordinary_disconnect_triggers_reconnect() {
        // First session ends with a clean server close; the second dial
        // succeeds immediately.
        let (connector, sent, attempts) = MockConnector::new(vec![
            vec![Some(Ok(welcome_json())), None],
            vec![Some(Ok(welcome_json()))],
        ]);

        let config = fast_config();
        let (mut conn, mut events) = QuickDrawConnection::start(connector, config);

        let mut connected = 0;
        for _ in 0..4 {
            match events.recv().await.unwrap() {
                QuickDrawEvent::Connected => connected += 1,
                QuickDrawEvent::Welcome { .. } => {}
                other => panic!("unexpected event: {other:?}"),
            }
        }

        assert_eq!(connected, 2);
        assert_eq!(attempts.load(Ordering::Relaxed), 2);

        // The identify handshake was re-sent on the second session.
        {
            let frames = sent.lock().unwrap();
            let identifies = frames
                .iter()
                .filter(|f| {
                    serde_json::from_str::<serde_json::Value>(f).unwrap()["type"] == "identify"
                })
                .count();
            assert_eq!(identifies, 2);
        }

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn auth_failure_is_fatal_and_clears_token() {
        let auth_failure = serde_json::to_string(&ServerMessage::AuthFailure {
            reason: "credential revoked".into(),
        })
        .unwrap();
        let (connector, _sent, attempts) =
            MockConnector::new(vec![vec![Some(Ok(auth_failure))], vec![]]);

        let config =
            ConnectionConfig::new(Identity::new("Tex").with_token("stale-token"));
        let (conn, mut events) = QuickDrawConnection::start(connector, config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        match event {
            QuickDrawEvent::AuthFailure { reason } => {
                assert_eq!(reason, "credential revoked");
            }
            other => panic!("expected AuthFailure, got {other:?}"),
        }

        // The loop stops: no reconnect dial, channel closes.
        assert!(events.recv().await.is_none());
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
        assert!(conn.is_fatal());
        assert!(conn.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn welcome_refreshes_cached_token() {
        let (connector, _sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(welcome_json()))]]);

        let config = ConnectionConfig::new(Identity::new("Tex").with_token("old"));
        let (mut conn, mut events) = QuickDrawConnection::start(connector, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Welcome

        assert_eq!(conn.cached_token().await.as_deref(), Some("tok-1"));

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_message_is_dropped_not_fatal() {
        let (connector, _sent, _attempts) = MockConnector::new(vec![vec![
            Some(Ok("{not valid json".into())),
            Some(Ok(r#"{"type":"no-such-kind"}"#.into())),
            Some(Ok(welcome_json())),
        ]]);

        let config = fast_config();
        let (mut conn, mut events) = QuickDrawConnection::start(connector, config);

        let _ = events.recv().await; // Connected
        // Both bad messages are skipped; the next good one still arrives.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuickDrawEvent::Welcome { .. }));

        conn.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected() {
        let (connector, _sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(welcome_json()))]]);

        let config = fast_config();
        let (mut conn, mut events) = QuickDrawConnection::start(connector, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Welcome

        conn.shutdown().await;

        let event = events.recv().await.unwrap();
        match event {
            QuickDrawEvent::Disconnected { reason } => {
                assert_eq!(reason.as_deref(), Some("client shut down"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (connector, _sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(welcome_json()))]]);

        let config = fast_config();
        let (mut conn, mut events) = QuickDrawConnection::start(connector, config);

        let _ = events.recv().await; // Connected

        conn.shutdown().await;
        conn.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (connector, _sent, _attempts) =
            MockConnector::new(vec![vec![Some(Ok(welcome_json()))]]);

        let config = fast_config();
        let (conn, mut events) = QuickDrawConnection::start(connector, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Welcome

        // Drop the handle without calling shutdown; the loop task is
        // aborted and the event channel closes without hanging.
        drop(conn);
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = ConnectionConfig::new(Identity::new("Tex"));
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(500));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(10));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn config_clamps_degenerate_values() {
        let config = ConnectionConfig::new(Identity::new("Tex"))
            .with_max_reconnect_attempts(0)
            .with_event_channel_capacity(0);
        assert_eq!(config.max_reconnect_attempts, 1);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        // More roster updates than the tiny event channel can hold.
        let mut incoming: Scripted = vec![Some(Ok(welcome_json()))];
        let update = serde_json::to_string(&ServerMessage::PlayerLeft {
            id: uuid::Uuid::from_u128(9),
        })
        .unwrap();
        for _ in 0..20 {
            incoming.push(Some(Ok(update.clone())));
        }
        incoming.push(None);

        let (connector, _sent, _attempts) = MockConnector::new(vec![incoming]);

        let config = fast_config()
            .with_event_channel_capacity(1)
            .with_max_reconnect_attempts(1);
        let (conn, mut events) = QuickDrawConnection::start(connector, config);

        // Leave the receiver idle so the channel overflows.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        while let Some(_event) = events.recv().await {
            count += 1;
        }
        // Some events were dropped under backpressure, but the terminal one
        // was delivered and the loop never blocked.
        assert!(count >= 2, "expected at least 2 events, got {count}");
        assert!(count < 23, "expected backpressure to drop events, got {count}");
        assert!(conn.is_fatal());
    }
}
