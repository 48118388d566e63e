//! WebSocket connection management
//!
//! One transport per logical workspace id, owned by a dedicated actor task.
//! The actor owns every timer (keepalive, health check, reconnect backoff)
//! so connection liveness is independent of whatever screen is rendered.
//! External callers hold a cheap `Clone` handle; status reads are lock-free
//! through `ArcSwap` and inbound frames fan out on a broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use pressdock_protocol::{new_id, ClientFrame, ConnectionStatus};

use crate::error::ClientError;
use crate::now_ms;

/// Default timeout for tracked operations (tool calls, file writes).
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Reconnect backoff: exponential doubling from a base delay, capped, with
/// random jitter on top, for a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.25,
            max_attempts: 8,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt (1-based). `jitter_unit` is a sample
    /// in [0, 1); keeping it a parameter keeps this function testable.
    pub fn delay_ms(&self, attempt: u32, jitter_unit: f64) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let exponent = (attempt - 1).min(10);
        let scaled = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);
        let jitter_max = (scaled as f64 * self.jitter_ratio.max(0.0)) as u64;
        let jitter = (jitter_max as f64 * jitter_unit.clamp(0.0, 1.0)) as u64;
        scaled.saturating_add(jitter)
    }
}

/// Connection tuning knobs. Tests shrink the timers.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub backoff: BackoffPolicy,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub ping_timeout_ms: u64,
    pub health_interval: Duration,
    pub stale_threshold_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:4000".to_string(),
            token: None,
            backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_secs(15),
            ping_interval: Duration::from_secs(30),
            ping_timeout_ms: 10_000,
            health_interval: Duration::from_secs(45),
            stale_threshold_ms: 90_000,
        }
    }
}

/// Events published by the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StatusChanged(ConnectionStatus),
    /// Raw inbound text frame, not yet decoded.
    Inbound(String),
    /// A tracked non-ping operation exceeded its timeout.
    OperationTimedOut { operation_id: String },
    /// The reconnect budget is exhausted; manual retry required.
    ReconnectFailed,
}

/// Commands accepted by a transport's write half.
#[derive(Debug)]
pub enum LinkOutbound {
    Text(String),
    Close,
}

/// Frames surfaced by a transport's read half.
#[derive(Debug)]
pub enum LinkInbound {
    Text(String),
    Closed { clean: bool },
}

/// A dialed transport: a sender into the write pump and a receiver fed by
/// the read pump.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<LinkOutbound>,
    pub inbound: mpsc::UnboundedReceiver<LinkInbound>,
}

/// Seam between the manager and the actual transport. Production dials a
/// WebSocket; tests dial channel pairs.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, url: String) -> BoxFuture<'static, Result<TransportLink, ClientError>>;
}

/// Production dialer over tokio-tungstenite.
pub struct WsDialer;

impl Dialer for WsDialer {
    fn dial(&self, url: String) -> BoxFuture<'static, Result<TransportLink, ClientError>> {
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ClientError::Connect(e.to_string()))?;
            let (mut ws_tx, mut ws_rx) = stream.split();

            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<LinkOutbound>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<LinkInbound>();

            // Write pump
            tokio::spawn(async move {
                while let Some(cmd) = outbound_rx.recv().await {
                    let result = match cmd {
                        LinkOutbound::Text(text) => ws_tx.send(Message::Text(text.into())).await,
                        LinkOutbound::Close => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client disconnect".into(),
                            };
                            let _ = ws_tx.send(Message::Close(Some(frame))).await;
                            break;
                        }
                    };
                    if let Err(e) = result {
                        debug!(
                            component = "connection",
                            event = "connection.write.failed",
                            error = %e,
                            "WebSocket write failed"
                        );
                        break;
                    }
                }
            });

            // Read pump. Transports do not always surface half-open failures
            // promptly; EOF without a close frame counts as abnormal.
            tokio::spawn(async move {
                let mut announced = false;
                while let Some(result) = ws_rx.next().await {
                    match result {
                        Ok(Message::Text(text)) => {
                            if inbound_tx.send(LinkInbound::Text(text.to_string())).is_err() {
                                return;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            let clean = frame
                                .as_ref()
                                .map(|f| f.code == CloseCode::Normal)
                                .unwrap_or(false);
                            let _ = inbound_tx.send(LinkInbound::Closed { clean });
                            announced = true;
                            break;
                        }
                        // WebSocket-level pings are answered by tungstenite;
                        // pongs and binary frames carry nothing for us.
                        Ok(_) => {}
                        Err(e) => {
                            debug!(
                                component = "connection",
                                event = "connection.read.failed",
                                error = %e,
                                "WebSocket read failed"
                            );
                            let _ = inbound_tx.send(LinkInbound::Closed { clean: false });
                            announced = true;
                            break;
                        }
                    }
                }
                if !announced {
                    let _ = inbound_tx.send(LinkInbound::Closed { clean: false });
                }
            });

            Ok(TransportLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        })
    }
}

/// An outbound request awaiting a correlated response.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub operation_id: String,
    pub started_at_ms: u64,
    pub timeout_ms: u64,
    /// Ping timeouts are diagnostic-only and never surfaced.
    pub silent: bool,
}

/// Lock-free view of the connection.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub workspace_id: Option<String>,
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    outbound: Option<mpsc::UnboundedSender<LinkOutbound>>,
}

struct Shared {
    snapshot: ArcSwap<ConnectionSnapshot>,
    pending: DashMap<String, PendingOperation>,
    events: broadcast::Sender<ConnectionEvent>,
    last_inbound_ms: AtomicU64,
}

enum Command {
    Connect {
        workspace_id: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Disconnect {
        reset_identity: bool,
    },
    /// Manual reconnect: resets the attempt budget and redials.
    Reconnect,
    /// Opportunistic reconnect hint from a failed send. Never resurrects a
    /// terminally failed connection.
    NudgeReconnect,
    DialOutcome {
        generation: u64,
        result: Result<TransportLink, ClientError>,
    },
    RetryDue {
        generation: u64,
    },
}

/// Handle to the connection actor. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    command_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_dialer(config, Arc::new(WsDialer))
    }

    /// Construct with an explicit dialer. Tests use channel-backed fakes.
    pub fn with_dialer(config: ConnectionConfig, dialer: Arc<dyn Dialer>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(1024);
        let shared = Arc::new(Shared {
            snapshot: ArcSwap::from_pointee(ConnectionSnapshot {
                workspace_id: None,
                status: ConnectionStatus::Disconnected,
                reconnect_attempts: 0,
                outbound: None,
            }),
            pending: DashMap::new(),
            events,
            last_inbound_ms: AtomicU64::new(0),
        });

        let actor = Actor {
            shared: Arc::clone(&shared),
            dialer,
            config,
            command_tx: command_tx.clone(),
            workspace_id: None,
            intent_disconnect: false,
            attempts: 0,
            generation: 0,
            dialing: false,
            waiters: Vec::new(),
            outbound: None,
            inbound: None,
            status: ConnectionStatus::Disconnected,
        };
        tokio::spawn(run_actor(actor, command_rx));

        Self { command_tx, shared }
    }

    /// Open (or reuse) the transport for a workspace. Concurrent calls for
    /// the same id share one in-flight attempt; a call for a different id
    /// supersedes the previous connection.
    pub async fn connect(&self, workspace_id: impl Into<String>) -> Result<(), ClientError> {
        let workspace_id = workspace_id.into();
        if workspace_id.trim().is_empty() {
            return Err(ClientError::InvalidWorkspaceId(workspace_id));
        }
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Connect {
                workspace_id,
                reply: tx,
            })
            .map_err(|_| ClientError::ManagerStopped)?;
        rx.await.map_err(|_| ClientError::ManagerStopped)?
    }

    /// Close the transport cleanly. `reset_identity` is false only for
    /// internal teardown where the target workspace must be preserved.
    pub fn disconnect(&self, reset_identity: bool) {
        let _ = self.command_tx.send(Command::Disconnect { reset_identity });
    }

    /// Manual reconnect: resets the attempt budget and redials the bound
    /// workspace.
    pub fn request_reconnect(&self) {
        let _ = self.command_tx.send(Command::Reconnect);
    }

    /// True only if the transport is open and bound to exactly this id.
    pub fn is_connected_to(&self, workspace_id: &str) -> bool {
        let snap = self.shared.snapshot.load();
        snap.status == ConnectionStatus::Connected
            && snap.workspace_id.as_deref() == Some(workspace_id)
            && snap
                .outbound
                .as_ref()
                .map(|tx| !tx.is_closed())
                .unwrap_or(false)
    }

    /// Best-effort synchronous send. Returns false (and opportunistically
    /// schedules a reconnect) when the transport is not open.
    pub fn send(&self, frame: &ClientFrame) -> bool {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                error!(
                    component = "connection",
                    event = "connection.send.serialize_failed",
                    error = %e,
                    "Failed to serialize outbound frame"
                );
                return false;
            }
        };

        let snap = self.shared.snapshot.load();
        let delivered = snap
            .outbound
            .as_ref()
            .map(|tx| tx.send(LinkOutbound::Text(json)).is_ok())
            .unwrap_or(false);

        if !delivered {
            let _ = self.command_tx.send(Command::NudgeReconnect);
        }
        delivered
    }

    /// Like `send`, but registers a pending operation that auto-times-out.
    /// Returns the operation id when the frame was handed to the transport.
    pub fn send_tracked(
        &self,
        frame: &ClientFrame,
        operation_id: Option<String>,
        timeout_ms: u64,
    ) -> Option<String> {
        let operation_id = operation_id.unwrap_or_else(new_id);
        let silent = matches!(frame, ClientFrame::Ping { .. });
        if !self.send(frame) {
            return None;
        }
        track_operation(&self.shared, operation_id.clone(), timeout_ms, silent);
        Some(operation_id)
    }

    /// Settle a tracked operation. Returns false for unknown (late, already
    /// timed out) operation ids.
    pub fn complete_operation(&self, operation_id: &str) -> bool {
        self.shared.pending.remove(operation_id).is_some()
    }

    pub fn pending_operations(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn snapshot(&self) -> Arc<ConnectionSnapshot> {
        self.shared.snapshot.load_full()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.snapshot.load().status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }
}

fn session_url(base_url: &str, workspace_id: &str, token: Option<&str>) -> String {
    let mut url = format!("{}/ws/{}", base_url.trim_end_matches('/'), workspace_id);
    if let Some(token) = token {
        url.push_str("?token=");
        url.push_str(token);
    }
    url
}

fn track_operation(shared: &Arc<Shared>, operation_id: String, timeout_ms: u64, silent: bool) {
    shared.pending.insert(
        operation_id.clone(),
        PendingOperation {
            operation_id: operation_id.clone(),
            started_at_ms: now_ms(),
            timeout_ms,
            silent,
        },
    );

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
        if shared.pending.remove(&operation_id).is_some() {
            if silent {
                debug!(
                    component = "connection",
                    event = "connection.ping.timeout",
                    operation_id = %operation_id,
                    "Keepalive ping timed out"
                );
            } else {
                warn!(
                    component = "connection",
                    event = "connection.operation.timeout",
                    operation_id = %operation_id,
                    timeout_ms,
                    "Tracked operation timed out"
                );
                let _ = shared
                    .events
                    .send(ConnectionEvent::OperationTimedOut { operation_id });
            }
        }
    });
}

struct Actor {
    shared: Arc<Shared>,
    dialer: Arc<dyn Dialer>,
    config: ConnectionConfig,
    command_tx: mpsc::UnboundedSender<Command>,
    workspace_id: Option<String>,
    intent_disconnect: bool,
    attempts: u32,
    generation: u64,
    dialing: bool,
    waiters: Vec<oneshot::Sender<Result<(), ClientError>>>,
    outbound: Option<mpsc::UnboundedSender<LinkOutbound>>,
    inbound: Option<mpsc::UnboundedReceiver<LinkInbound>>,
    status: ConnectionStatus,
}

async fn run_actor(mut actor: Actor, mut command_rx: mpsc::UnboundedReceiver<Command>) {
    let mut keepalive = tokio::time::interval(actor.config.ping_interval);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut health = tokio::time::interval(actor.config.health_interval);
    health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(cmd) => actor.handle_command(cmd),
                    None => break,
                }
            }
            frame = async {
                match actor.inbound.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => actor.handle_inbound(frame),
            _ = keepalive.tick() => actor.on_keepalive_tick(),
            _ = health.tick() => actor.on_health_tick(),
        }
    }

    debug!(
        component = "connection",
        event = "connection.actor.stopped",
        "Connection actor stopped"
    );
}

impl Actor {
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                workspace_id,
                reply,
            } => self.on_connect(workspace_id, reply),
            Command::Disconnect { reset_identity } => self.on_disconnect(reset_identity),
            Command::Reconnect => self.on_manual_reconnect(),
            Command::NudgeReconnect => self.on_nudge(),
            Command::DialOutcome { generation, result } => {
                self.on_dial_outcome(generation, result)
            }
            Command::RetryDue { generation } => self.on_retry_due(generation),
        }
    }

    fn on_connect(
        &mut self,
        workspace_id: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    ) {
        if workspace_id.trim().is_empty() {
            let _ = reply.send(Err(ClientError::InvalidWorkspaceId(workspace_id)));
            return;
        }

        self.intent_disconnect = false;
        let same = self.workspace_id.as_deref() == Some(workspace_id.as_str());

        if same && self.status == ConnectionStatus::Connected && self.link_open() {
            let _ = reply.send(Ok(()));
            return;
        }
        if same && self.dialing {
            // idempotent-in-flight: join the pending attempt
            self.waiters.push(reply);
            return;
        }

        if !same {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(Err(ClientError::Superseded));
            }
        }
        self.close_link();
        self.workspace_id = Some(workspace_id);
        self.attempts = 0;
        self.waiters.push(reply);
        self.start_dial();
    }

    fn on_disconnect(&mut self, reset_identity: bool) {
        self.intent_disconnect = true;
        if reset_identity {
            self.workspace_id = None;
        }
        self.attempts = 0;
        self.dialing = false;
        self.generation += 1;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(ClientError::Superseded));
        }
        self.close_link();
        self.set_status(ConnectionStatus::Disconnected);
        info!(
            component = "connection",
            event = "connection.disconnected",
            reset_identity,
            "Connection closed by caller"
        );
    }

    fn on_manual_reconnect(&mut self) {
        self.intent_disconnect = false;
        self.attempts = 0;
        self.generation += 1;
        self.close_link();
        if self.workspace_id.is_some() {
            self.start_dial();
        } else {
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    fn on_nudge(&mut self) {
        let idle = self.outbound.is_none() && !self.dialing;
        if idle
            && !self.intent_disconnect
            && self.workspace_id.is_some()
            && self.status != ConnectionStatus::Error
        {
            self.schedule_reconnect();
        }
    }

    fn on_dial_outcome(
        &mut self,
        generation: u64,
        result: Result<TransportLink, ClientError>,
    ) {
        if generation != self.generation {
            // a newer connect superseded this dial; close the orphan
            if let Ok(link) = result {
                let _ = link.outbound.send(LinkOutbound::Close);
            }
            debug!(
                component = "connection",
                event = "connection.dial.stale",
                generation,
                "Discarded stale dial outcome"
            );
            return;
        }

        self.dialing = false;
        match result {
            Ok(link) => {
                self.attempts = 0;
                self.outbound = Some(link.outbound);
                self.inbound = Some(link.inbound);
                self.shared.last_inbound_ms.store(now_ms(), Ordering::Relaxed);
                self.set_status(ConnectionStatus::Connected);
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                info!(
                    component = "connection",
                    event = "connection.opened",
                    workspace_id = ?self.workspace_id,
                    "Transport open"
                );
            }
            Err(err) => {
                let caller_initiated = !self.waiters.is_empty();
                if caller_initiated {
                    // connect-time failures reject the promise; caller decides
                    for waiter in self.waiters.drain(..) {
                        let _ = waiter.send(Err(err.clone()));
                    }
                    self.set_status(ConnectionStatus::Error);
                    warn!(
                        component = "connection",
                        event = "connection.connect.failed",
                        error = %err,
                        "Connect failed"
                    );
                } else {
                    warn!(
                        component = "connection",
                        event = "connection.redial.failed",
                        error = %err,
                        attempt = self.attempts,
                        "Reconnect dial failed"
                    );
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn on_retry_due(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        if self.dialing || self.outbound.is_some() || self.intent_disconnect {
            return;
        }
        self.start_dial();
    }

    fn handle_inbound(&mut self, frame: Option<LinkInbound>) {
        match frame {
            Some(LinkInbound::Text(text)) => {
                self.shared.last_inbound_ms.store(now_ms(), Ordering::Relaxed);
                let _ = self.shared.events.send(ConnectionEvent::Inbound(text));
            }
            Some(LinkInbound::Closed { clean }) => self.on_link_closed(clean),
            None => self.on_link_closed(false),
        }
    }

    fn on_link_closed(&mut self, clean: bool) {
        self.inbound = None;
        self.outbound = None;
        self.shared.pending.clear();

        if self.intent_disconnect || clean {
            self.set_status(ConnectionStatus::Disconnected);
            info!(
                component = "connection",
                event = "connection.closed.clean",
                "Transport closed"
            );
        } else {
            warn!(
                component = "connection",
                event = "connection.closed.abnormal",
                workspace_id = ?self.workspace_id,
                "Transport dropped, scheduling reconnect"
            );
            self.schedule_reconnect();
        }
    }

    fn on_keepalive_tick(&mut self) {
        if self.status != ConnectionStatus::Connected {
            return;
        }
        self.send_probe_ping();
    }

    fn on_health_tick(&mut self) {
        if self.status != ConnectionStatus::Connected {
            return;
        }
        if !self.link_open() {
            warn!(
                component = "connection",
                event = "connection.health.dead_transport",
                "Transport not open despite connected status, forcing reconnect"
            );
            self.close_link();
            self.schedule_reconnect();
            return;
        }

        let idle_ms = now_ms().saturating_sub(self.shared.last_inbound_ms.load(Ordering::Relaxed));
        if idle_ms > self.config.stale_threshold_ms {
            debug!(
                component = "connection",
                event = "connection.health.stale",
                idle_ms,
                "No inbound traffic, probing"
            );
            self.send_probe_ping();
        }
    }

    fn send_probe_ping(&mut self) {
        let operation_id = new_id();
        let frame = ClientFrame::Ping {
            operation_id: operation_id.clone(),
        };
        let Ok(json) = serde_json::to_string(&frame) else {
            return;
        };
        let Some(outbound) = self.outbound.as_ref() else {
            return;
        };
        if outbound.send(LinkOutbound::Text(json)).is_ok() {
            track_operation(&self.shared, operation_id, self.config.ping_timeout_ms, true);
        }
    }

    fn start_dial(&mut self) {
        let Some(workspace_id) = self.workspace_id.clone() else {
            return;
        };
        self.generation += 1;
        self.dialing = true;
        self.set_status(ConnectionStatus::Connecting);

        let url = session_url(
            &self.config.base_url,
            &workspace_id,
            self.config.token.as_deref(),
        );
        let generation = self.generation;
        let dial = self.dialer.dial(url);
        let timeout = self.config.connect_timeout;
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, dial).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::ConnectTimeout),
            };
            let _ = command_tx.send(Command::DialOutcome { generation, result });
        });

        info!(
            component = "connection",
            event = "connection.dial.started",
            workspace_id = %workspace_id,
            generation,
            "Dialing workspace transport"
        );
    }

    fn schedule_reconnect(&mut self) {
        if self.intent_disconnect || self.workspace_id.is_none() {
            self.set_status(ConnectionStatus::Disconnected);
            return;
        }

        self.attempts += 1;
        if self.attempts > self.config.backoff.max_attempts {
            self.set_status(ConnectionStatus::Error);
            let _ = self.shared.events.send(ConnectionEvent::ReconnectFailed);
            error!(
                component = "connection",
                event = "connection.reconnect.exhausted",
                attempts = self.attempts - 1,
                "Reconnect budget exhausted, manual retry required"
            );
            return;
        }

        self.set_status(ConnectionStatus::Connecting);
        let delay = self
            .config
            .backoff
            .delay_ms(self.attempts, rand::random::<f64>());
        let generation = self.generation;
        let command_tx = self.command_tx.clone();
        info!(
            component = "connection",
            event = "connection.reconnect.scheduled",
            attempt = self.attempts,
            delay_ms = delay,
            "Reconnect scheduled"
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let _ = command_tx.send(Command::RetryDue { generation });
        });
    }

    fn link_open(&self) -> bool {
        self.outbound
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    fn close_link(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(LinkOutbound::Close);
        }
        self.inbound = None;
        self.shared.pending.clear();
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        let changed = self.status != status;
        self.status = status;
        self.shared.snapshot.store(Arc::new(ConnectionSnapshot {
            workspace_id: self.workspace_id.clone(),
            status,
            reconnect_attempts: self.attempts,
            outbound: self.outbound.clone(),
        }));
        if changed {
            let _ = self
                .shared
                .events
                .send(ConnectionEvent::StatusChanged(status));
        }
    }
}
