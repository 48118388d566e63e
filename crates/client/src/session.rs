//! Session actor
//!
//! Owns the canonical session state and processes every mutation on one
//! event loop: inbound frames from the connection manager, user intents
//! from the handle, and internal settle timers. Effects produced by the
//! reducer are executed here. Readers get lock-free snapshots via
//! `ArcSwap`; discrete session events fan out on a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use pressdock_protocol::new_id;

use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager};
use crate::dispatcher::{AgentEvent, EventDispatcher};
use crate::error::ClientError;
use crate::now_ms;
use crate::reducer::{reduce, Effect, Input, SessionSnapshot, SessionState};

/// Discrete session-level events for the UI, complementing the snapshot.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The canonical snapshot changed.
    Updated { revision: u64 },
    /// A tracked tool/file operation timed out; offer a manual retry.
    OperationTimedOut { operation_id: String },
    /// The reconnect budget is exhausted; an explicit retry is required.
    ReconnectFailed,
}

enum SessionCommand {
    BindWorkspace { workspace_id: String },
    UserMessage { message_id: String, content: String },
    ExecuteTool {
        tool_id: String,
        name: String,
        parameters: Value,
    },
    ClearSession,
}

/// Handle to a running session. Cheap to clone; all mutations flow through
/// the intent methods, never into the snapshot directly.
#[derive(Clone)]
pub struct SessionClient {
    connection: ConnectionManager,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connection(ConnectionManager::new(config))
    }

    /// Build a session on top of an existing connection manager (tests
    /// inject one with a fake dialer).
    pub fn with_connection(connection: ConnectionManager) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);

        let state = SessionState::new();
        let snapshot = Arc::new(ArcSwap::from_pointee(state.snapshot(0)));

        let actor = SessionActor {
            state,
            revision: 0,
            connection: connection.clone(),
            dispatcher: EventDispatcher::new(),
            snapshot: Arc::clone(&snapshot),
            events: events.clone(),
            settle_tx,
        };
        let conn_events = connection.subscribe();
        tokio::spawn(run_session(actor, command_rx, conn_events, settle_rx));

        Self {
            connection,
            command_tx,
            snapshot,
            events,
        }
    }

    /// Bind the session to a workspace and open its transport.
    pub async fn connect(&self, workspace_id: &str) -> Result<(), ClientError> {
        let _ = self.command_tx.send(SessionCommand::BindWorkspace {
            workspace_id: workspace_id.to_string(),
        });
        self.connection.connect(workspace_id).await
    }

    /// Append a user message and trigger the agent. Optimistic: the local
    /// state updates immediately, delivery is best-effort until an
    /// acknowledgement event arrives. Returns the new message id.
    pub fn send_user_message(&self, content: &str) -> String {
        let message_id = new_id();
        let _ = self.command_tx.send(SessionCommand::UserMessage {
            message_id: message_id.clone(),
            content: content.to_string(),
        });
        message_id
    }

    /// Dispatch a tool invocation. Returns the tool id used for correlation.
    pub fn execute_tool(&self, name: &str, parameters: Value) -> String {
        let tool_id = new_id();
        let _ = self.command_tx.send(SessionCommand::ExecuteTool {
            tool_id: tool_id.clone(),
            name: name.to_string(),
            parameters,
        });
        tool_id
    }

    /// Reset the reconnect budget and redial the bound workspace.
    pub fn reconnect(&self) {
        self.connection.request_reconnect();
    }

    /// Wipe conversation and workspace file state.
    pub fn clear_session(&self) {
        let _ = self.command_tx.send(SessionCommand::ClearSession);
    }

    /// Close the transport and release the workspace binding.
    pub fn disconnect(&self) {
        self.connection.disconnect(true);
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

struct SessionActor {
    state: SessionState,
    revision: u64,
    connection: ConnectionManager,
    dispatcher: EventDispatcher,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
    settle_tx: mpsc::UnboundedSender<String>,
}

async fn run_session(
    mut actor: SessionActor,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    mut conn_events: broadcast::Receiver<ConnectionEvent>,
    mut settle_rx: mpsc::UnboundedReceiver<String>,
) {
    loop {
        tokio::select! {
            event = conn_events.recv() => match event {
                Ok(ConnectionEvent::Inbound(raw)) => {
                    let event = actor.dispatcher.ingest(&raw);
                    if let AgentEvent::Frame(frame) = event {
                        actor.apply(Input::Frame(frame));
                    }
                    // Unrecognized frames were already logged by the
                    // dispatcher and carry nothing for the reducer
                }
                Ok(ConnectionEvent::StatusChanged(status)) => {
                    actor.apply(Input::ConnectionChanged(status));
                }
                Ok(ConnectionEvent::OperationTimedOut { operation_id }) => {
                    let _ = actor.events.send(SessionEvent::OperationTimedOut {
                        operation_id: operation_id.clone(),
                    });
                    actor.apply(Input::OperationTimedOut { operation_id });
                }
                Ok(ConnectionEvent::ReconnectFailed) => {
                    let _ = actor.events.send(SessionEvent::ReconnectFailed);
                    actor.apply(Input::ReconnectFailed);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        component = "session",
                        event = "session.events.lagged",
                        skipped,
                        "Session fell behind the connection event stream"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            cmd = command_rx.recv() => match cmd {
                Some(SessionCommand::BindWorkspace { workspace_id }) => {
                    actor.apply(Input::WorkspaceBound { workspace_id });
                }
                Some(SessionCommand::UserMessage { message_id, content }) => {
                    actor.apply(Input::UserMessageSent { message_id, content });
                }
                Some(SessionCommand::ExecuteTool { tool_id, name, parameters }) => {
                    actor.apply(Input::ToolInvoked { tool_id, name, parameters });
                }
                Some(SessionCommand::ClearSession) => {
                    actor.apply(Input::SessionCleared);
                }
                None => break,
            },

            settle = settle_rx.recv() => {
                if let Some(path) = settle {
                    actor.apply(Input::SettleElapsed { path });
                }
            }
        }
    }

    debug!(
        component = "session",
        event = "session.actor.stopped",
        "Session actor stopped"
    );
}

impl SessionActor {
    fn apply(&mut self, input: Input) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = reduce(state, input, now_ms());
        self.state = state;

        for effect in effects {
            match effect {
                Effect::Send(frame) => {
                    if !self.connection.send(&frame) {
                        debug!(
                            component = "session",
                            event = "session.send.dropped",
                            "Outbound frame dropped, transport not open"
                        );
                    }
                }
                Effect::SendTracked {
                    frame,
                    operation_id,
                    timeout_ms,
                } => {
                    if self
                        .connection
                        .send_tracked(&frame, Some(operation_id.clone()), timeout_ms)
                        .is_none()
                    {
                        debug!(
                            component = "session",
                            event = "session.send_tracked.dropped",
                            operation_id = %operation_id,
                            "Tracked frame dropped, transport not open"
                        );
                    }
                }
                Effect::ScheduleSettle { path, delay_ms } => {
                    let settle_tx = self.settle_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        let _ = settle_tx.send(path);
                    });
                }
                Effect::CompleteOperation { operation_id } => {
                    self.connection.complete_operation(&operation_id);
                }
            }
        }

        self.revision += 1;
        self.snapshot.store(Arc::new(self.state.snapshot(self.revision)));
        let _ = self.events.send(SessionEvent::Updated {
            revision: self.revision,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use futures::future::BoxFuture;
    use pressdock_protocol::{ClientFrame, ConnectionStatus, Sender};

    use crate::connection::{
        BackoffPolicy, Dialer, LinkInbound, LinkOutbound, TransportLink,
    };

    struct FakeRemote {
        to_client: mpsc::UnboundedSender<LinkInbound>,
        from_client: mpsc::UnboundedReceiver<LinkOutbound>,
    }

    #[derive(Default)]
    struct FakeDialer {
        dial_count: AtomicU32,
        remotes: Mutex<Vec<FakeRemote>>,
    }

    impl FakeDialer {
        fn take_remote(&self) -> FakeRemote {
            self.remotes.lock().unwrap().remove(0)
        }
    }

    impl Dialer for FakeDialer {
        fn dial(&self, _url: String) -> BoxFuture<'static, Result<TransportLink, ClientError>> {
            self.dial_count.fetch_add(1, Ordering::SeqCst);
            let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
            let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
            self.remotes.lock().unwrap().push(FakeRemote {
                to_client: to_client_tx,
                from_client: from_client_rx,
            });
            Box::pin(async move {
                Ok(TransportLink {
                    outbound: from_client_tx,
                    inbound: to_client_rx,
                })
            })
        }
    }

    fn test_client() -> (SessionClient, Arc<FakeDialer>) {
        let dialer = Arc::new(FakeDialer::default());
        let config = ConnectionConfig {
            base_url: "ws://test.invalid".to_string(),
            backoff: BackoffPolicy {
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter_ratio: 0.0,
                max_attempts: 1,
            },
            ping_interval: Duration::from_secs(3_600),
            health_interval: Duration::from_secs(3_600),
            ..Default::default()
        };
        let connection = ConnectionManager::with_dialer(config, dialer.clone());
        (SessionClient::with_connection(connection), dialer)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[tokio::test]
    async fn user_message_reaches_wire_and_snapshot() {
        let (client, dialer) = test_client();
        client.connect("ws-1").await.unwrap();
        let mut remote = dialer.take_remote();

        client.send_user_message("Create a contact form plugin");

        wait_until(|| client.snapshot().messages.len() == 1).await;
        let snapshot = client.snapshot();
        assert_eq!(snapshot.messages[0].sender, Sender::User);
        assert!(snapshot.is_processing);

        let mut frames = Vec::new();
        while let Ok(frame) = remote.from_client.try_recv() {
            if let LinkOutbound::Text(json) = frame {
                frames.push(json);
            }
        }
        assert!(frames.iter().any(|f| f.contains(r#""type":"user_message""#)));
        assert!(frames.iter().any(|f| f.contains(r#""type":"query_agent""#)));
    }

    #[tokio::test]
    async fn inbound_frames_flow_through_reducer_idempotently() {
        let (client, dialer) = test_client();
        client.connect("ws-1").await.unwrap();
        let remote = dialer.take_remote();

        let frame = r#"{"type":"new_message","message_id":"m2","text":"Done","sender":"assistant","timestamp":1700000000000}"#;
        remote
            .to_client
            .send(LinkInbound::Text(frame.to_string()))
            .unwrap();
        remote
            .to_client
            .send(LinkInbound::Text(frame.to_string()))
            .unwrap();

        wait_until(|| !client.snapshot().messages.is_empty()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = client.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].id, "m2");
        assert!(!snapshot.is_processing);
    }

    #[tokio::test]
    async fn streaming_scenario_builds_single_assistant_message() {
        let (client, dialer) = test_client();
        client.connect("ws-1").await.unwrap();
        let remote = dialer.take_remote();

        for frame in [
            r#"{"type":"thinking_update","message_id":"m1","thinking":"analyzing..."}"#,
            r#"{"type":"text","message_id":"m1","content":"Here is"}"#,
            r#"{"type":"text","content":" your plugin"}"#,
        ] {
            remote
                .to_client
                .send(LinkInbound::Text(frame.to_string()))
                .unwrap();
        }

        wait_until(|| client.snapshot().streaming.content == "Here is your plugin").await;
        assert!(client.snapshot().streaming.is_streaming);

        remote
            .to_client
            .send(LinkInbound::Text(
                r#"{"type":"stream_complete","message_id":"m1"}"#.to_string(),
            ))
            .unwrap();

        wait_until(|| !client.snapshot().messages.is_empty()).await;
        let snapshot = client.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].content, "Here is your plugin");
        assert_eq!(snapshot.messages[0].thinking.as_deref(), Some("analyzing..."));
        assert!(!snapshot.streaming.is_streaming);
        assert!(!snapshot.is_processing);
    }

    #[tokio::test]
    async fn pong_frame_completes_tracked_operation() {
        let (client, dialer) = test_client();
        client.connect("ws-1").await.unwrap();
        let remote = dialer.take_remote();

        let ping = ClientFrame::Ping {
            operation_id: "op-7".to_string(),
        };
        client
            .connection()
            .send_tracked(&ping, Some("op-7".to_string()), 60_000)
            .unwrap();
        assert_eq!(client.connection().pending_operations(), 1);

        remote
            .to_client
            .send(LinkInbound::Text(
                r#"{"type":"pong","operation_id":"op-7"}"#.to_string(),
            ))
            .unwrap();

        wait_until(|| client.connection().pending_operations() == 0).await;
    }

    #[tokio::test]
    async fn malformed_frames_do_not_stall_the_session() {
        let (client, dialer) = test_client();
        client.connect("ws-1").await.unwrap();
        let remote = dialer.take_remote();

        remote
            .to_client
            .send(LinkInbound::Text("garbage{{".to_string()))
            .unwrap();
        remote
            .to_client
            .send(LinkInbound::Text(
                r#"{"type":"new_message","message_id":"m1","text":"ok","sender":"assistant"}"#
                    .to_string(),
            ))
            .unwrap();

        wait_until(|| !client.snapshot().messages.is_empty()).await;
        assert_eq!(client.snapshot().messages[0].content, "ok");
    }

    #[tokio::test]
    async fn clear_session_resets_snapshot() {
        let (client, dialer) = test_client();
        client.connect("ws-1").await.unwrap();
        let _remote = dialer.take_remote();

        client.send_user_message("hello");
        wait_until(|| !client.snapshot().messages.is_empty()).await;

        client.clear_session();
        wait_until(|| client.snapshot().messages.is_empty()).await;
        let snapshot = client.snapshot();
        assert!(!snapshot.is_processing);
        assert_eq!(snapshot.connection, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn connection_status_is_reflected_in_snapshot() {
        let (client, dialer) = test_client();
        client.connect("ws-1").await.unwrap();
        let _remote = dialer.take_remote();

        wait_until(|| client.snapshot().connection == ConnectionStatus::Connected).await;

        client.disconnect();
        wait_until(|| client.snapshot().connection == ConnectionStatus::Disconnected).await;
    }
}
