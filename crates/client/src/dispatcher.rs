//! Typed event dispatch
//!
//! Decodes each inbound frame into a closed event type and fans it out:
//! once under its specific kind, once on a generic any-event channel for
//! cross-cutting observers. No business logic lives here. A frame that
//! fails to decode becomes `Unrecognized` — logged, never fatal to the
//! dispatch loop.

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use pressdock_protocol::AgentFrame;

/// A decoded inbound event.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Frame(AgentFrame),
    /// Raw frame that did not decode into a known shape.
    Unrecognized {
        frame_type: Option<String>,
        raw: String,
    },
}

/// Subscription granularity for per-kind channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectionEstablished,
    ProcessingStatus,
    ThinkingUpdate,
    Text,
    NewMessage,
    StreamComplete,
    Error,
    FileUpdate,
    FileActionBroadcast,
    ToolStatusUpdate,
    ToolRequest,
    ToolResponse,
    Ping,
    Pong,
    Unrecognized,
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::Unrecognized { .. } => EventKind::Unrecognized,
            AgentEvent::Frame(frame) => match frame {
                AgentFrame::ConnectionEstablished { .. } => EventKind::ConnectionEstablished,
                AgentFrame::ProcessingStatus { .. } => EventKind::ProcessingStatus,
                AgentFrame::ThinkingUpdate { .. } => EventKind::ThinkingUpdate,
                AgentFrame::Text { .. } => EventKind::Text,
                AgentFrame::NewMessage { .. } => EventKind::NewMessage,
                AgentFrame::StreamComplete { .. } => EventKind::StreamComplete,
                AgentFrame::Error { .. } => EventKind::Error,
                AgentFrame::FileUpdate { .. } => EventKind::FileUpdate,
                AgentFrame::FileActionBroadcast { .. } => EventKind::FileActionBroadcast,
                AgentFrame::ToolStatusUpdate { .. } => EventKind::ToolStatusUpdate,
                AgentFrame::ToolRequest { .. } => EventKind::ToolRequest,
                AgentFrame::ToolResponse { .. } => EventKind::ToolResponse,
                AgentFrame::Ping { .. } => EventKind::Ping,
                AgentFrame::Pong { .. } => EventKind::Pong,
            },
        }
    }
}

/// Decode one raw frame. Decode failures are isolated per frame.
pub fn decode_frame(raw: &str) -> AgentEvent {
    match serde_json::from_str::<AgentFrame>(raw) {
        Ok(frame) => AgentEvent::Frame(frame),
        Err(e) => {
            let frame_type = serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string));
            warn!(
                component = "dispatcher",
                event = "dispatch.decode_failed",
                frame_type = ?frame_type,
                error = %e,
                payload_bytes = raw.len(),
                "Dropping unparseable frame"
            );
            AgentEvent::Unrecognized {
                frame_type,
                raw: raw.to_string(),
            }
        }
    }
}

/// Fan-out hub for decoded events.
pub struct EventDispatcher {
    any_tx: broadcast::Sender<AgentEvent>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (any_tx, _) = broadcast::channel(1024);
        Self { any_tx }
    }

    /// Decode and publish one raw frame, returning the decoded event to the
    /// caller (the session loop consumes it directly; subscribers observe).
    pub fn ingest(&self, raw: &str) -> AgentEvent {
        let event = decode_frame(raw);
        let _ = self.any_tx.send(event.clone());
        event
    }

    /// Subscribe to every event.
    pub fn subscribe_any(&self) -> broadcast::Receiver<AgentEvent> {
        self.any_tx.subscribe()
    }

    /// Subscribe to a single event kind. A forwarder task filters the any
    /// channel; it exits when either side goes away.
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<AgentEvent> {
        let mut any_rx = self.any_tx.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match any_rx.recv().await {
                    Ok(event) => {
                        if event.kind() == kind && tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            component = "dispatcher",
                            event = "dispatch.subscriber_lagged",
                            kind = ?kind,
                            skipped,
                            "Filtered subscriber lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }
}
