//! Pure session state transition
//!
//! All business logic for session state changes lives here as a pure,
//! synchronous function: `reduce(state, input, now) -> (state, effects)`.
//! No IO, no async, no locking — fully unit-testable. The rules encode the
//! real backend's delivery quirks: at-least-once frames, occasionally
//! missing ids, and overlapping streamed fragments.

use std::collections::VecDeque;

use serde_json::Value;

use pressdock_protocol::{
    new_id, AgentFrame, ChatMessage, ClientFrame, CodeBlock, ConnectionStatus, FileAction,
    FileKind, FileStatus, ProcessingState, Sender, ToolCall, ToolStatus,
};

use crate::buffers::{StreamingTracker, StreamingView, ThinkingBuffers};
use crate::connection::DEFAULT_OPERATION_TIMEOUT_MS;
use crate::extract;
use crate::files::{FileMap, FileNotification};

/// Messages resent without a stable id are duplicates inside this window.
pub const DEDUP_WINDOW_MS: u64 = 5_000;

/// A consolidated message absorbs same-sender substring fragments received
/// within this trailing window.
pub const FRAGMENT_WINDOW_MS: u64 = 10_000;

/// File statuses settle to their terminal form after this delay, whether or
/// not the backend ever says "done".
pub const FILE_SETTLE_MS: u64 = 1_500;

const INGEST_LOG_CAP: usize = 64;
const ERROR_LOG_CAP: usize = 50;

// ---------------------------------------------------------------------------
// TurnPhase — the overall turn state machine
// ---------------------------------------------------------------------------

/// Idle -> AwaitingAgent -> (Streaming)? -> Idle. Errors reset to Idle
/// without discarding already-finalized messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    AwaitingAgent,
    Streaming,
}

impl TurnPhase {
    pub fn is_processing(self) -> bool {
        matches!(self, TurnPhase::AwaitingAgent | TurnPhase::Streaming)
    }
}

// ---------------------------------------------------------------------------
// Inputs and effects
// ---------------------------------------------------------------------------

/// One step of the state machine: a decoded wire frame, a connection-level
/// signal, a user intent, or an internal timer.
#[derive(Debug, Clone)]
pub enum Input {
    Frame(AgentFrame),
    ConnectionChanged(ConnectionStatus),
    OperationTimedOut { operation_id: String },
    ReconnectFailed,
    WorkspaceBound { workspace_id: String },
    UserMessageSent { message_id: String, content: String },
    ToolInvoked {
        tool_id: String,
        name: String,
        parameters: Value,
    },
    SessionCleared,
    SettleElapsed { path: String },
}

/// IO described by the reducer, executed by the session actor.
#[derive(Debug, Clone)]
pub enum Effect {
    Send(ClientFrame),
    SendTracked {
        frame: ClientFrame,
        operation_id: String,
        timeout_ms: u64,
    },
    ScheduleSettle { path: String, delay_ms: u64 },
    CompleteOperation { operation_id: String },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A backend-reported or connection-level error, post-sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub message: String,
    pub code: Option<String>,
    pub at_ms: u64,
}

#[derive(Debug, Clone)]
struct IngestRecord {
    id: String,
    sender: Sender,
    content: String,
    at_ms: u64,
}

/// The canonical session state, owned exclusively by the session actor.
#[derive(Debug, Default)]
pub struct SessionState {
    pub workspace_id: Option<String>,
    pub connection: ConnectionStatus,
    pub phase: TurnPhase,
    pub messages: Vec<ChatMessage>,
    pub streaming: StreamingTracker,
    pub thinking: ThinkingBuffers,
    pub tool_calls: Vec<ToolCall>,
    pub files: FileMap,
    pub errors: Vec<SessionError>,
    ingest_log: VecDeque<IngestRecord>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            thinking: ThinkingBuffers::new(),
            ..Default::default()
        }
    }

    pub fn is_processing(&self) -> bool {
        self.phase.is_processing()
    }

    /// Build the immutable snapshot handed to readers.
    pub fn snapshot(&self, revision: u64) -> SessionSnapshot {
        SessionSnapshot {
            workspace_id: self.workspace_id.clone(),
            revision,
            connection: self.connection,
            is_processing: self.is_processing(),
            messages: self.messages.clone(),
            streaming: self.streaming.view(),
            thinking: self.thinking.to_map(),
            tool_calls: self.tool_calls.clone(),
            files: self.files.entries().cloned().collect(),
            notifications: self.files.notifications().cloned().collect(),
            errors: self.errors.clone(),
        }
    }
}

/// Read-only view of the canonical session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub workspace_id: Option<String>,
    pub revision: u64,
    pub connection: ConnectionStatus,
    pub is_processing: bool,
    pub messages: Vec<ChatMessage>,
    pub streaming: StreamingView,
    pub thinking: std::collections::HashMap<String, String>,
    pub tool_calls: Vec<ToolCall>,
    pub files: Vec<pressdock_protocol::FileEntry>,
    pub notifications: Vec<FileNotification>,
    pub errors: Vec<SessionError>,
}

// ---------------------------------------------------------------------------
// reduce() — the pure core
// ---------------------------------------------------------------------------

/// Pure, synchronous state transition. Given the current state and one
/// input, returns the new state and the effects to execute.
pub fn reduce(mut state: SessionState, input: Input, now_ms: u64) -> (SessionState, Vec<Effect>) {
    let mut effects: Vec<Effect> = Vec::new();

    match input {
        Input::Frame(frame) => reduce_frame(&mut state, frame, now_ms, &mut effects),

        Input::ConnectionChanged(status) => {
            state.connection = status;
        }

        Input::OperationTimedOut { operation_id } => {
            push_error(
                &mut state,
                SessionError {
                    message: format!("Operation timed out: {operation_id}"),
                    code: Some("operation_timeout".to_string()),
                    at_ms: now_ms,
                },
            );
        }

        Input::ReconnectFailed => {
            state.connection = ConnectionStatus::Error;
            state.streaming.clear();
            state.phase = TurnPhase::Idle;
            push_error(
                &mut state,
                SessionError {
                    message: "Connection lost and could not be restored. Retry or reload to continue."
                        .to_string(),
                    code: Some("reconnect_failed".to_string()),
                    at_ms: now_ms,
                },
            );
        }

        Input::WorkspaceBound { workspace_id } => {
            state.workspace_id = Some(workspace_id);
        }

        Input::UserMessageSent {
            message_id,
            content,
        } => {
            // typing ahead must not discard a partial answer
            if state.streaming.is_streaming() {
                finalize_stream(&mut state, now_ms, &mut effects);
            }

            let message = ChatMessage::new(
                message_id.clone(),
                Sender::User,
                content.clone(),
                now_ms,
            );
            ingest_complete_message(&mut state, message, now_ms, &mut effects);
            state.phase = TurnPhase::AwaitingAgent;

            let workspace_id = state.workspace_id.clone().unwrap_or_default();
            effects.push(Effect::Send(ClientFrame::UserMessage {
                message: content.clone(),
                message_id,
                workspace_id: workspace_id.clone(),
            }));
            effects.push(Effect::Send(ClientFrame::QueryAgent {
                query: content,
                workspace_id,
            }));
        }

        Input::ToolInvoked {
            tool_id,
            name,
            parameters,
        } => {
            if !state.tool_calls.iter().any(|t| t.id == tool_id) {
                state.tool_calls.push(ToolCall {
                    id: tool_id.clone(),
                    message_id: None,
                    name: name.clone(),
                    status: ToolStatus::Pending,
                    parameters: parameters.clone(),
                    result: None,
                    error: None,
                });
            }
            effects.push(Effect::SendTracked {
                frame: ClientFrame::ExecuteTool {
                    tool_id: tool_id.clone(),
                    tool_name: name,
                    parameters,
                },
                operation_id: tool_id,
                timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            });
        }

        Input::SessionCleared => {
            state.messages.clear();
            state.streaming.clear();
            state.thinking.clear_all();
            state.tool_calls.clear();
            state.files.clear();
            state.errors.clear();
            state.ingest_log.clear();
            state.phase = TurnPhase::Idle;
        }

        Input::SettleElapsed { path } => {
            state.files.settle(&path, now_ms);
        }
    }

    (state, effects)
}

fn reduce_frame(
    state: &mut SessionState,
    frame: AgentFrame,
    now_ms: u64,
    effects: &mut Vec<Effect>,
) {
    match frame {
        AgentFrame::ConnectionEstablished { workspace_id } => {
            if state.workspace_id.is_none() {
                state.workspace_id = workspace_id;
            }
        }

        AgentFrame::ProcessingStatus { status } => match status {
            ProcessingState::Started => {
                if state.phase == TurnPhase::Idle {
                    state.phase = TurnPhase::AwaitingAgent;
                }
            }
            ProcessingState::Complete => {
                state.phase = TurnPhase::Idle;
            }
        },

        AgentFrame::ThinkingUpdate {
            message_id,
            thinking,
        } => {
            state.thinking.append(&message_id, &thinking);
        }

        AgentFrame::Text {
            message_id,
            content,
        } => {
            // a chunk for a different message id starts a new turn; the
            // current stream is materialized first so nothing is lost
            let switches_message = match (state.streaming.message_id(), message_id.as_deref()) {
                (Some(active), Some(incoming)) => {
                    state.streaming.is_streaming() && active != incoming
                }
                _ => false,
            };
            if switches_message {
                finalize_stream(state, now_ms, effects);
            }

            state.streaming.push(message_id.as_deref(), &content, now_ms);
            state.phase = TurnPhase::Streaming;
        }

        AgentFrame::NewMessage {
            message_id,
            text,
            sender,
            timestamp,
            thinking,
        } => {
            let thinking =
                thinking.or_else(|| state.thinking.get(&message_id).map(str::to_string));
            let message = ChatMessage {
                id: message_id,
                sender,
                content: text,
                timestamp: timestamp.unwrap_or(now_ms),
                thinking,
                tool_calls: Vec::new(),
                code_blocks: Vec::new(),
            };
            ingest_complete_message(state, message, now_ms, effects);
        }

        AgentFrame::StreamComplete { message_id: _ } => {
            if state.streaming.is_streaming() {
                finalize_stream(state, now_ms, effects);
            } else {
                state.streaming.clear();
            }
            state.phase = TurnPhase::Idle;
        }

        AgentFrame::Error { message, code } => {
            let sanitized = sanitize_error(&message);
            push_error(
                state,
                SessionError {
                    message: sanitized.clone(),
                    code,
                    at_ms: now_ms,
                },
            );
            // errors clear in-flight streaming and force processing off
            state.streaming.clear();
            state.phase = TurnPhase::Idle;

            let message = ChatMessage::new(new_id(), Sender::System, sanitized, now_ms);
            ingest_complete_message(state, message, now_ms, effects);
        }

        AgentFrame::FileUpdate {
            path,
            content,
            kind,
        } => {
            let kind = kind.unwrap_or(FileKind::File);
            let exists = state.files.contains(&path);
            let status = if exists {
                FileStatus::Updating
            } else {
                FileStatus::Creating
            };
            let had_content = state
                .files
                .get(&path)
                .map(|e| e.content.is_some())
                .unwrap_or(false);
            let needs_fetch = content.is_none() && kind == FileKind::File && !had_content;

            state.files.upsert(&path, kind, content, status, now_ms);
            effects.push(Effect::ScheduleSettle {
                path: path.clone(),
                delay_ms: FILE_SETTLE_MS,
            });
            if needs_fetch {
                effects.push(Effect::Send(ClientFrame::RequestFileContent {
                    path,
                    workspace_id: state.workspace_id.clone().unwrap_or_default(),
                }));
            }
        }

        AgentFrame::FileActionBroadcast {
            action_type,
            path,
            content,
            kind,
        } => match action_type {
            FileAction::Delete => {
                // unknown paths are a no-op, never an error
                state.files.remove(&path, now_ms);
            }
            FileAction::Create | FileAction::Update => {
                let kind = kind.unwrap_or(FileKind::File);
                let status = match action_type {
                    FileAction::Create => FileStatus::Creating,
                    _ => FileStatus::Updating,
                };
                let needs_fetch = content.is_none() && kind == FileKind::File;

                state.files.upsert(&path, kind, content, status, now_ms);
                effects.push(Effect::ScheduleSettle {
                    path: path.clone(),
                    delay_ms: FILE_SETTLE_MS,
                });
                if needs_fetch {
                    effects.push(Effect::Send(ClientFrame::RequestFileContent {
                        path,
                        workspace_id: state.workspace_id.clone().unwrap_or_default(),
                    }));
                }
            }
        },

        AgentFrame::ToolStatusUpdate {
            tool_id,
            status,
            result,
            error,
        } => {
            // id match only; unknown ids tolerate duplicate/late delivery
            if let Some(tool) = state.tool_calls.iter_mut().find(|t| t.id == tool_id) {
                if tool.status.can_advance_to(status) {
                    tool.status = status;
                    if result.is_some() {
                        tool.result = result;
                    }
                    if error.is_some() {
                        tool.error = error;
                    }
                }
            }
        }

        AgentFrame::ToolRequest {
            tool_id,
            tool_name,
            parameters,
            message_id,
        } => {
            if !state.tool_calls.iter().any(|t| t.id == tool_id) {
                state.tool_calls.push(ToolCall {
                    id: tool_id,
                    message_id,
                    name: tool_name,
                    status: ToolStatus::Pending,
                    parameters,
                    result: None,
                    error: None,
                });
            }
        }

        AgentFrame::ToolResponse {
            tool_id,
            result,
            error,
            operation_id,
        } => {
            effects.push(Effect::CompleteOperation {
                operation_id: operation_id.unwrap_or_else(|| tool_id.clone()),
            });
            if let Some(tool) = state.tool_calls.iter_mut().find(|t| t.id == tool_id) {
                let next = if error.is_some() {
                    ToolStatus::Failed
                } else {
                    ToolStatus::Completed
                };
                if tool.status.can_advance_to(next) {
                    tool.status = next;
                    tool.result = result;
                    tool.error = error;
                }
            }
        }

        AgentFrame::Ping { operation_id } => {
            effects.push(Effect::Send(ClientFrame::Pong { operation_id }));
        }

        AgentFrame::Pong { operation_id } => {
            if let Some(operation_id) = operation_id {
                effects.push(Effect::CompleteOperation { operation_id });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Materialize the active stream into a permanent assistant message.
fn finalize_stream(state: &mut SessionState, now_ms: u64, effects: &mut Vec<Effect>) {
    if !state.streaming.is_streaming() {
        state.streaming.clear();
        return;
    }

    let message_id = state
        .streaming
        .message_id()
        .map(str::to_string)
        .unwrap_or_else(new_id);
    let content = state.streaming.content().to_string();
    state.streaming.clear();

    let thinking = state.thinking.get(&message_id).map(str::to_string);
    let message = ChatMessage {
        id: message_id,
        sender: Sender::Assistant,
        content,
        timestamp: now_ms,
        thinking,
        tool_calls: Vec::new(),
        code_blocks: Vec::new(),
    };
    ingest_complete_message(state, message, now_ms, effects);
}

/// Append a complete message, applying the dedup and fragment-suppression
/// rules. Returns false when the message was dropped as a duplicate.
fn ingest_complete_message(
    state: &mut SessionState,
    mut message: ChatMessage,
    now_ms: u64,
    effects: &mut Vec<Effect>,
) -> bool {
    if state.messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    let resent_without_id = state.ingest_log.iter().rev().any(|rec| {
        rec.sender == message.sender
            && rec.content == message.content
            && now_ms.saturating_sub(rec.at_ms) <= DEDUP_WINDOW_MS
    });
    if resent_without_id {
        return false;
    }

    suppress_fragments(state, &message, now_ms);

    // a consolidated form supersedes the stream it grew from
    if state.streaming.message_id() == Some(message.id.as_str()) {
        state.streaming.clear();
    }

    if message.sender == Sender::Assistant {
        apply_extraction(state, &mut message, now_ms, effects);
        // a complete assistant message implicitly ends the turn
        state.phase = TurnPhase::Idle;
    }

    message.tool_calls = state
        .tool_calls
        .iter()
        .filter(|t| t.message_id.as_deref() == Some(message.id.as_str()))
        .map(|t| t.id.clone())
        .collect();

    state.ingest_log.push_back(IngestRecord {
        id: message.id.clone(),
        sender: message.sender,
        content: message.content.clone(),
        at_ms: now_ms,
    });
    while state.ingest_log.len() > INGEST_LOG_CAP {
        state.ingest_log.pop_front();
    }

    state.messages.push(message);
    true
}

/// Remove same-sender messages received within the trailing window whose
/// content the consolidated message contains — transient streaming fragments
/// superseded by the final text.
fn suppress_fragments(state: &mut SessionState, incoming: &ChatMessage, now_ms: u64) {
    let superseded: Vec<String> = state
        .messages
        .iter()
        .filter(|existing| {
            existing.sender == incoming.sender
                && existing.id != incoming.id
                && !existing.content.is_empty()
                && incoming.content.contains(&existing.content)
        })
        .filter(|existing| {
            state
                .ingest_log
                .iter()
                .rev()
                .find(|rec| rec.id == existing.id)
                .map(|rec| now_ms.saturating_sub(rec.at_ms) <= FRAGMENT_WINDOW_MS)
                .unwrap_or(false)
        })
        .map(|existing| existing.id.clone())
        .collect();

    if !superseded.is_empty() {
        state.messages.retain(|m| !superseded.contains(&m.id));
    }
}

/// Pull embedded files out of assistant prose and feed them through the
/// same lifecycle as wire-driven file actions.
fn apply_extraction(
    state: &mut SessionState,
    message: &mut ChatMessage,
    now_ms: u64,
    effects: &mut Vec<Effect>,
) {
    let extracted = extract::extract_files(&message.content);
    if extracted.is_empty() {
        return;
    }

    let workspace_id = state.workspace_id.clone().unwrap_or_default();
    for file in extracted {
        if let Some(content) = file.content.as_ref() {
            message.code_blocks.push(CodeBlock {
                language: extract::language_for_path(&file.path).map(str::to_string),
                content: content.clone(),
                path: Some(file.path.clone()),
            });
        }

        let status = if state.files.contains(&file.path) {
            FileStatus::Updating
        } else {
            FileStatus::Creating
        };
        let needs_fetch = file.content.is_none() && file.kind == FileKind::File;

        state
            .files
            .upsert(&file.path, file.kind, file.content, status, now_ms);
        effects.push(Effect::ScheduleSettle {
            path: file.path.clone(),
            delay_ms: FILE_SETTLE_MS,
        });
        if needs_fetch {
            effects.push(Effect::Send(ClientFrame::RequestFileContent {
                path: file.path,
                workspace_id: workspace_id.clone(),
            }));
        }
    }
}

fn push_error(state: &mut SessionState, error: SessionError) {
    state.errors.push(error);
    while state.errors.len() > ERROR_LOG_CAP {
        state.errors.remove(0);
    }
}

const SENSITIVE_HINTS: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "token",
    "secret",
    "credential",
    "password",
];

/// Backend errors mentioning credentials are rewritten to a generic message
/// before they become user-visible.
fn sanitize_error(message: &str) -> String {
    let lower = message.to_lowercase();
    if SENSITIVE_HINTS.iter().any(|hint| lower.contains(hint)) {
        "The agent hit a configuration problem on the server. Check the workspace's service credentials and try again."
            .to_string()
    } else {
        message.to_string()
    }
}
