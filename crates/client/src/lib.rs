//! PressDock client core
//!
//! The real-time session-state reconciliation layer of the PressDock agent
//! workspace: a connection manager with bounded reconnect, a typed event
//! dispatcher, streaming buffers, and the pure session reducer that folds
//! an at-least-once event stream into one canonical snapshot of the
//! conversation and workspace file state.

pub mod buffers;
pub mod cache;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod files;
pub mod logging;
pub mod preview;
pub mod reducer;
pub mod session;
pub mod workspaces;

pub use connection::{BackoffPolicy, ConnectionConfig, ConnectionEvent, ConnectionManager};
pub use dispatcher::{AgentEvent, EventDispatcher, EventKind};
pub use error::ClientError;
pub use reducer::{Effect, Input, SessionSnapshot, SessionState};
pub use session::{SessionClient, SessionEvent};
pub use workspaces::WorkspaceApi;

/// Current time as unix milliseconds.
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
