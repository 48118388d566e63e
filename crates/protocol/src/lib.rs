//! PressDock Protocol
//!
//! Shared types for communication between a PressDock client and the
//! backend agent process. Frames are serialized as JSON over a persistent
//! WebSocket, one connection per workspace id.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::ClientFrame;
pub use server::AgentFrame;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
