//! Agent → Client frames

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{FileAction, FileKind, ProcessingState, Sender, ToolStatus};

/// Frames sent from the backend agent to the client.
///
/// Delivery is at-least-once and fragments may overlap; the session reducer
/// owns deduplication and coalescing. This enum only fixes the wire shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentFrame {
    /// Backend acknowledged the connection for a workspace
    ConnectionEstablished {
        #[serde(skip_serializing_if = "Option::is_none")]
        workspace_id: Option<String>,
    },

    /// Coarse processing signal for the current turn
    ProcessingStatus { status: ProcessingState },

    /// Incremental thinking-trace delta for a message
    ThinkingUpdate { message_id: String, thinking: String },

    /// Incremental answer-text delta. Older backends emit `text_update`.
    #[serde(alias = "text_update")]
    Text {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        content: String,
    },

    /// A complete message (consolidated; may supersede earlier fragments)
    NewMessage {
        message_id: String,
        text: String,
        sender: Sender,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
    },

    /// The active stream finished
    StreamComplete {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Backend-reported error. Older backends emit `ai_error`.
    #[serde(alias = "ai_error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Full or partial content for a single path
    FileUpdate {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<FileKind>,
    },

    /// A file mutation performed by the agent, broadcast to all clients
    FileActionBroadcast {
        action_type: FileAction,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<FileKind>,
    },

    /// Lifecycle update for a tool call
    ToolStatusUpdate {
        tool_id: String,
        status: ToolStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Backend asks the client to run a tool
    ToolRequest {
        tool_id: String,
        tool_name: String,
        parameters: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Correlated response to a dispatched tool
    ToolResponse {
        tool_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
    },

    /// Backend-initiated liveness probe
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
    },

    /// Reply to a client ping
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::AgentFrame;
    use crate::types::{FileAction, ProcessingState, Sender, ToolStatus};

    #[test]
    fn deserializes_new_message() {
        let json = r#"{
          "type":"new_message",
          "message_id":"m2",
          "text":"Done",
          "sender":"assistant",
          "timestamp":1700000000000
        }"#;

        let parsed: AgentFrame = serde_json::from_str(json).expect("parse new_message");
        match parsed {
            AgentFrame::NewMessage {
                message_id,
                text,
                sender,
                timestamp,
                ..
            } => {
                assert_eq!(message_id, "m2");
                assert_eq!(text, "Done");
                assert_eq!(sender, Sender::Assistant);
                assert_eq!(timestamp, Some(1_700_000_000_000));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn text_update_alias_maps_to_text() {
        let json = r#"{"type":"text_update","message_id":"m1","content":"Here is"}"#;
        let parsed: AgentFrame = serde_json::from_str(json).expect("parse text_update");
        match parsed {
            AgentFrame::Text {
                message_id,
                content,
            } => {
                assert_eq!(message_id.as_deref(), Some("m1"));
                assert_eq!(content, "Here is");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn ai_error_alias_maps_to_error() {
        let json = r#"{"type":"ai_error","message":"model overloaded"}"#;
        let parsed: AgentFrame = serde_json::from_str(json).expect("parse ai_error");
        match parsed {
            AgentFrame::Error { message, code } => {
                assert_eq!(message, "model overloaded");
                assert!(code.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn deserializes_file_action_broadcast_delete() {
        let json = r#"{
          "type":"file_action_broadcast",
          "action_type":"delete",
          "path":"plugin/readme.txt"
        }"#;

        let parsed: AgentFrame = serde_json::from_str(json).expect("parse broadcast");
        match parsed {
            AgentFrame::FileActionBroadcast {
                action_type,
                path,
                content,
                ..
            } => {
                assert_eq!(action_type, FileAction::Delete);
                assert_eq!(path, "plugin/readme.txt");
                assert!(content.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn roundtrip_tool_status_update() {
        let json = r#"{
          "type":"tool_status_update",
          "tool_id":"tool-3",
          "status":"running"
        }"#;

        let parsed: AgentFrame = serde_json::from_str(json).expect("parse tool status");
        match &parsed {
            AgentFrame::ToolStatusUpdate { tool_id, status, .. } => {
                assert_eq!(tool_id, "tool-3");
                assert_eq!(*status, ToolStatus::Running);
            }
            other => panic!("unexpected variant: {:?}", other),
        }

        let serialized = serde_json::to_string(&parsed).expect("serialize");
        let _: AgentFrame = serde_json::from_str(&serialized).expect("roundtrip");
    }

    #[test]
    fn roundtrip_processing_status() {
        let json = r#"{"type":"processing_status","status":"complete"}"#;
        let parsed: AgentFrame = serde_json::from_str(json).expect("parse");
        match parsed {
            AgentFrame::ProcessingStatus { status } => {
                assert_eq!(status, ProcessingState::Complete);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let json = r#"{"type":"telemetry_blip","payload":{}}"#;
        assert!(serde_json::from_str::<AgentFrame>(json).is_err());
    }
}
