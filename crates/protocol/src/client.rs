//! Client → Agent frames

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent from the client to the backend agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Append a user message to the conversation
    UserMessage {
        message: String,
        message_id: String,
        workspace_id: String,
    },

    /// Trigger the agent to start working on the latest user input
    QueryAgent {
        query: String,
        workspace_id: String,
    },

    /// Dispatch a tool invocation. The wire discriminator is the historical
    /// `tool_name`, kept for backend compatibility.
    #[serde(rename = "tool_name")]
    ExecuteTool {
        tool_id: String,
        tool_name: String,
        parameters: Value,
    },

    /// Ask the backend for the content of a file it announced without inline
    /// content
    RequestFileContent {
        path: String,
        workspace_id: String,
    },

    /// Keepalive / liveness probe
    Ping {
        operation_id: String,
    },

    /// Reply to a backend-initiated ping
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::ClientFrame;

    #[test]
    fn serializes_user_message() {
        let frame = ClientFrame::UserMessage {
            message: "Create a contact form plugin".to_string(),
            message_id: "msg-1".to_string(),
            workspace_id: "ws-1".to_string(),
        };

        let json = serde_json::to_string(&frame).expect("serialize");
        assert!(json.contains(r#""type":"user_message""#));
        assert!(json.contains(r#""workspace_id":"ws-1""#));

        let reparsed: ClientFrame = serde_json::from_str(&json).expect("reparse");
        match reparsed {
            ClientFrame::UserMessage {
                message,
                message_id,
                workspace_id,
            } => {
                assert_eq!(message, "Create a contact form plugin");
                assert_eq!(message_id, "msg-1");
                assert_eq!(workspace_id, "ws-1");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn execute_tool_uses_historical_discriminator() {
        let frame = ClientFrame::ExecuteTool {
            tool_id: "tool-7".to_string(),
            tool_name: "write_file".to_string(),
            parameters: serde_json::json!({"path": "plugin/main.php"}),
        };

        let json = serde_json::to_string(&frame).expect("serialize");
        assert!(json.contains(r#""type":"tool_name""#));

        let reparsed: ClientFrame = serde_json::from_str(&json).expect("reparse");
        match reparsed {
            ClientFrame::ExecuteTool {
                tool_id, tool_name, ..
            } => {
                assert_eq!(tool_id, "tool-7");
                assert_eq!(tool_name, "write_file");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn roundtrip_ping() {
        let json = r#"{"type":"ping","operation_id":"op-1"}"#;
        let parsed: ClientFrame = serde_json::from_str(json).expect("parse ping");
        match &parsed {
            ClientFrame::Ping { operation_id } => assert_eq!(operation_id, "op-1"),
            other => panic!("unexpected variant: {:?}", other),
        }
        let serialized = serde_json::to_string(&parsed).expect("serialize");
        let _: ClientFrame = serde_json::from_str(&serialized).expect("roundtrip");
    }

    #[test]
    fn roundtrip_request_file_content() {
        let json = r#"{"type":"request_file_content","path":"plugin/readme.txt","workspace_id":"ws-2"}"#;
        let parsed: ClientFrame = serde_json::from_str(json).expect("parse");
        match &parsed {
            ClientFrame::RequestFileContent { path, workspace_id } => {
                assert_eq!(path, "plugin/readme.txt");
                assert_eq!(workspace_id, "ws-2");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
