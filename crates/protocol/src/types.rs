//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
    System,
}

/// Connection status as surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Backend processing signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Started,
    Complete,
}

/// Tool call lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ToolStatus {
    fn rank(self) -> u8 {
        match self {
            ToolStatus::Pending => 0,
            ToolStatus::Running => 1,
            ToolStatus::Completed => 2,
            ToolStatus::Failed => 2,
        }
    }

    /// Status transitions are monotonic: pending -> running -> {completed|failed}.
    /// A terminal status never regresses and never flips to the other terminal.
    pub fn can_advance_to(self, next: ToolStatus) -> bool {
        if self == next {
            return false;
        }
        if self.rank() == 2 {
            return false;
        }
        next.rank() > self.rank()
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// A discrete backend-invoked action with its own lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub message_id: Option<String>,
    pub name: String,
    pub status: ToolStatus,
    pub parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A fenced code block attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A unit of conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    /// Unix milliseconds
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_blocks: Vec<CodeBlock>,
}

impl ChatMessage {
    pub fn new(id: String, sender: Sender, content: String, timestamp: u64) -> Self {
        Self {
            id,
            sender,
            content,
            timestamp,
            thinking: None,
            tool_calls: Vec::new(),
            code_blocks: Vec::new(),
        }
    }
}

/// Kind of workspace file entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Folder,
}

/// File mutation verb carried by `file_action_broadcast`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

/// File entry status. In-progress verbs settle into their past-tense
/// terminal form after a bounded delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
}

impl FileStatus {
    /// The resting status this one promotes to once settled.
    pub fn settled(self) -> FileStatus {
        match self {
            FileStatus::Creating => FileStatus::Created,
            FileStatus::Updating => FileStatus::Updated,
            FileStatus::Deleting => FileStatus::Deleted,
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileStatus::Created | FileStatus::Updated | FileStatus::Deleted
        )
    }
}

/// One entry in the workspace's flat file map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub kind: FileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub status: FileStatus,
    /// Unix milliseconds of the last mutation
    pub timestamp: u64,
}

/// Summary of a workspace for list views (HTTP CRUD API shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    #[serde(alias = "workspaceId")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_status_is_monotonic() {
        assert!(ToolStatus::Pending.can_advance_to(ToolStatus::Running));
        assert!(ToolStatus::Pending.can_advance_to(ToolStatus::Completed));
        assert!(ToolStatus::Running.can_advance_to(ToolStatus::Failed));
        assert!(!ToolStatus::Completed.can_advance_to(ToolStatus::Running));
        assert!(!ToolStatus::Completed.can_advance_to(ToolStatus::Failed));
        assert!(!ToolStatus::Failed.can_advance_to(ToolStatus::Completed));
        assert!(!ToolStatus::Running.can_advance_to(ToolStatus::Running));
    }

    #[test]
    fn file_status_settles_to_past_tense() {
        assert_eq!(FileStatus::Creating.settled(), FileStatus::Created);
        assert_eq!(FileStatus::Updating.settled(), FileStatus::Updated);
        assert_eq!(FileStatus::Deleting.settled(), FileStatus::Deleted);
        assert_eq!(FileStatus::Created.settled(), FileStatus::Created);
        assert!(FileStatus::Updated.is_terminal());
        assert!(!FileStatus::Updating.is_terminal());
    }

    #[test]
    fn workspace_summary_accepts_create_response_shape() {
        let json = r#"{"workspaceId":"ws-9","name":"Contact form plugin"}"#;
        let parsed: WorkspaceSummary = serde_json::from_str(json).expect("parse summary");
        assert_eq!(parsed.id, "ws-9");
        assert_eq!(parsed.message_count, 0);
    }
}
