//! Error taxonomy for the client runtime

use thiserror::Error;

/// Errors surfaced by the PressDock client.
///
/// `Clone` is required because a connect failure may have to be delivered to
/// several concurrent callers waiting on the same in-flight attempt.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("invalid workspace id: {0:?}")]
    InvalidWorkspaceId(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("connect superseded by a connect to another workspace")]
    Superseded,

    #[error("connection manager stopped")]
    ManagerStopped,

    #[error("workspace API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Json(err.to_string())
    }
}
