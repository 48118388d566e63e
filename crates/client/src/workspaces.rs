//! Workspace CRUD API client
//!
//! Thin consumer of the external workspace store: create returns
//! `{workspaceId}`, list/detail return summary objects, history returns the
//! stored conversation. The store itself is out of scope; only its response
//! shapes are fixed here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use pressdock_protocol::{ChatMessage, WorkspaceSummary};

use crate::error::ClientError;

#[derive(Debug, Serialize)]
struct CreateWorkspaceRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Value::is_null")]
    metadata: Value,
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceResponse {
    #[serde(rename = "workspaceId")]
    workspace_id: String,
}

/// HTTP client for the workspace store.
pub struct WorkspaceApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl WorkspaceApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Create a workspace; returns the new workspace id.
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        metadata: Value,
    ) -> Result<String, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/workspaces")
            .json(&CreateWorkspaceRequest {
                name,
                description,
                metadata,
            })
            .send()
            .await?;
        let created: CreateWorkspaceResponse = Self::check(response).await?.json().await?;
        debug!(
            component = "workspaces",
            event = "workspace.created",
            workspace_id = %created.workspace_id,
            "Workspace created"
        );
        Ok(created.workspace_id)
    }

    pub async fn list(&self) -> Result<Vec<WorkspaceSummary>, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/workspaces")
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Fetch the stored conversation history for a workspace.
    pub async fn history(&self, workspace_id: &str) -> Result<Vec<ChatMessage>, ClientError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/workspaces/{workspace_id}/messages"),
            )
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete(&self, workspace_id: &str) -> Result<(), ClientError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/workspaces/{workspace_id}"),
            )
            .send()
            .await?;
        Self::check(response).await?;
        debug!(
            component = "workspaces",
            event = "workspace.deleted",
            workspace_id = %workspace_id,
            "Workspace deleted"
        );
        Ok(())
    }
}
