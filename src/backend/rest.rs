//! REST client for the hosted backend.
//!
//! Speaks the backend's two public surfaces: the auth endpoint that resolves
//! bearer tokens to identities, and the relational REST API with PostgREST
//! filter syntax. The caller's token rides on every read so row-level
//! policies apply server-side.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::model::{Member, Project, Task, UserIdentity};
use super::Backend;
use crate::error::BackendError;

/// Request timeout for backend reads. Context assembly is on the chat
/// critical path, so a slow backend should fail the request, not hang it.
const BACKEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Backend client over the hosted REST + auth API.
pub struct RestBackend {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(BACKEND_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn rest_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{table}?{query}", self.base_url)
    }

    /// GET a REST endpoint and decode the JSON array it returns.
    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        token: &str,
        url: String,
    ) -> Result<Vec<T>, BackendError> {
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("apikey", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, url = %url, body = %body, "Backend read failed");
            return Err(BackendError::Http(format!("{url} returned {status}")));
        }

        resp.json::<Vec<T>>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn verify_token(&self, token: &str) -> Result<UserIdentity, BackendError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("apikey", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(BackendError::AuthRejected);
        }
        if !resp.status().is_success() {
            return Err(BackendError::Http(format!(
                "auth endpoint returned {}",
                resp.status()
            )));
        }

        resp.json::<UserIdentity>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn get_project(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<Option<Project>, BackendError> {
        let url = self.rest_url("projects", &format!("id=eq.{project_id}&select=*&limit=1"));
        let mut rows: Vec<Project> = self.fetch_rows(token, url).await?;
        Ok(rows.pop())
    }

    async fn list_project_tasks(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<Vec<Task>, BackendError> {
        let url = self.rest_url("tasks", &format!("project_id=eq.{project_id}&select=*"));
        self.fetch_rows(token, url).await
    }

    async fn list_project_members(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<Vec<Member>, BackendError> {
        let url = self.rest_url(
            "project_members",
            &format!("project_id=eq.{project_id}&select=user_id,role,full_name,email"),
        );
        self.fetch_rows(token, url).await
    }

    async fn list_projects(&self, token: &str, limit: usize) -> Result<Vec<Project>, BackendError> {
        let url = self.rest_url(
            "projects",
            &format!("select=*&order=created_at.desc&limit={limit}"),
        );
        self.fetch_rows(token, url).await
    }

    async fn list_open_tasks_for(
        &self,
        token: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Task>, BackendError> {
        let url = self.rest_url(
            "tasks",
            &format!(
                "assignee_id=eq.{user_id}&status=neq.done&select=*\
                 &order=due_date.asc.nullslast&limit={limit}"
            ),
        );
        self.fetch_rows(token, url).await
    }

    async fn list_team_members(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<Member>, BackendError> {
        let url = self.rest_url(
            "team_members",
            &format!("select=user_id,role,full_name,email&limit={limit}"),
        );
        self.fetch_rows(token, url).await
    }
}
