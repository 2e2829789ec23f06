//! Managed-backend client — auth verification and relational reads.
//!
//! The backend owns persistence and authorization: every read below carries
//! the caller's bearer token so the backend's row-level policies decide what
//! comes back. This service never re-implements authorization and never
//! writes through this interface.

pub mod model;
pub mod rest;

pub use model::{Member, MemberRole, Project, ProjectStatus, Task, TaskPriority, TaskStatus, UserIdentity};
pub use rest::RestBackend;

use async_trait::async_trait;

use crate::error::BackendError;

/// Backend-agnostic read interface used by the relay and context assembler.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Resolve a bearer token to a user identity.
    async fn verify_token(&self, token: &str) -> Result<UserIdentity, BackendError>;

    /// Fetch a single project.
    async fn get_project(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<Option<Project>, BackendError>;

    /// All tasks belonging to a project.
    async fn list_project_tasks(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<Vec<Task>, BackendError>;

    /// A project's member roster, profiles joined in.
    async fn list_project_members(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<Vec<Member>, BackendError>;

    /// Up to `limit` projects visible to the caller.
    async fn list_projects(&self, token: &str, limit: usize) -> Result<Vec<Project>, BackendError>;

    /// The caller's open tasks, ascending due date with nulls last,
    /// capped at `limit`.
    async fn list_open_tasks_for(
        &self,
        token: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Task>, BackendError>;

    /// Up to `limit` team members visible to the caller.
    async fn list_team_members(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<Member>, BackendError>;
}
