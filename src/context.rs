//! Context assembly — bounded snapshots of project/task/team state.
//!
//! Every chat request gets a fresh, read-only snapshot of whatever the
//! caller is allowed to see, shaped for injection into the assistant's
//! system prompt. Nothing here is cached or persisted; a snapshot lives
//! exactly as long as the request that asked for it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::{Backend, Member, ProjectStatus, Task, TaskPriority, TaskStatus, UserIdentity};
use crate::error::BackendError;

/// Most-recent tasks included in a project snapshot.
const MAX_RECENT_TASKS: usize = 10;
/// Projects listed in a workspace snapshot.
const MAX_PROJECTS: usize = 10;
/// Caller's own open tasks in a workspace snapshot.
const MAX_OWN_TASKS: usize = 10;
/// Team members listed in a workspace snapshot.
const MAX_TEAM_MEMBERS: usize = 20;

/// Display name used when a task has no resolvable assignee.
const UNASSIGNED: &str = "Unassigned";

/// Task-count aggregates for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    /// Past due date and not done.
    pub overdue: usize,
}

/// One task, trimmed to the fields worth showing the model.
#[derive(Debug, Clone, Serialize)]
pub struct TaskBrief {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub assignee: String,
}

/// Project attributes included in a project snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectBrief {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

/// Snapshot scoped to a single project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectContextSnapshot {
    pub project: ProjectBrief,
    pub task_counts: TaskCounts,
    /// The 10 most recently created tasks.
    pub recent_tasks: Vec<TaskBrief>,
    /// Open-task count per member display name.
    pub workload: BTreeMap<String, usize>,
}

/// One project line in a workspace snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectListItem {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
}

/// Snapshot of the caller's whole workspace, used when no project is
/// selected.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceContextSnapshot {
    pub projects: Vec<ProjectListItem>,
    /// The caller's open tasks, ascending due date, nulls last.
    pub my_tasks: Vec<TaskBrief>,
    pub team: Vec<String>,
}

/// Either scope, ready to serialize into the prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ContextSnapshot {
    Project(ProjectContextSnapshot),
    Workspace(WorkspaceContextSnapshot),
}

/// Assembles context snapshots from backend reads.
///
/// All reads carry the caller's token; row-level policies on the backend do
/// the scoping. Any read failure fails the whole assembly — a partially
/// populated snapshot would silently misinform the model.
pub struct ContextAssembler {
    backend: Arc<dyn Backend>,
}

impl ContextAssembler {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Build a snapshot for the caller, project-scoped when `project_id`
    /// is given.
    pub async fn assemble(
        &self,
        token: &str,
        caller: &UserIdentity,
        project_id: Option<&str>,
    ) -> Result<ContextSnapshot, BackendError> {
        match project_id {
            Some(id) => Ok(ContextSnapshot::Project(
                self.assemble_project(token, id).await?,
            )),
            None => Ok(ContextSnapshot::Workspace(
                self.assemble_workspace(token, caller).await?,
            )),
        }
    }

    async fn assemble_project(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<ProjectContextSnapshot, BackendError> {
        let project = self
            .backend
            .get_project(token, project_id)
            .await?
            .ok_or_else(|| BackendError::ProjectNotFound(project_id.to_string()))?;
        let tasks = self.backend.list_project_tasks(token, project_id).await?;
        let members = self.backend.list_project_members(token, project_id).await?;

        let now = Utc::now();
        let task_counts = count_tasks(&tasks, now);
        let workload = member_workload(&tasks, &members);
        let recent_tasks = recent_tasks(&tasks, &members, MAX_RECENT_TASKS);

        Ok(ProjectContextSnapshot {
            project: ProjectBrief {
                id: project.id,
                name: project.name,
                description: project.description,
                status: project.status,
                start_date: project.start_date,
                end_date: project.end_date,
            },
            task_counts,
            recent_tasks,
            workload,
        })
    }

    async fn assemble_workspace(
        &self,
        token: &str,
        caller: &UserIdentity,
    ) -> Result<WorkspaceContextSnapshot, BackendError> {
        let projects = self.backend.list_projects(token, MAX_PROJECTS).await?;
        let own_tasks = self
            .backend
            .list_open_tasks_for(token, &caller.id, MAX_OWN_TASKS)
            .await?;
        let team = self
            .backend
            .list_team_members(token, MAX_TEAM_MEMBERS)
            .await?;

        let caller_name = caller.email.clone().unwrap_or_else(|| caller.id.clone());

        Ok(WorkspaceContextSnapshot {
            projects: projects
                .into_iter()
                .take(MAX_PROJECTS)
                .map(|p| ProjectListItem {
                    id: p.id,
                    name: p.name,
                    status: p.status,
                })
                .collect(),
            my_tasks: own_tasks
                .into_iter()
                .take(MAX_OWN_TASKS)
                .map(|t| {
                    let due = t.due_date;
                    TaskBrief {
                        id: t.id,
                        title: t.title,
                        status: t.status,
                        priority: t.priority,
                        due_date: due,
                        assignee: caller_name.clone(),
                    }
                })
                .collect(),
            team: team
                .iter()
                .take(MAX_TEAM_MEMBERS)
                .map(|m| m.display_name().to_string())
                .collect(),
        })
    }
}

/// Aggregate counts by status, plus overdue.
fn count_tasks(tasks: &[Task], now: DateTime<Utc>) -> TaskCounts {
    let mut counts = TaskCounts {
        total: tasks.len(),
        ..TaskCounts::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::Todo => counts.todo += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::Done => counts.done += 1,
        }
        if task.is_overdue(now) {
            counts.overdue += 1;
        }
    }
    counts
}

/// Open-task count per member display name. Members with no open tasks
/// still appear with a zero so the model sees who has spare capacity.
fn member_workload(tasks: &[Task], members: &[Member]) -> BTreeMap<String, usize> {
    let mut workload: BTreeMap<String, usize> = members
        .iter()
        .map(|m| (m.display_name().to_string(), 0))
        .collect();

    for task in tasks.iter().filter(|t| t.is_open()) {
        let name = task
            .assignee_id
            .as_deref()
            .and_then(|id| members.iter().find(|m| m.user_id == id))
            .map(|m| m.display_name().to_string());
        if let Some(name) = name {
            *workload.entry(name).or_insert(0) += 1;
        }
    }
    workload
}

/// The `limit` most recently created tasks, assignees resolved to display
/// names.
fn recent_tasks(tasks: &[Task], members: &[Member], limit: usize) -> Vec<TaskBrief> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    sorted
        .into_iter()
        .take(limit)
        .map(|t| TaskBrief {
            id: t.id.clone(),
            title: t.title.clone(),
            status: t.status,
            priority: t.priority,
            due_date: t.due_date,
            assignee: resolve_assignee(t, members),
        })
        .collect()
}

fn resolve_assignee(task: &Task, members: &[Member]) -> String {
    task.assignee_id
        .as_deref()
        .and_then(|id| members.iter().find(|m| m.user_id == id))
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| UNASSIGNED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;

    use crate::backend::{MemberRole, Project};

    /// In-memory backend for assembler tests.
    #[derive(Default)]
    struct MockBackend {
        project: Option<Project>,
        tasks: Vec<Task>,
        members: Vec<Member>,
        projects: Vec<Project>,
        own_tasks: Vec<Task>,
        team: Vec<Member>,
        fail_tasks: bool,
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn verify_token(&self, _token: &str) -> Result<UserIdentity, BackendError> {
            Ok(UserIdentity {
                id: "u1".into(),
                email: Some("me@example.com".into()),
            })
        }

        async fn get_project(
            &self,
            _token: &str,
            _project_id: &str,
        ) -> Result<Option<Project>, BackendError> {
            Ok(self.project.clone())
        }

        async fn list_project_tasks(
            &self,
            _token: &str,
            _project_id: &str,
        ) -> Result<Vec<Task>, BackendError> {
            if self.fail_tasks {
                return Err(BackendError::Http("boom".into()));
            }
            Ok(self.tasks.clone())
        }

        async fn list_project_members(
            &self,
            _token: &str,
            _project_id: &str,
        ) -> Result<Vec<Member>, BackendError> {
            Ok(self.members.clone())
        }

        async fn list_projects(
            &self,
            _token: &str,
            limit: usize,
        ) -> Result<Vec<Project>, BackendError> {
            Ok(self.projects.iter().take(limit).cloned().collect())
        }

        async fn list_open_tasks_for(
            &self,
            _token: &str,
            _user_id: &str,
            limit: usize,
        ) -> Result<Vec<Task>, BackendError> {
            Ok(self.own_tasks.iter().take(limit).cloned().collect())
        }

        async fn list_team_members(
            &self,
            _token: &str,
            limit: usize,
        ) -> Result<Vec<Member>, BackendError> {
            Ok(self.team.iter().take(limit).cloned().collect())
        }
    }

    fn caller() -> UserIdentity {
        UserIdentity {
            id: "u1".into(),
            email: Some("me@example.com".into()),
        }
    }

    fn project(id: &str) -> Project {
        Project {
            id: id.into(),
            name: format!("Project {id}"),
            description: None,
            status: ProjectStatus::Active,
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
        }
    }

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.into(),
            project_id: "p1".into(),
            title: format!("Task {id}"),
            status,
            priority: TaskPriority::Medium,
            due_date: None,
            assignee_id: None,
            created_at: Utc::now(),
        }
    }

    fn member(user_id: &str, name: Option<&str>, email: &str) -> Member {
        Member {
            user_id: user_id.into(),
            role: MemberRole::Member,
            full_name: name.map(String::from),
            email: email.into(),
        }
    }

    async fn assemble_project(backend: MockBackend) -> ProjectContextSnapshot {
        let assembler = ContextAssembler::new(Arc::new(backend));
        match assembler.assemble("tok", &caller(), Some("p1")).await.unwrap() {
            ContextSnapshot::Project(snap) => snap,
            ContextSnapshot::Workspace(_) => panic!("expected project snapshot"),
        }
    }

    #[tokio::test]
    async fn overdue_counts_past_due_open_tasks_only() {
        let yesterday = Utc::now() - Duration::days(1);
        let mut overdue_todo = task("t1", TaskStatus::Todo);
        overdue_todo.due_date = Some(yesterday);
        let mut done_yesterday = task("t2", TaskStatus::Done);
        done_yesterday.due_date = Some(yesterday);

        let snap = assemble_project(MockBackend {
            project: Some(project("p1")),
            tasks: vec![overdue_todo, done_yesterday],
            ..Default::default()
        })
        .await;

        assert_eq!(snap.task_counts.total, 2);
        assert_eq!(snap.task_counts.todo, 1);
        assert_eq!(snap.task_counts.done, 1);
        assert_eq!(snap.task_counts.overdue, 1);
    }

    #[tokio::test]
    async fn recent_tasks_truncated_to_ten_newest() {
        let base = Utc::now();
        let tasks: Vec<Task> = (0..15)
            .map(|i| {
                let mut t = task(&format!("t{i}"), TaskStatus::Todo);
                t.created_at = base + Duration::minutes(i);
                t
            })
            .collect();

        let snap = assemble_project(MockBackend {
            project: Some(project("p1")),
            tasks,
            ..Default::default()
        })
        .await;

        assert_eq!(snap.recent_tasks.len(), 10);
        // Newest first.
        assert_eq!(snap.recent_tasks[0].id, "t14");
        assert_eq!(snap.recent_tasks[9].id, "t5");
        assert_eq!(snap.task_counts.total, 15);
    }

    #[tokio::test]
    async fn assignee_resolution_falls_back_to_email_then_unassigned() {
        let mut named = task("t1", TaskStatus::Todo);
        named.assignee_id = Some("u1".into());
        let mut email_only = task("t2", TaskStatus::Todo);
        email_only.assignee_id = Some("u2".into());
        let unassigned = task("t3", TaskStatus::Todo);
        let mut unknown = task("t4", TaskStatus::Todo);
        unknown.assignee_id = Some("ghost".into());

        let snap = assemble_project(MockBackend {
            project: Some(project("p1")),
            tasks: vec![named, email_only, unassigned, unknown],
            members: vec![
                member("u1", Some("Ada Lovelace"), "ada@example.com"),
                member("u2", None, "bob@example.com"),
            ],
            ..Default::default()
        })
        .await;

        let by_id: BTreeMap<&str, &str> = snap
            .recent_tasks
            .iter()
            .map(|t| (t.id.as_str(), t.assignee.as_str()))
            .collect();
        assert_eq!(by_id["t1"], "Ada Lovelace");
        assert_eq!(by_id["t2"], "bob@example.com");
        assert_eq!(by_id["t3"], "Unassigned");
        assert_eq!(by_id["t4"], "Unassigned");
    }

    #[tokio::test]
    async fn workload_counts_open_tasks_per_member() {
        let mut t1 = task("t1", TaskStatus::Todo);
        t1.assignee_id = Some("u1".into());
        let mut t2 = task("t2", TaskStatus::InProgress);
        t2.assignee_id = Some("u1".into());
        let mut closed = task("t3", TaskStatus::Done);
        closed.assignee_id = Some("u1".into());

        let snap = assemble_project(MockBackend {
            project: Some(project("p1")),
            tasks: vec![t1, t2, closed],
            members: vec![
                member("u1", Some("Ada Lovelace"), "ada@example.com"),
                member("u2", Some("Grace Hopper"), "grace@example.com"),
            ],
            ..Default::default()
        })
        .await;

        assert_eq!(snap.workload["Ada Lovelace"], 2);
        assert_eq!(snap.workload["Grace Hopper"], 0);
    }

    #[tokio::test]
    async fn missing_project_is_an_assembly_failure() {
        let assembler = ContextAssembler::new(Arc::new(MockBackend::default()));
        let err = assembler
            .assemble("tok", &caller(), Some("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn read_failure_is_fatal_not_partial() {
        let assembler = ContextAssembler::new(Arc::new(MockBackend {
            project: Some(project("p1")),
            fail_tasks: true,
            ..Default::default()
        }));
        let err = assembler
            .assemble("tok", &caller(), Some("p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Http(_)));
    }

    #[tokio::test]
    async fn workspace_snapshot_respects_limits() {
        let projects: Vec<Project> = (0..15).map(|i| project(&format!("p{i}"))).collect();
        let own_tasks: Vec<Task> = (0..15)
            .map(|i| task(&format!("t{i}"), TaskStatus::Todo))
            .collect();
        let team: Vec<Member> = (0..25)
            .map(|i| member(&format!("u{i}"), None, &format!("user{i}@example.com")))
            .collect();

        let assembler = ContextAssembler::new(Arc::new(MockBackend {
            projects,
            own_tasks,
            team,
            ..Default::default()
        }));
        let snap = match assembler.assemble("tok", &caller(), None).await.unwrap() {
            ContextSnapshot::Workspace(snap) => snap,
            ContextSnapshot::Project(_) => panic!("expected workspace snapshot"),
        };

        assert_eq!(snap.projects.len(), 10);
        assert_eq!(snap.my_tasks.len(), 10);
        assert_eq!(snap.team.len(), 20);
    }

    #[test]
    fn snapshot_serializes_as_plain_nested_mapping() {
        let snap = ContextSnapshot::Workspace(WorkspaceContextSnapshot {
            projects: vec![ProjectListItem {
                id: "p1".into(),
                name: "Launch".into(),
                status: ProjectStatus::Active,
            }],
            my_tasks: vec![],
            team: vec!["Ada Lovelace".into()],
        });
        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["projects"][0]["status"], "active");
        assert_eq!(value["team"][0], "Ada Lovelace");
    }
}
