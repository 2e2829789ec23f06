//! System instructions for the project assistant.

use crate::context::ContextSnapshot;

/// Base instructions sent as the system message on every chat request.
pub const SYSTEM_PROMPT: &str = "\
You are a project-management assistant embedded in a team workspace. \
Answer questions about projects, tasks, deadlines, and team workload using \
the workspace context provided below. Be concise and concrete: reference \
task titles, due dates, and assignees by name. If the context does not \
contain the answer, say so instead of guessing. Never invent projects, \
tasks, or people.";

/// Compose the full system message: instructions plus the context snapshot
/// as a fenced JSON block.
pub fn compose(snapshot: &ContextSnapshot) -> String {
    // Snapshots are plain serializable data; to_string cannot fail on them.
    let context = serde_json::to_string_pretty(snapshot).unwrap_or_default();
    format!("{SYSTEM_PROMPT}\n\n## Current workspace context\n```json\n{context}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkspaceContextSnapshot;

    #[test]
    fn compose_appends_context_block() {
        let snapshot = ContextSnapshot::Workspace(WorkspaceContextSnapshot {
            projects: vec![],
            my_tasks: vec![],
            team: vec!["Ada Lovelace".into()],
        });
        let prompt = compose(&snapshot);
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("## Current workspace context"));
        assert!(prompt.contains("Ada Lovelace"));
    }
}
