use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Closed set of work item kinds the coordinator knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Retrieval,
    Discourse,
    Verification,
    Synthesis,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::Discourse => "discourse",
            Self::Verification => "verification",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single work item in the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub query: String,
    /// Lower values are more urgent.
    #[serde(default)]
    pub priority: i32,
    /// Only the coordinator moves a task out of `Pending`; plan files
    /// cannot preset it.
    #[serde(skip_deserializing)]
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(skip_deserializing)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: TaskKind, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            query: query.into(),
            priority: 0,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            results: Vec::new(),
            metadata: HashMap::new(),
            perspective: None,
        }
    }

    /// Create a task with a freshly generated id.
    pub fn generated(kind: TaskKind, query: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), kind, query)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self
    }

    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self = self.depends_on(id);
        }
        self
    }

    pub fn with_perspective(mut self, perspective: impl Into<String>) -> Self {
        self.perspective = Some(perspective.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Failure reason recorded by [`Task::mark_failed`].
    pub fn error(&self) -> Option<&str> {
        self.metadata.get("error").and_then(Value::as_str)
    }

    fn transition(&mut self, next: TaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                task_id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_running(&mut self) -> DomainResult<()> {
        self.transition(TaskStatus::Running)
    }

    pub fn mark_completed(&mut self, results: Vec<Value>) -> DomainResult<()> {
        self.transition(TaskStatus::Completed)?;
        self.results = results;
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.transition(TaskStatus::Failed)?;
        self.metadata
            .insert("error".to_string(), Value::String(reason.into()));
        Ok(())
    }
}

/// Status counts across a task graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
}

impl TaskProgress {
    /// Tasks that reached a terminal state.
    pub const fn finished(&self) -> usize {
        self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut task = Task::new("a", TaskKind::Retrieval, "rust async");
        task.mark_running().unwrap();
        task.mark_completed(vec![json!({"title": "x"})]).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.results.len(), 1);
    }

    #[test]
    fn test_failed_records_reason() {
        let mut task = Task::new("a", TaskKind::Discourse, "q");
        task.mark_running().unwrap();
        task.mark_failed("boom").unwrap();
        assert_eq!(task.error(), Some("boom"));
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut task = Task::new("a", TaskKind::Discourse, "q");
        task.mark_running().unwrap();
        task.mark_completed(vec![]).unwrap();

        let err = task.mark_failed("late").unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_depends_on_skips_duplicates() {
        let task = Task::new("c", TaskKind::Synthesis, "q")
            .depends_on("a")
            .with_dependencies(["a", "b"]);
        assert_eq!(task.dependencies, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_deserialize_ignores_lifecycle_fields() {
        let task: Task = serde_json::from_str(
            r#"{"id":"a","kind":"retrieval","query":"q","status":"completed","results":[1]}"#,
        )
        .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.results.is_empty());
    }

    #[test]
    fn test_deserialize_defaults() {
        let task: Task =
            serde_json::from_str(r#"{"id":"a","kind":"retrieval","query":"q"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.dependencies.is_empty());
        assert!(task.perspective.is_none());
    }
}
