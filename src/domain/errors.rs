//! Domain errors for the research swarm.

use thiserror::Error;

/// Format a cycle path as a human-readable string: `A -> B -> C`.
fn format_cycle_path(path: &[String]) -> String {
    path.join(" -> ")
}

/// Domain-level errors raised while building or mutating the task and
/// knowledge graphs.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Knowledge node not found: {0}")]
    NodeNotFound(String),

    #[error("Task {task_id} depends on unknown task {dependency_id}")]
    MissingDependency { task_id: String, dependency_id: String },

    #[error("Task dependency cycle detected among: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<String>),

    #[error("Invalid state transition for task {task_id} from {from} to {to}")]
    InvalidStateTransition { task_id: String, from: String, to: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_members() {
        let err = DomainError::DependencyCycle(vec!["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "Task dependency cycle detected among: a -> b"
        );
    }
}
