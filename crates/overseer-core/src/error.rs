use crate::ids::{AgentId, TaskId};
use thiserror::Error;

/// A convenience `Result` alias using [`OverseerError`].
pub type OverseerResult<T> = Result<T, OverseerError>;

/// Top-level error type for the Overseer workspace.
///
/// String variants carry a human-readable message for the subsystem that
/// produced them; structured variants exist for conditions callers branch on.
#[derive(Error, Debug)]
pub enum OverseerError {
    /// An error raised by an agent runtime outside of task execution.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the snapshot/version state layer.
    #[error("State error: {0}")]
    State(String),

    /// An error from the orchestrator.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// An error from the autonomy policy layer.
    #[error("Autonomy error: {0}")]
    Autonomy(String),

    /// A task id was submitted twice in one process lifetime.
    #[error("Task already submitted: {0}")]
    DuplicateTask(TaskId),

    /// The dependency set of a submitted task closes a cycle.
    #[error("Dependency cycle detected for task {task_id} (via {via})")]
    DependencyCycle {
        /// The task being submitted.
        task_id: TaskId,
        /// The dependency through which the cycle was found.
        via: TaskId,
    },

    /// An agent with the same name is already registered.
    #[error("Agent already registered: {name} ({id})")]
    AgentAlreadyRegistered {
        /// Name of the rejected agent.
        name: String,
        /// Id of the agent that already owns the name.
        id: AgentId,
    },

    /// A version string that does not parse as `major.minor.patch`.
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// A version that is not present in the snapshot index.
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    /// The orchestrator actor has stopped and no longer accepts requests.
    #[error("Orchestrator has shut down")]
    Shutdown,

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            OverseerError::State("index missing".into()).to_string(),
            "State error: index missing"
        );
        let err = OverseerError::DependencyCycle {
            task_id: TaskId::from("b"),
            via: TaskId::from("a"),
        };
        assert_eq!(err.to_string(), "Dependency cycle detected for task b (via a)");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: OverseerError = io.into();
        assert!(matches!(err, OverseerError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_json_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: OverseerError = parse.into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
