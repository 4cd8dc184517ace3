use crate::error::OverseerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task priority. Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Ahead of ordinary work.
    High,
    /// Dispatched before anything else that is ready.
    Critical,
}

impl Priority {
    /// All priorities from lowest to highest.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Priority {
    type Err = OverseerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(OverseerError::Config(format!("Invalid priority '{other}'"))),
        }
    }
}

/// Lifecycle status of a task, mutated only by the orchestrator.
///
/// `queued → (waiting_approval → approved) → running → completed | failed | cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted; waiting for dependencies or a free worker.
    Queued,
    /// Parked until a human approves or rejects it.
    WaitingApproval,
    /// Approved and eligible for dispatch.
    Approved,
    /// Handed to an agent.
    Running,
    /// The agent returned a successful result.
    Completed,
    /// The agent failed, panicked, or could not be found.
    Failed,
    /// Rejected or expired while waiting for approval.
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::WaitingApproval => "waiting_approval",
            TaskStatus::Approved => "approved",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of an agent runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// No task yet, or reset by `stop`.
    #[default]
    Idle,
    /// Executing a task.
    Running,
    /// Paused by a caller while running.
    Paused,
    /// The last task failed and was not recovered.
    Error,
    /// The worker's recovery hook is running.
    Recovering,
    /// The last task succeeded.
    Completed,
    /// Given up on; set by callers, never by the runtime itself.
    Failed,
}

impl AgentState {
    /// An agent is unhealthy exactly when it sits in `error` or `failed`.
    pub fn is_healthy(self) -> bool {
        !matches!(self, AgentState::Error | AgentState::Failed)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Paused => "paused",
            AgentState::Error => "error",
            AgentState::Recovering => "recovering",
            AgentState::Completed => "completed",
            AgentState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_task_status_wire_names() {
        let json = serde_json::to_string(&TaskStatus::WaitingApproval).unwrap();
        assert_eq!(json, "\"waiting_approval\"");
        let parsed: TaskStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, TaskStatus::Cancelled);
        assert!(serde_json::from_str::<TaskStatus>("\"done\"").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::WaitingApproval.is_terminal());
    }

    #[test]
    fn test_agent_health() {
        assert!(AgentState::Idle.is_healthy());
        assert!(AgentState::Recovering.is_healthy());
        assert!(!AgentState::Error.is_healthy());
        assert!(!AgentState::Failed.is_healthy());
    }
}
