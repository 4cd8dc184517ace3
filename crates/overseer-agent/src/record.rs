use chrono::{DateTime, Utc};
use overseer_core::{AgentId, AgentState, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Most recent task results kept in an agent's history.
pub const TASK_HISTORY_LIMIT: usize = 100;
/// Most recent failures kept in an agent's error history.
pub const ERROR_HISTORY_LIMIT: usize = 50;

/// The unit of work handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Id assigned at submission.
    pub id: TaskId,
    /// Optional human-readable task name.
    #[serde(default)]
    pub name: Option<String>,
    /// Arbitrary parameter payload, interpreted only by the worker.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl TaskRequest {
    /// A request without a name.
    pub fn new(id: TaskId, params: serde_json::Value) -> Self {
        Self {
            id,
            name: None,
            params,
        }
    }

    /// Set the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name if present, otherwise the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Outcome class of a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The worker, or its recovery hook, produced an output.
    Success,
    /// The worker failed and no recovery replaced the failure.
    Error,
}

/// Result of executing one task on an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task this result belongs to.
    pub task_id: TaskId,
    /// Copied from the request.
    pub task_name: Option<String>,
    /// Success or error.
    pub status: ResultStatus,
    /// Worker output on success.
    pub output: Option<serde_json::Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Full error chain captured when the worker failed.
    pub traceback: Option<String>,
    /// Set when the worker's recovery hook replaced a failure.
    #[serde(default)]
    pub recovered: bool,
    /// When the runtime handed the task to the worker.
    pub started_at: DateTime<Utc>,
    /// When the outcome was recorded.
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// A successful result carrying `output`.
    pub fn success(task: &TaskRequest, started_at: DateTime<Utc>, output: serde_json::Value) -> Self {
        Self {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            status: ResultStatus::Success,
            output: Some(output),
            error: None,
            traceback: None,
            recovered: false,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// A failed result; the error chain goes into `traceback`.
    pub fn failure(task: &TaskRequest, started_at: DateTime<Utc>, error: &anyhow::Error) -> Self {
        Self {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            status: ResultStatus::Error,
            output: None,
            error: Some(error.to_string()),
            traceback: Some(format!("{error:?}")),
            recovered: false,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// A success produced by the recovery hook.
    pub fn recovered(task: &TaskRequest, started_at: DateTime<Utc>, output: serde_json::Value) -> Self {
        Self {
            recovered: true,
            ..Self::success(task, started_at, output)
        }
    }

    /// True for [`ResultStatus::Success`].
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// Wall-clock time between start and completion.
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// The persisted current-state document of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Stable id; also names the state and backup directories.
    pub agent_id: AgentId,
    /// Name tasks are routed by.
    pub agent_name: String,
    /// Current lifecycle state.
    pub state: AgentState,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    /// Set while a task is executing, cleared when it finishes.
    pub current_task: Option<TaskRequest>,
    /// Free-form caller data.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Successful results, newest last, at most [`TASK_HISTORY_LIMIT`].
    #[serde(default)]
    pub task_history: VecDeque<TaskResult>,
    /// Failed results, newest last, at most [`ERROR_HISTORY_LIMIT`].
    #[serde(default)]
    pub error_history: VecDeque<TaskResult>,
    /// Time of the last write.
    pub timestamp: DateTime<Utc>,
}

impl AgentRecord {
    /// An idle record with empty histories.
    pub fn new(agent_id: AgentId, agent_name: impl Into<String>) -> Self {
        Self {
            agent_id,
            agent_name: agent_name.into(),
            state: AgentState::Idle,
            progress: 0.0,
            current_task: None,
            metadata: BTreeMap::new(),
            task_history: VecDeque::new(),
            error_history: VecDeque::new(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn push_task(&mut self, result: TaskResult) {
        self.task_history.push_back(result);
        while self.task_history.len() > TASK_HISTORY_LIMIT {
            self.task_history.pop_front();
        }
    }

    pub(crate) fn push_error(&mut self, result: TaskResult) {
        self.error_history.push_back(result);
        while self.error_history.len() > ERROR_HISTORY_LIMIT {
            self.error_history.pop_front();
        }
    }

    /// `completed / (completed + failed) * 100`, or 100 when nothing ran yet.
    pub fn success_rate(&self) -> f64 {
        let completed = self.task_history.len();
        let total = completed + self.error_history.len();
        if total == 0 {
            return 100.0;
        }
        completed as f64 / total as f64 * 100.0
    }
}

/// Answer of [`AgentRuntime::health_check`](crate::AgentRuntime::health_check).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Agent id.
    pub agent_id: AgentId,
    /// Agent name.
    pub agent_name: String,
    /// Current lifecycle state.
    pub state: AgentState,
    /// False in `error` and `failed`.
    pub healthy: bool,
    /// Label of the task in flight.
    pub current_task: Option<String>,
    /// Progress of the task in flight.
    pub progress: f64,
    /// Length of the task history.
    pub tasks_completed: usize,
    /// Length of the error history.
    pub errors_encountered: usize,
    /// Most recent failure.
    pub last_error: Option<TaskResult>,
}

/// Counters reported by [`AgentStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatistics {
    /// Successful tasks still in history.
    pub tasks_completed: usize,
    /// Failed tasks still in history.
    pub tasks_failed: usize,
    /// See [`AgentRecord::success_rate`].
    pub success_rate: f64,
}

/// Detailed status of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent id.
    pub agent_id: AgentId,
    /// Agent name.
    pub agent_name: String,
    /// The worker's type tag.
    pub kind: String,
    /// Current lifecycle state.
    pub state: AgentState,
    /// Progress of the task in flight.
    pub progress: f64,
    /// The task in flight.
    pub current_task: Option<TaskRequest>,
    /// Caller metadata.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// History counters.
    pub statistics: AgentStatistics,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(id: &str) -> TaskRequest {
        TaskRequest::new(TaskId::from(id), serde_json::json!({"n": 1}))
    }

    #[test]
    fn test_task_history_is_bounded() {
        let mut record = AgentRecord::new(AgentId::from("a_1"), "a");
        for i in 0..(TASK_HISTORY_LIMIT + 20) {
            let task = request(&format!("t{i}"));
            record.push_task(TaskResult::success(&task, Utc::now(), serde_json::Value::Null));
        }
        assert_eq!(record.task_history.len(), TASK_HISTORY_LIMIT);
        assert_eq!(record.task_history.front().unwrap().task_id.as_str(), "t20");
    }

    #[test]
    fn test_error_history_is_bounded() {
        let mut record = AgentRecord::new(AgentId::from("a_1"), "a");
        let err = anyhow::anyhow!("boom");
        for i in 0..(ERROR_HISTORY_LIMIT + 5) {
            let task = request(&format!("t{i}"));
            record.push_error(TaskResult::failure(&task, Utc::now(), &err));
        }
        assert_eq!(record.error_history.len(), ERROR_HISTORY_LIMIT);
        assert_eq!(record.error_history.back().unwrap().task_id.as_str(), "t54");
    }

    #[test]
    fn test_success_rate() {
        let mut record = AgentRecord::new(AgentId::from("a_1"), "a");
        assert_eq!(record.success_rate(), 100.0);
        let task = request("t1");
        record.push_task(TaskResult::success(&task, Utc::now(), serde_json::Value::Null));
        record.push_task(TaskResult::success(&task, Utc::now(), serde_json::Value::Null));
        record.push_task(TaskResult::success(&task, Utc::now(), serde_json::Value::Null));
        record.push_error(TaskResult::failure(&task, Utc::now(), &anyhow::anyhow!("x")));
        assert_eq!(record.success_rate(), 75.0);
    }

    #[test]
    fn test_failure_captures_cause_chain() {
        let task = request("t1").with_name("parse");
        let err = anyhow::anyhow!("disk unreadable").context("loading input");
        let result = TaskResult::failure(&task, Utc::now(), &err);
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.error.as_deref(), Some("loading input"));
        assert!(result.traceback.unwrap().contains("disk unreadable"));
        assert_eq!(result.task_name.as_deref(), Some("parse"));
    }
}
