use chrono::{DateTime, Utc};
use overseer_agent::{AgentStatus, TaskRequest, TaskResult};
use overseer_autonomy::OperationContext;
use overseer_core::{
    AgentId, AgentState, AutonomyLevel, OperationCategory, Priority, TaskId, TaskStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A task as handed to [`Orchestrator::submit`](crate::Orchestrator::submit).
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    /// Caller-chosen id; generated when absent.
    pub id: Option<TaskId>,
    /// Name of the agent that runs the task.
    pub agent_name: String,
    /// Human-readable task name.
    pub name: Option<String>,
    /// Payload passed to the worker.
    pub params: serde_json::Value,
    /// Dispatch priority among ready tasks.
    pub priority: Priority,
    /// Tasks that must complete first.
    pub dependencies: Vec<TaskId>,
    /// Hold for approval regardless of policy.
    pub requires_approval: bool,
    /// Category checked against the autonomy policy at submission.
    pub operation: Option<OperationCategory>,
    /// Facts that can tighten the policy decision for `operation`.
    pub context: Option<OperationContext>,
}

impl TaskSubmission {
    /// A medium-priority task for `agent_name` with no dependencies.
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            id: None,
            agent_name: agent_name.into(),
            name: None,
            params: serde_json::Value::Null,
            priority: Priority::default(),
            dependencies: Vec::new(),
            requires_approval: false,
            operation: None,
            context: None,
        }
    }

    /// Use a caller-chosen id.
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the task name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the worker payload.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add one dependency.
    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Replace the dependency list.
    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Always hold for approval.
    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Classify the task for the autonomy policy.
    pub fn with_operation(mut self, operation: OperationCategory) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Attach operation context.
    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// The orchestrator's view of one task through its whole lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique for the process lifetime.
    pub task_id: TaskId,
    /// Agent the task is routed to.
    pub agent_name: String,
    /// What the worker receives.
    pub task: TaskRequest,
    /// Dispatch priority.
    pub priority: Priority,
    /// Deduplicated dependencies.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Whether the task was gated at submission.
    pub requires_approval: bool,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Accepted by the orchestrator.
    pub submitted_at: DateTime<Utc>,
    /// Dispatched to an agent.
    pub started_at: Option<DateTime<Utc>>,
    /// Reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Agent result, when the task reached an agent.
    pub result: Option<TaskResult>,
    /// Failure payload: rejection reason, dispatch error or task error.
    pub error: Option<String>,
    /// Submission order, used to break priority ties.
    #[serde(default)]
    pub sequence: u64,
}

/// Per-agent entry of the orchestrator state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Agent name.
    pub name: String,
    /// State at the time of the write.
    pub state: AgentState,
    /// Worker runtime-type tag.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Task counters in [`OrchestratorStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    /// Ready and waiting for a worker slot.
    pub queued: usize,
    /// Waiting on dependencies that have not completed.
    pub blocked: usize,
    /// Parked until approved or rejected.
    pub pending_approval: usize,
    /// Running on an agent.
    pub active: usize,
    /// Terminal tasks in the retained history.
    pub completed: usize,
}

/// Answer of [`Orchestrator::status`](crate::Orchestrator::status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Id of this orchestrator instance.
    pub orchestrator_id: String,
    /// Whether dispatching is on.
    pub running: bool,
    /// Current policy level.
    pub autonomy_level: AutonomyLevel,
    /// Status of every registered agent.
    pub agents: BTreeMap<AgentId, AgentStatus>,
    /// Task counters.
    pub tasks: TaskCounts,
    /// When the status was taken.
    pub timestamp: DateTime<Utc>,
}
