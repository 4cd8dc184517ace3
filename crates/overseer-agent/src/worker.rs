use crate::record::TaskRequest;
use crate::runtime::AgentShared;
use async_trait::async_trait;
use overseer_core::TaskId;
use std::sync::Arc;
use tracing::info;

/// What a worker's recovery hook decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// The failure was repaired; this output replaces the failed result.
    Recovered(serde_json::Value),
    /// The failure stands.
    Unrecovered {
        /// Why recovery was not possible.
        reason: String,
    },
}

/// A domain-specific worker driven by an [`AgentRuntime`](crate::AgentRuntime).
///
/// Implementations hold no lifecycle state of their own: the runtime tracks
/// state, history and persistence around every call.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Runtime-type tag recorded in orchestrator summaries, e.g. `"code_generator"`.
    fn kind(&self) -> &str;

    /// Execute one task.
    async fn execute(
        &self,
        task: &TaskRequest,
        progress: &ProgressReporter,
    ) -> anyhow::Result<serde_json::Value>;

    /// Try to recover from a failed execution. The default has no strategy.
    async fn recover(&self, _task: &TaskRequest, _error: &anyhow::Error) -> Recovery {
        Recovery::Unrecovered {
            reason: "No recovery strategy available".to_string(),
        }
    }
}

/// Handle given to a worker to report progress on its current task.
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Arc<AgentShared>,
    task_id: TaskId,
}

impl ProgressReporter {
    pub(crate) fn new(shared: Arc<AgentShared>, task_id: TaskId) -> Self {
        Self { shared, task_id }
    }

    /// The task this reporter belongs to.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Record progress (clamped to `[0, 100]`) and persist the agent state.
    pub async fn report(&self, percent: f64, message: Option<&str>) {
        let progress = {
            let mut record = self.shared.record.lock();
            record.progress = percent.clamp(0.0, 100.0);
            record.progress
        };
        if let Some(message) = message {
            info!(
                agent = %self.shared.name,
                task_id = %self.task_id,
                progress,
                "Progress: {progress:.1}% - {message}"
            );
        }
        self.shared.persist().await;
    }
}
