use crate::record::{AgentRecord, AgentStatistics, AgentStatus, HealthReport, TaskRequest, TaskResult};
use crate::store::AgentStore;
use crate::worker::{ProgressReporter, Recovery, Worker};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use overseer_core::{AgentId, AgentState, OverseerResult};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// State shared between a runtime and the progress reporters it hands out.
pub(crate) struct AgentShared {
    pub(crate) name: String,
    pub(crate) record: Mutex<AgentRecord>,
    store: AgentStore,
}

impl AgentShared {
    /// Write the record to disk. Failures are logged, never propagated.
    pub(crate) async fn persist(&self) {
        let snapshot = {
            let mut record = self.record.lock();
            record.timestamp = Utc::now();
            record.clone()
        };
        if let Err(e) = self.store.save(&snapshot).await {
            warn!(agent = %self.name, error = %e, "Failed to persist agent state");
        }
    }

    fn update(&self, f: impl FnOnce(&mut AgentRecord)) {
        f(&mut self.record.lock());
    }
}

/// Lifecycle wrapper around a [`Worker`]: owns the agent's state, bounded
/// histories and on-disk record, and persists after every transition.
///
/// Executions on one runtime are serialized; callers may invoke
/// [`execute`](Self::execute) concurrently and each call waits its turn.
pub struct AgentRuntime {
    id: AgentId,
    kind: String,
    shared: Arc<AgentShared>,
    worker: Arc<dyn Worker>,
    exec_lock: tokio::sync::Mutex<()>,
}

impl AgentRuntime {
    /// Create a runtime with a fresh `<name>_<8 hex>` id.
    pub async fn new(
        name: impl Into<String>,
        worker: Arc<dyn Worker>,
        workspace_dir: &Path,
    ) -> OverseerResult<Self> {
        let name = name.into();
        let id = AgentId::for_name(&name);
        Self::with_id(id, name, worker, workspace_dir).await
    }

    /// Create a runtime with a caller-chosen id, picking up any state
    /// previously persisted under that id.
    pub async fn with_id(
        id: AgentId,
        name: impl Into<String>,
        worker: Arc<dyn Worker>,
        workspace_dir: &Path,
    ) -> OverseerResult<Self> {
        let name = name.into();
        let store = AgentStore::new(workspace_dir, &id);
        store.ensure_dirs().await?;

        let record = match store.load().await {
            Ok(Some(record)) => {
                info!(agent = %name, state = %record.state, "Loaded persisted agent state");
                if record.state == AgentState::Running {
                    if let Some(task) = &record.current_task {
                        warn!(agent = %name, task_id = %task.id, "Agent was interrupted mid-task");
                    }
                }
                record
            }
            Ok(None) => {
                debug!(agent = %name, "No persisted state, starting fresh");
                AgentRecord::new(id.clone(), name.clone())
            }
            Err(e) => {
                warn!(
                    agent = %name,
                    path = %store.state_file().display(),
                    error = %e,
                    "Persisted state unreadable, starting fresh"
                );
                AgentRecord::new(id.clone(), name.clone())
            }
        };

        let kind = worker.kind().to_string();
        info!(agent = %name, id = %id, kind = %kind, "Agent initialized");

        Ok(Self {
            id,
            kind,
            shared: Arc::new(AgentShared {
                name,
                record: Mutex::new(record),
                store,
            }),
            worker,
            exec_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The agent's id.
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// The name tasks are routed by.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The worker's runtime-type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AgentState {
        self.shared.record.lock().state
    }

    /// A copy of the full in-memory record.
    pub fn record(&self) -> AgentRecord {
        self.shared.record.lock().clone()
    }

    /// Run one task through the worker.
    ///
    /// Worker failures never escape as errors: they are recorded in the
    /// error history and returned as a result with status `error`. A worker
    /// panic is caught here and handled as a failure. With
    /// `auto_recover`, the worker's recovery hook gets one chance to replace
    /// the failure.
    pub async fn execute(&self, task: TaskRequest, auto_recover: bool) -> TaskResult {
        let _turn = self.exec_lock.lock().await;
        let started_at = Utc::now();

        self.shared.update(|r| {
            r.state = AgentState::Running;
            r.current_task = Some(task.clone());
            r.progress = 0.0;
        });
        info!(agent = %self.name(), task_id = %task.id, "Starting task: {}", task.label());
        self.shared.persist().await;

        let reporter = ProgressReporter::new(Arc::clone(&self.shared), task.id.clone());
        let outcome = AssertUnwindSafe(self.worker.execute(&task, &reporter))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())));
        let result = match outcome {
            Ok(output) => {
                let result = TaskResult::success(&task, started_at, output);
                self.shared.update(|r| {
                    r.state = AgentState::Completed;
                    r.progress = 100.0;
                    r.push_task(result.clone());
                });
                info!(agent = %self.name(), task_id = %task.id, "Task completed");
                result
            }
            Err(err) => {
                let failure = TaskResult::failure(&task, started_at, &err);
                self.shared.update(|r| {
                    r.state = AgentState::Error;
                    r.push_error(failure.clone());
                });
                error!(agent = %self.name(), task_id = %task.id, error = %err, "Task failed");
                self.shared.persist().await;

                if auto_recover {
                    self.recover(&task, started_at, &err, failure).await
                } else {
                    failure
                }
            }
        };

        self.shared.update(|r| r.current_task = None);
        self.shared.persist().await;
        result
    }

    async fn recover(
        &self,
        task: &TaskRequest,
        started_at: DateTime<Utc>,
        err: &anyhow::Error,
        failure: TaskResult,
    ) -> TaskResult {
        self.shared.update(|r| r.state = AgentState::Recovering);
        info!(agent = %self.name(), task_id = %task.id, "Attempting recovery");
        self.shared.persist().await;

        match self.worker.recover(task, err).await {
            Recovery::Recovered(output) => {
                let result = TaskResult::recovered(task, started_at, output);
                self.shared.update(|r| {
                    r.state = AgentState::Completed;
                    r.progress = 100.0;
                    r.push_task(result.clone());
                });
                info!(agent = %self.name(), task_id = %task.id, "Recovery successful");
                result
            }
            Recovery::Unrecovered { reason } => {
                self.shared.update(|r| r.state = AgentState::Error);
                warn!(agent = %self.name(), task_id = %task.id, %reason, "Recovery failed");
                failure
            }
        }
    }

    /// Healthy unless the agent sits in `error` or `failed`.
    pub fn health_check(&self) -> HealthReport {
        let record = self.shared.record.lock();
        HealthReport {
            agent_id: record.agent_id.clone(),
            agent_name: record.agent_name.clone(),
            state: record.state,
            healthy: record.state.is_healthy(),
            current_task: record.current_task.as_ref().map(|t| t.label().to_string()),
            progress: record.progress,
            tasks_completed: record.task_history.len(),
            errors_encountered: record.error_history.len(),
            last_error: record.error_history.back().cloned(),
        }
    }

    /// State, current task, metadata and history counters.
    pub fn status(&self) -> AgentStatus {
        let record = self.shared.record.lock();
        AgentStatus {
            agent_id: record.agent_id.clone(),
            agent_name: record.agent_name.clone(),
            kind: self.kind.clone(),
            state: record.state,
            progress: record.progress,
            current_task: record.current_task.clone(),
            metadata: record.metadata.clone(),
            statistics: AgentStatistics {
                tasks_completed: record.task_history.len(),
                tasks_failed: record.error_history.len(),
                success_rate: record.success_rate(),
            },
        }
    }

    /// Pause a running agent. Returns false when the agent is not running.
    pub async fn pause(&self) -> bool {
        if !self.transition(AgentState::Running, AgentState::Paused) {
            return false;
        }
        info!(agent = %self.name(), "Agent paused");
        self.shared.persist().await;
        true
    }

    /// Resume a paused agent. Returns false when the agent is not paused.
    pub async fn resume(&self) -> bool {
        if !self.transition(AgentState::Paused, AgentState::Running) {
            return false;
        }
        info!(agent = %self.name(), "Agent resumed");
        self.shared.persist().await;
        true
    }

    /// Reset to idle, dropping the current task and progress.
    pub async fn stop(&self) {
        self.shared.update(|r| {
            r.state = AgentState::Idle;
            r.current_task = None;
            r.progress = 0.0;
        });
        info!(agent = %self.name(), "Agent stopped");
        self.shared.persist().await;
    }

    fn transition(&self, from: AgentState, to: AgentState) -> bool {
        let mut record = self.shared.record.lock();
        if record.state != from {
            return false;
        }
        record.state = to;
        true
    }

    /// Set one metadata key and persist.
    pub async fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.shared.update(|r| {
            r.metadata.insert(key.into(), value);
        });
        self.shared.persist().await;
    }

    /// Snapshot file names, oldest first.
    pub async fn list_snapshots(&self) -> OverseerResult<Vec<String>> {
        let paths = self.shared.store.list_snapshots().await?;
        Ok(paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect())
    }

    /// Restore state, progress, current task and metadata from the first
    /// snapshot whose file name contains `fragment`.
    ///
    /// Returns `Ok(false)` when no snapshot matches or the match cannot be
    /// parsed. Histories are left as they are.
    pub async fn rollback_to_snapshot(&self, fragment: &str) -> OverseerResult<bool> {
        let Some(path) = self.shared.store.find_snapshot(fragment).await? else {
            warn!(agent = %self.name(), fragment, "No snapshot matches");
            return Ok(false);
        };

        let snapshot = match self.shared.store.load_snapshot(&path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(false),
            Err(e) => {
                error!(agent = %self.name(), path = %path.display(), error = %e, "Snapshot unreadable");
                return Ok(false);
            }
        };

        self.shared.update(|r| {
            r.state = snapshot.state;
            r.progress = snapshot.progress;
            r.current_task = snapshot.current_task;
            r.metadata = snapshot.metadata;
        });
        info!(agent = %self.name(), path = %path.display(), "Rolled back to snapshot");
        self.shared.persist().await;
        Ok(true)
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    anyhow::anyhow!("Worker panicked: {message}")
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("id", &self.id)
            .field("name", &self.shared.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use overseer_core::TaskId;
    use serde_json::json;

    struct Doubler;

    #[async_trait]
    impl Worker for Doubler {
        fn kind(&self) -> &str {
            "doubler"
        }

        async fn execute(
            &self,
            task: &TaskRequest,
            progress: &ProgressReporter,
        ) -> anyhow::Result<serde_json::Value> {
            progress.report(50.0, Some("halfway")).await;
            let n = task.params["n"]
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("missing n"))?;
            Ok(json!(n * 2))
        }
    }

    fn task(id: &str, params: serde_json::Value) -> TaskRequest {
        TaskRequest::new(TaskId::from(id), params)
    }

    #[tokio::test]
    async fn test_execute_success() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentRuntime::new("doubler", Arc::new(Doubler), dir.path())
            .await
            .unwrap();

        let result = agent.execute(task("t1", json!({"n": 21})), true).await;
        assert!(result.is_success());
        assert_eq!(result.output, Some(json!(42)));

        let record = agent.record();
        assert_eq!(record.state, AgentState::Completed);
        assert_eq!(record.progress, 100.0);
        assert!(record.current_task.is_none());
        assert_eq!(record.task_history.len(), 1);
        assert!(agent.health_check().healthy);
    }

    #[tokio::test]
    async fn test_execute_failure_without_recovery_hook() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentRuntime::new("doubler", Arc::new(Doubler), dir.path())
            .await
            .unwrap();

        let result = agent.execute(task("t1", json!({})), true).await;
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("missing n"));
        assert_eq!(agent.state(), AgentState::Error);
        assert!(agent.record().current_task.is_none());

        let health = agent.health_check();
        assert!(!health.healthy);
        assert_eq!(health.errors_encountered, 1);
        assert_eq!(health.last_error.unwrap().task_id.as_str(), "t1");
    }

    struct Exploding;

    #[async_trait]
    impl Worker for Exploding {
        fn kind(&self) -> &str {
            "exploding"
        }

        async fn execute(
            &self,
            task: &TaskRequest,
            progress: &ProgressReporter,
        ) -> anyhow::Result<serde_json::Value> {
            progress.report(10.0, None).await;
            panic!("boom on {}", task.id);
        }
    }

    #[tokio::test]
    async fn test_worker_panic_is_recorded_failure() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentRuntime::new("exploding", Arc::new(Exploding), dir.path())
            .await
            .unwrap();

        let result = agent.execute(task("t1", json!({})), true).await;
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("Worker panicked: boom on t1"));

        let health = agent.health_check();
        assert_eq!(health.state, AgentState::Error);
        assert!(!health.healthy);
        assert!(health.current_task.is_none());
        assert_eq!(health.errors_encountered, 1);

        // The runtime stays usable after the panic.
        let again = agent.execute(task("t2", json!({})), false).await;
        assert!(!again.is_success());
        assert_eq!(agent.health_check().errors_encountered, 2);
    }

    #[tokio::test]
    async fn test_pause_resume_only_from_valid_states() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentRuntime::new("doubler", Arc::new(Doubler), dir.path())
            .await
            .unwrap();

        assert!(!agent.pause().await);
        assert!(!agent.resume().await);

        agent.shared.update(|r| r.state = AgentState::Running);
        assert!(agent.pause().await);
        assert_eq!(agent.state(), AgentState::Paused);
        assert!(agent.resume().await);
        assert_eq!(agent.state(), AgentState::Running);

        agent.stop().await;
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.record().progress, 0.0);
    }

    #[tokio::test]
    async fn test_status_reports_kind_and_success_rate() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentRuntime::new("doubler", Arc::new(Doubler), dir.path())
            .await
            .unwrap();
        agent.execute(task("t1", json!({"n": 1})), false).await;
        agent.execute(task("t2", json!({})), false).await;
        agent.set_metadata("owner", json!("ops")).await;

        let status = agent.status();
        assert_eq!(status.kind, "doubler");
        assert_eq!(status.statistics.tasks_completed, 1);
        assert_eq!(status.statistics.tasks_failed, 1);
        assert_eq!(status.statistics.success_rate, 50.0);
        assert_eq!(status.metadata["owner"], json!("ops"));
    }

    #[tokio::test]
    async fn test_corrupt_state_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let id = AgentId::from("doubler_0000beef");
        let state_dir = dir.path().join("state").join(id.as_str());
        tokio::fs::create_dir_all(&state_dir).await.unwrap();
        tokio::fs::write(state_dir.join("current_state.json"), b"{broken")
            .await
            .unwrap();

        let agent = AgentRuntime::with_id(id, "doubler", Arc::new(Doubler), dir.path())
            .await
            .unwrap();
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.record().task_history.is_empty());
    }
}
