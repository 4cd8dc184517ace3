use crate::config::OrchestratorConfig;
use crate::monitor;
use crate::persistence::{OrchestratorStateDocument, StateWriter};
use crate::scheduler::Scheduler;
use crate::types::{AgentSummary, OrchestratorStatus, TaskRecord, TaskSubmission};
use chrono::Utc;
use overseer_agent::{AgentRuntime, TaskResult};
use overseer_autonomy::AutonomyController;
use overseer_core::{
    AgentId, AutonomyLevel, OverseerError, OverseerResult, TaskId, TaskStatus,
};
use overseer_state::{Increment, StateManager, StateValidation, Version, VersionEntry};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 128;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Requests understood by the dispatcher.
pub(crate) enum Command {
    Register {
        agent: Arc<AgentRuntime>,
        reply: oneshot::Sender<OverseerResult<AgentId>>,
    },
    Unregister {
        agent_id: AgentId,
        reply: oneshot::Sender<bool>,
    },
    Submit {
        submission: Box<TaskSubmission>,
        reply: oneshot::Sender<OverseerResult<TaskId>>,
    },
    Approve {
        task_id: TaskId,
        reply: oneshot::Sender<bool>,
    },
    Reject {
        task_id: TaskId,
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    Pending {
        reply: oneshot::Sender<Vec<TaskRecord>>,
    },
    Start {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<OrchestratorStatus>,
    },
    Task {
        task_id: TaskId,
        reply: oneshot::Sender<Option<TaskRecord>>,
    },
    Agents {
        reply: oneshot::Sender<Vec<Arc<AgentRuntime>>>,
    },
    Persist {
        reply: Option<oneshot::Sender<()>>,
    },
    ExpireApprovals {
        timeout: Duration,
    },
    Reload {
        document: Option<Box<OrchestratorStateDocument>>,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Outcome of one execution, sent back by the worker pool.
struct Completion {
    task_id: TaskId,
    outcome: Result<TaskResult, String>,
}

/// Owns every piece of mutable orchestrator state. Runs on its own tokio
/// task and is only reachable through [`Command`]s.
struct Dispatcher {
    orchestrator_id: String,
    config: OrchestratorConfig,
    autonomy: Arc<AutonomyController>,
    agents: BTreeMap<AgentId, Arc<AgentRuntime>>,
    scheduler: Scheduler,
    running: bool,
    monitor: Option<JoinHandle<()>>,
    writer: StateWriter,
    commands: mpsc::WeakSender<Command>,
    done_tx: mpsc::UnboundedSender<Completion>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut done: mpsc::UnboundedReceiver<Completion>,
    ) {
        self.persist();
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        self.halt();
                        self.persist();
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle(cmd),
                    None => {
                        self.halt();
                        break;
                    }
                },
                Some(completion) = done.recv() => self.complete(completion),
            }
            self.fill_slots();
        }
        debug!(orchestrator_id = %self.orchestrator_id, "Dispatcher stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Register { agent, reply } => {
                let _ = reply.send(self.register(agent));
            }
            Command::Unregister { agent_id, reply } => {
                let removed = self.agents.remove(&agent_id);
                if let Some(agent) = &removed {
                    info!(agent = %agent.name(), %agent_id, "Agent unregistered");
                    self.persist();
                }
                let _ = reply.send(removed.is_some());
            }
            Command::Submit { submission, reply } => {
                let _ = reply.send(self.submit(*submission));
            }
            Command::Approve { task_id, reply } => {
                let approved = self.scheduler.approve(&task_id);
                if approved {
                    info!(%task_id, "Task approved");
                    self.persist();
                } else {
                    debug!(%task_id, "Approve: task not pending");
                }
                let _ = reply.send(approved);
            }
            Command::Reject {
                task_id,
                reason,
                reply,
            } => {
                let rejected = self.scheduler.reject(&task_id, &reason);
                if rejected {
                    info!(%task_id, %reason, "Task rejected");
                    self.persist();
                } else {
                    debug!(%task_id, "Reject: task not pending");
                }
                let _ = reply.send(rejected);
            }
            Command::Pending { reply } => {
                let _ = reply.send(self.scheduler.pending());
            }
            Command::Start { reply } => {
                if !self.running {
                    self.running = true;
                    self.monitor = Some(monitor::spawn(
                        self.commands.clone(),
                        self.config.monitor_interval(),
                        self.config.approval_timeout(),
                    ));
                    info!(
                        orchestrator_id = %self.orchestrator_id,
                        workers = self.config.worker_slots(),
                        "Orchestrator started"
                    );
                }
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                if self.running {
                    self.halt();
                    self.persist();
                    info!(orchestrator_id = %self.orchestrator_id, "Orchestrator stopped");
                }
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Task { task_id, reply } => {
                let _ = reply.send(self.scheduler.task(&task_id));
            }
            Command::Agents { reply } => {
                let _ = reply.send(self.agents.values().cloned().collect());
            }
            Command::Persist { reply } => {
                self.persist();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            Command::ExpireApprovals { timeout } => {
                let expired = self.scheduler.expire_approvals(timeout, Utc::now());
                if !expired.is_empty() {
                    for task_id in &expired {
                        warn!(%task_id, "Pending approval expired");
                    }
                    self.persist();
                }
            }
            Command::Reload { document, reply } => {
                self.scheduler.clear();
                if let Some(doc) = document {
                    restore_scheduler(&mut self.scheduler, *doc);
                }
                info!(orchestrator_id = %self.orchestrator_id, "Orchestrator state reloaded");
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn register(&mut self, agent: Arc<AgentRuntime>) -> OverseerResult<AgentId> {
        if let Some(existing) = self.agents.values().find(|a| a.name() == agent.name()) {
            return Err(OverseerError::AgentAlreadyRegistered {
                name: agent.name().to_string(),
                id: existing.id().clone(),
            });
        }
        let agent_id = agent.id().clone();
        info!(agent = %agent.name(), %agent_id, kind = %agent.kind(), "Agent registered");
        self.agents.insert(agent_id.clone(), agent);
        self.persist();
        Ok(agent_id)
    }

    fn submit(&mut self, submission: TaskSubmission) -> OverseerResult<TaskId> {
        let level = self.autonomy.level();
        let policy_gate = submission
            .operation
            .is_some_and(|op| self.autonomy.requires_approval(op, submission.context.as_ref()));
        let needs_approval =
            submission.requires_approval || level == AutonomyLevel::Manual || policy_gate;

        let agent = submission.agent_name.clone();
        let priority = submission.priority;
        let task_id = self.scheduler.submit(submission, needs_approval)?;
        if needs_approval {
            info!(%task_id, %agent, %priority, "Task awaiting approval");
        } else {
            info!(%task_id, %agent, %priority, "Task submitted");
        }
        self.persist();
        Ok(task_id)
    }

    fn fill_slots(&mut self) {
        if !self.running {
            return;
        }
        let mut dispatched = false;
        while self.scheduler.active_len() < self.config.worker_slots() {
            let Some(record) = self.scheduler.next_dispatch() else {
                break;
            };
            self.dispatch(record);
            dispatched = true;
        }
        if dispatched {
            self.persist();
        }
    }

    fn dispatch(&mut self, record: TaskRecord) {
        let Some(agent) = self
            .agents
            .values()
            .find(|a| a.name() == record.agent_name)
            .cloned()
        else {
            warn!(task_id = %record.task_id, agent = %record.agent_name, "Agent not found");
            self.scheduler.finish(
                &record.task_id,
                TaskStatus::Failed,
                None,
                Some(format!("Agent not found: {}", record.agent_name)),
            );
            self.persist();
            return;
        };

        info!(
            task_id = %record.task_id,
            agent = %record.agent_name,
            priority = %record.priority,
            "Dispatching task"
        );
        let done = self.done_tx.clone();
        let auto_recover = self.config.auto_recover;
        let task_id = record.task_id;
        let task = record.task;
        tokio::spawn(async move {
            let execution = tokio::spawn(async move { agent.execute(task, auto_recover).await });
            let outcome = execution
                .await
                .map_err(|e| format!("Worker panicked: {e}"));
            let _ = done.send(Completion { task_id, outcome });
        });
    }

    fn complete(&mut self, completion: Completion) {
        let Completion { task_id, outcome } = completion;
        let (status, result, error) = match outcome {
            Ok(result) if result.is_success() => (TaskStatus::Completed, Some(result), None),
            Ok(result) => (TaskStatus::Failed, Some(result), None),
            Err(e) => (TaskStatus::Failed, None, Some(e)),
        };

        let released = self.scheduler.finish(&task_id, status, result, error);
        match status {
            TaskStatus::Completed => info!(%task_id, released = released.len(), "Task completed"),
            _ => warn!(%task_id, "Task failed"),
        }
        self.persist();
    }

    fn halt(&mut self) {
        self.running = false;
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }

    fn document(&self) -> OrchestratorStateDocument {
        OrchestratorStateDocument {
            orchestrator_id: self.orchestrator_id.clone(),
            autonomy_level: self.autonomy.level(),
            agents: self
                .agents
                .iter()
                .map(|(id, agent)| {
                    let summary = AgentSummary {
                        name: agent.name().to_string(),
                        state: agent.state(),
                        kind: agent.kind().to_string(),
                    };
                    (id.clone(), summary)
                })
                .collect(),
            active_tasks: self.scheduler.active(),
            completed_tasks: self.scheduler.history(),
            pending_approval: self.scheduler.pending(),
            timestamp: Utc::now(),
        }
    }

    fn persist(&self) {
        self.writer.write(self.document());
    }

    fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            orchestrator_id: self.orchestrator_id.clone(),
            running: self.running,
            autonomy_level: self.autonomy.level(),
            agents: self
                .agents
                .iter()
                .map(|(id, agent)| (id.clone(), agent.status()))
                .collect(),
            tasks: self.scheduler.counts(),
            timestamp: Utc::now(),
        }
    }
}

fn restore_scheduler(scheduler: &mut Scheduler, doc: OrchestratorStateDocument) {
    let interrupted: Vec<TaskRecord> = doc.active_tasks.into_values().collect();
    for record in &interrupted {
        warn!(task_id = %record.task_id, agent = %record.agent_name, "Task interrupted by restart");
    }
    info!(
        completed = doc.completed_tasks.len(),
        pending = doc.pending_approval.len(),
        interrupted = interrupted.len(),
        "Restoring orchestrator state"
    );
    scheduler.restore(doc.completed_tasks, doc.pending_approval, interrupted);
}

/// Handle to a running orchestrator.
///
/// Cloning is cheap; every clone talks to the same dispatcher. The
/// dispatcher keeps running until [`Orchestrator::shutdown`] is called or
/// every handle is dropped.
#[derive(Clone)]
pub struct Orchestrator {
    orchestrator_id: String,
    commands: mpsc::Sender<Command>,
    writer: StateWriter,
    autonomy: Arc<AutonomyController>,
    state: Arc<StateManager>,
    workspace_dir: PathBuf,
}

impl Orchestrator {
    /// Load policy, version index and any previous orchestrator state from
    /// `workspace_dir`, then spawn the dispatcher. Dispatching starts with
    /// [`Orchestrator::start`].
    pub async fn new(workspace_dir: &Path, config: OrchestratorConfig) -> OverseerResult<Self> {
        let autonomy = Arc::new(AutonomyController::load(workspace_dir).await?);
        let state = Arc::new(StateManager::new(workspace_dir).await?);
        let previous = OrchestratorStateDocument::load(workspace_dir).await;

        // The policy document owns the level; the configured one only seeds
        // a workspace that had no policy yet.
        if autonomy.created_defaults() && autonomy.level() != config.autonomy_level {
            autonomy.set_level(config.autonomy_level).await?;
        }
        let level = autonomy.level();

        let mut scheduler = Scheduler::new(config.completed_history_limit);
        if let Some(doc) = previous {
            restore_scheduler(&mut scheduler, doc);
        }

        let orchestrator_id = format!(
            "orchestrator_{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let writer = StateWriter::spawn(OrchestratorStateDocument::path(workspace_dir));
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            orchestrator_id: orchestrator_id.clone(),
            config,
            autonomy: Arc::clone(&autonomy),
            agents: BTreeMap::new(),
            scheduler,
            running: false,
            monitor: None,
            writer: writer.clone(),
            commands: commands.downgrade(),
            done_tx,
        };
        tokio::spawn(dispatcher.run(command_rx, done_rx));
        info!(%orchestrator_id, %level, workspace = %workspace_dir.display(), "Orchestrator initialized");

        Ok(Self {
            orchestrator_id,
            commands,
            writer,
            autonomy,
            state,
            workspace_dir: workspace_dir.to_path_buf(),
        })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> OverseerResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| OverseerError::Shutdown)?;
        rx.await.map_err(|_| OverseerError::Shutdown)
    }

    /// `orchestrator_<8 hex>`, fresh for every instance.
    pub fn id(&self) -> &str {
        &self.orchestrator_id
    }

    /// Root of the workspace this orchestrator persists under.
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// The shared autonomy controller, for approve/revoke and reports.
    pub fn autonomy(&self) -> &Arc<AutonomyController> {
        &self.autonomy
    }

    /// The shared snapshot manager.
    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Add an agent to the registry. Names must be unique.
    pub async fn register_agent(&self, agent: Arc<AgentRuntime>) -> OverseerResult<AgentId> {
        self.request(|reply| Command::Register { agent, reply }).await?
    }

    /// Remove an agent. Tasks routed to it later fail at dispatch.
    pub async fn unregister_agent(&self, agent_id: &AgentId) -> OverseerResult<bool> {
        let agent_id = agent_id.clone();
        self.request(|reply| Command::Unregister { agent_id, reply })
            .await
    }

    /// Queue a task, or park it for approval when the submission, the
    /// autonomy level or the policy for its operation category demands it.
    pub async fn submit(&self, submission: TaskSubmission) -> OverseerResult<TaskId> {
        let submission = Box::new(submission);
        self.request(|reply| Command::Submit { submission, reply })
            .await?
    }

    /// Release a pending task. False when the id is not pending.
    pub async fn approve(&self, task_id: &TaskId) -> OverseerResult<bool> {
        let task_id = task_id.clone();
        self.request(|reply| Command::Approve { task_id, reply }).await
    }

    /// Cancel a pending task with `reason`. False when the id is not pending.
    pub async fn reject(&self, task_id: &TaskId, reason: &str) -> OverseerResult<bool> {
        let task_id = task_id.clone();
        let reason = reason.to_string();
        self.request(|reply| Command::Reject {
            task_id,
            reason,
            reply,
        })
        .await
    }

    /// Tasks waiting for approval, in submission order.
    pub async fn pending_approvals(&self) -> OverseerResult<Vec<TaskRecord>> {
        self.request(|reply| Command::Pending { reply }).await
    }

    /// Current autonomy level.
    pub fn autonomy_level(&self) -> AutonomyLevel {
        self.autonomy.level()
    }

    /// Change the level. Tasks already pending or queued keep their gate.
    pub async fn set_autonomy_level(&self, level: AutonomyLevel) -> OverseerResult<()> {
        self.autonomy.set_level(level).await?;
        self.persist().await
    }

    /// Begin dispatching and start the monitor loop.
    pub async fn start(&self) -> OverseerResult<()> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Stop dispatching. Tasks already running finish and are recorded.
    pub async fn stop(&self) -> OverseerResult<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Running flag, level, agent statuses and task counters.
    pub async fn status(&self) -> OverseerResult<OrchestratorStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Look a task up among live tasks, then in the completed history.
    pub async fn task_status(&self, task_id: &TaskId) -> OverseerResult<Option<TaskRecord>> {
        let task_id = task_id.clone();
        self.request(|reply| Command::Task { task_id, reply }).await
    }

    /// Write the orchestrator document and wait until it is on disk.
    pub async fn persist(&self) -> OverseerResult<()> {
        self.request(|reply| Command::Persist { reply: Some(reply) })
            .await?;
        self.writer.flush().await;
        Ok(())
    }

    /// Stop the dispatcher for good. Later calls fail with
    /// [`OverseerError::Shutdown`].
    pub async fn shutdown(&self) -> OverseerResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await?;
        self.writer.flush().await;
        Ok(())
    }

    /// Poll until `task_id` reaches a terminal status or `timeout` passes.
    /// Returns the last record seen.
    pub async fn wait_for_task(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> OverseerResult<Option<TaskRecord>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let record = self.task_status(task_id).await?;
            let terminal = record.as_ref().is_some_and(|r| r.status.is_terminal());
            if terminal || tokio::time::Instant::now() >= deadline {
                return Ok(record);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Persist the orchestrator document, then snapshot the state directory.
    pub async fn create_snapshot(
        &self,
        label: Option<&str>,
        increment: Increment,
    ) -> OverseerResult<Version> {
        self.persist().await?;
        self.state.create_snapshot(label, increment).await
    }

    /// Restore a snapshot and reload policy and task state from it.
    ///
    /// Only allowed while stopped with nothing in flight. Agents stay
    /// registered. Returns false when the version is unknown or its
    /// snapshot is missing.
    pub async fn restore_snapshot(&self, version: Version) -> OverseerResult<bool> {
        let status = self.status().await?;
        if status.running || status.tasks.active > 0 {
            return Err(OverseerError::Orchestrator(
                "stop the orchestrator and let running tasks finish before restoring".into(),
            ));
        }

        self.persist().await?;
        if !self.state.restore_snapshot(version).await? {
            return Ok(false);
        }

        let level = self.autonomy.reload().await?;
        let document = OrchestratorStateDocument::load(&self.workspace_dir)
            .await
            .map(Box::new);
        self.request(|reply| Command::Reload { document, reply })
            .await?;
        info!(%version, %level, "Orchestrator restored from snapshot");
        Ok(true)
    }

    /// Recorded snapshot versions, oldest first.
    pub async fn version_history(&self) -> Vec<VersionEntry> {
        self.state.version_history().await
    }

    /// Check every document under the state directory parses.
    pub async fn validate_state(&self) -> OverseerResult<StateValidation> {
        self.state.validate_state().await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("orchestrator_id", &self.orchestrator_id)
            .field("workspace_dir", &self.workspace_dir)
            .finish()
    }
}
