//! `overseer run`: task plans executed by built-in echo agents.

use async_trait::async_trait;
use overseer_agent::{AgentRuntime, ProgressReporter, TaskRequest, Worker};
use overseer_autonomy::OperationContext;
use overseer_core::{OperationCategory, Priority, TaskId};
use overseer_orchestrator::{Orchestrator, TaskRecord, TaskSubmission};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A TOML task plan.
///
/// ```toml
/// timeout_secs = 60
///
/// [[tasks]]
/// id = "fetch"
/// agent = "fetcher"
/// priority = "high"
///
/// [[tasks]]
/// id = "report"
/// agent = "writer"
/// depends_on = ["fetch"]
/// params = { sleep_ms = 100 }
/// ```
#[derive(Debug, Deserialize)]
pub struct Plan {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub tasks: Vec<PlannedTask>,
}

#[derive(Debug, Deserialize)]
pub struct PlannedTask {
    pub id: String,
    pub agent: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub operation: Option<OperationCategory>,
    /// Target path, checked against protected paths when `operation` is set.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Plan {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read plan '{}': {}", path.display(), e))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let plan: Plan = toml::from_str(raw)?;
        if plan.tasks.is_empty() {
            anyhow::bail!("Plan contains no tasks");
        }
        Ok(plan)
    }

    /// Distinct agent names referenced by the plan.
    pub fn agents(&self) -> BTreeSet<&str> {
        self.tasks.iter().map(|t| t.agent.as_str()).collect()
    }
}

impl PlannedTask {
    fn submission(&self) -> TaskSubmission {
        let mut submission = TaskSubmission::new(self.agent.as_str())
            .with_id(self.id.as_str())
            .with_priority(self.priority)
            .with_dependencies(self.depends_on.iter().map(|d| TaskId::from(d.as_str())).collect())
            .with_params(self.params.clone().unwrap_or(Value::Null));
        if let Some(name) = &self.name {
            submission = submission.with_name(name.as_str());
        }
        if self.requires_approval {
            submission = submission.requiring_approval();
        }
        if let Some(op) = self.operation {
            submission = submission.with_operation(op);
            if let Some(path) = &self.path {
                submission = submission.with_context(OperationContext::new().with_path(path.as_str()));
            }
        }
        submission
    }
}

/// Echoes its task back. `params.sleep_ms` delays the answer and
/// `params.fail = true` makes the task fail.
pub struct EchoWorker {
    agent: String,
}

impl EchoWorker {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
        }
    }
}

#[async_trait]
impl Worker for EchoWorker {
    fn kind(&self) -> &str {
        "echo"
    }

    async fn execute(&self, task: &TaskRequest, progress: &ProgressReporter) -> anyhow::Result<Value> {
        progress.report(50.0, Some("echoing")).await;
        if let Some(ms) = task.params["sleep_ms"].as_u64() {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if task.params["fail"].as_bool().unwrap_or(false) {
            anyhow::bail!("{} asked to fail", task.label());
        }
        Ok(json!({
            "agent": self.agent,
            "task": task.label(),
            "params": task.params,
        }))
    }
}

/// Register echo agents, submit the plan and run until every task is
/// terminal, nothing else can make progress, or the plan timeout passes.
pub async fn run_plan(
    orchestrator: &Orchestrator,
    plan: &Plan,
    auto_approve: bool,
) -> anyhow::Result<Vec<TaskRecord>> {
    let workspace = orchestrator.workspace_dir().to_path_buf();
    for agent in plan.agents() {
        let runtime = AgentRuntime::new(agent, Arc::new(EchoWorker::new(agent)), &workspace).await?;
        orchestrator.register_agent(Arc::new(runtime)).await?;
    }

    let mut ids = Vec::with_capacity(plan.tasks.len());
    for task in &plan.tasks {
        ids.push(orchestrator.submit(task.submission()).await?);
    }
    if auto_approve {
        for pending in orchestrator.pending_approvals().await? {
            orchestrator.approve(&pending.task_id).await?;
        }
    }

    orchestrator.start().await?;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(plan.timeout_secs);
    loop {
        let status = orchestrator.status().await?;
        if status.tasks.active == 0 && status.tasks.queued == 0 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(timeout_secs = plan.timeout_secs, "Plan timed out");
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    orchestrator.stop().await?;

    let mut records = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(record) = orchestrator.task_status(id).await? {
            records.push(record);
        }
    }
    info!(tasks = records.len(), "Plan finished");
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use overseer_core::TaskStatus;
    use overseer_orchestrator::OrchestratorConfig;

    const PLAN: &str = r#"
timeout_secs = 10

[[tasks]]
id = "fetch"
agent = "fetcher"
priority = "high"

[[tasks]]
id = "report"
agent = "writer"
depends_on = ["fetch"]
params = { sleep_ms = 5, topic = "weekly" }

[[tasks]]
id = "push"
agent = "writer"
operation = "git_push"

[[tasks]]
id = "broken"
agent = "fetcher"
params = { fail = true }

[[tasks]]
id = "after-broken"
agent = "writer"
depends_on = ["broken"]
"#;

    fn status_of<'a>(records: &'a [TaskRecord], id: &str) -> &'a TaskRecord {
        records.iter().find(|r| r.task_id.as_str() == id).unwrap()
    }

    #[test]
    fn test_parse() {
        let plan = Plan::parse(PLAN).unwrap();
        assert_eq!(plan.tasks.len(), 5);
        assert_eq!(plan.agents().into_iter().collect::<Vec<_>>(), vec!["fetcher", "writer"]);
        assert_eq!(plan.tasks[0].priority, Priority::High);
        assert_eq!(plan.tasks[2].operation, Some(OperationCategory::GitPush));
        assert_eq!(plan.tasks[1].params.as_ref().unwrap()["topic"], "weekly");
        assert!(Plan::parse("timeout_secs = 3").is_err());
    }

    #[tokio::test]
    async fn test_run_plan() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(dir.path(), OrchestratorConfig::default())
            .await
            .unwrap();
        let plan = Plan::parse(PLAN).unwrap();

        let records = run_plan(&orch, &plan, false).await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(status_of(&records, "fetch").status, TaskStatus::Completed);
        let report = status_of(&records, "report");
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(
            report.result.as_ref().unwrap().output.as_ref().unwrap()["agent"],
            "writer"
        );
        assert_eq!(status_of(&records, "push").status, TaskStatus::WaitingApproval);
        assert_eq!(status_of(&records, "broken").status, TaskStatus::Failed);
        assert_eq!(status_of(&records, "after-broken").status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn test_auto_approve() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(dir.path(), OrchestratorConfig::default())
            .await
            .unwrap();
        let plan = Plan::parse(PLAN).unwrap();
        let records = run_plan(&orch, &plan, true).await.unwrap();
        assert_eq!(status_of(&records, "push").status, TaskStatus::Completed);
    }
}
