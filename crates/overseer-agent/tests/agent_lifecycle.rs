#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use overseer_agent::{
    AgentRecord, AgentRuntime, ProgressReporter, Recovery, TaskRequest, Worker,
};
use overseer_core::{AgentId, AgentState, TaskId};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Fails whenever `params.fail` is true; recovers when `params.recoverable` is true.
struct Flaky;

#[async_trait]
impl Worker for Flaky {
    fn kind(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, task: &TaskRequest, _progress: &ProgressReporter) -> anyhow::Result<Value> {
        if task.params["fail"].as_bool().unwrap_or(false) {
            anyhow::bail!("simulated failure in {}", task.id);
        }
        Ok(json!({"ok": task.id.as_str()}))
    }

    async fn recover(&self, task: &TaskRequest, error: &anyhow::Error) -> Recovery {
        if task.params["recoverable"].as_bool().unwrap_or(false) {
            Recovery::Recovered(json!({"recovered_from": error.to_string()}))
        } else {
            Recovery::Unrecovered {
                reason: "not recoverable".into(),
            }
        }
    }
}

/// Blocks inside `execute` until released, so on-disk state can be observed mid-task.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Worker for Gate {
    fn kind(&self) -> &str {
        "gate"
    }

    async fn execute(&self, _task: &TaskRequest, progress: &ProgressReporter) -> anyhow::Result<Value> {
        progress.report(40.0, Some("waiting at gate")).await;
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Value::Null)
    }
}

/// Tracks how many executions overlap.
struct Overlap {
    running: AtomicUsize,
    max_seen: AtomicUsize,
}

#[async_trait]
impl Worker for Overlap {
    fn kind(&self) -> &str {
        "overlap"
    }

    async fn execute(&self, _task: &TaskRequest, _progress: &ProgressReporter) -> anyhow::Result<Value> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Value::Null)
    }
}

fn task(id: &str, params: Value) -> TaskRequest {
    TaskRequest::new(TaskId::from(id), params)
}

async fn read_state(ws: &Path, id: &AgentId) -> AgentRecord {
    let path = ws.join("state").join(id.as_str()).join("current_state.json");
    let raw = tokio::fs::read_to_string(path).await.unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Recovery paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recovered_failure_completes_with_recovered_result() {
    let dir = tempfile::tempdir().unwrap();
    let agent = AgentRuntime::new("flaky", Arc::new(Flaky), dir.path()).await.unwrap();

    let result = agent
        .execute(task("t1", json!({"fail": true, "recoverable": true})), true)
        .await;

    assert!(result.is_success());
    assert!(result.recovered);
    assert_eq!(
        result.output.unwrap()["recovered_from"],
        json!("simulated failure in t1")
    );
    let record = agent.record();
    assert_eq!(record.state, AgentState::Completed);
    assert!(record.current_task.is_none());
    assert_eq!(record.error_history.len(), 1);
    assert_eq!(record.task_history.len(), 1);
}

#[tokio::test]
async fn unrecovered_failure_stays_in_error() {
    let dir = tempfile::tempdir().unwrap();
    let agent = AgentRuntime::new("flaky", Arc::new(Flaky), dir.path()).await.unwrap();

    let result = agent.execute(task("t1", json!({"fail": true})), true).await;

    assert!(!result.is_success());
    assert!(result.traceback.is_some());
    assert_eq!(agent.state(), AgentState::Error);
    assert!(agent.record().current_task.is_none());
    assert!(!agent.health_check().healthy);
}

#[tokio::test]
async fn recovery_is_skipped_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let agent = AgentRuntime::new("flaky", Arc::new(Flaky), dir.path()).await.unwrap();

    let result = agent
        .execute(task("t1", json!({"fail": true, "recoverable": true})), false)
        .await;

    assert!(!result.is_success());
    assert!(!result.recovered);
    assert_eq!(agent.state(), AgentState::Error);
}

// ---------------------------------------------------------------------------
// 2. Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_state_is_on_disk_while_task_executes() {
    let dir = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let worker = Arc::new(Gate {
        entered: entered.clone(),
        release: release.clone(),
    });
    let agent = Arc::new(AgentRuntime::new("gate", worker, dir.path()).await.unwrap());
    let id = agent.id().clone();

    let runner = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.execute(task("slow", Value::Null), false).await })
    };
    entered.notified().await;

    let mid = read_state(dir.path(), &id).await;
    assert_eq!(mid.state, AgentState::Running);
    assert_eq!(mid.current_task.unwrap().id.as_str(), "slow");
    assert_eq!(mid.progress, 40.0);

    release.notify_one();
    assert!(runner.await.unwrap().is_success());

    let done = read_state(dir.path(), &id).await;
    assert_eq!(done.state, AgentState::Completed);
    assert!(done.current_task.is_none());
}

#[tokio::test]
async fn state_survives_restart_with_same_id() {
    let dir = tempfile::tempdir().unwrap();
    let id = AgentId::from("flaky_cafef00d");
    {
        let agent = AgentRuntime::with_id(id.clone(), "flaky", Arc::new(Flaky), dir.path())
            .await
            .unwrap();
        agent.execute(task("t1", Value::Null), false).await;
        agent.execute(task("t2", json!({"fail": true})), false).await;
        agent.set_metadata("team", json!("infra")).await;
    }

    let agent = AgentRuntime::with_id(id, "flaky", Arc::new(Flaky), dir.path())
        .await
        .unwrap();
    let status = agent.status();
    assert_eq!(status.state, AgentState::Error);
    assert_eq!(status.statistics.tasks_completed, 1);
    assert_eq!(status.statistics.tasks_failed, 1);
    assert_eq!(status.metadata["team"], json!("infra"));
}

#[tokio::test]
async fn rollback_restores_earlier_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let agent = AgentRuntime::new("flaky", Arc::new(Flaky), dir.path()).await.unwrap();

    agent.set_metadata("phase", json!("one")).await;
    let snapshots = agent.list_snapshots().await.unwrap();
    let marker = snapshots.last().unwrap().clone();

    agent.execute(task("t1", json!({"fail": true})), false).await;
    agent.set_metadata("phase", json!("two")).await;
    assert_eq!(agent.state(), AgentState::Error);

    assert!(agent.rollback_to_snapshot(&marker).await.unwrap());
    let status = agent.status();
    assert_eq!(status.state, AgentState::Idle);
    assert_eq!(status.metadata["phase"], json!("one"));

    assert!(!agent.rollback_to_snapshot("no-such-snapshot").await.unwrap());
}

#[tokio::test]
async fn snapshot_names_are_chronological() {
    let dir = tempfile::tempdir().unwrap();
    let agent = AgentRuntime::new("flaky", Arc::new(Flaky), dir.path()).await.unwrap();
    for i in 0..5 {
        agent.execute(task(&format!("t{i}"), Value::Null), false).await;
    }

    let names = agent.list_snapshots().await.unwrap();
    assert!(names.len() >= 10);
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert!(names.iter().all(|n| n.starts_with("snapshot_") && n.ends_with(".json")));
}

// ---------------------------------------------------------------------------
// 3. Serialized execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_calls_on_one_agent_do_not_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let worker = Arc::new(Overlap {
        running: AtomicUsize::new(0),
        max_seen: AtomicUsize::new(0),
    });
    let agent = Arc::new(
        AgentRuntime::new("overlap", worker.clone(), dir.path())
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..4 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            agent.execute(task(&format!("t{i}"), Value::Null), false).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    assert_eq!(worker.max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(agent.record().task_history.len(), 4);
}
