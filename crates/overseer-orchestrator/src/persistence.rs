use crate::types::{AgentSummary, TaskRecord};
use chrono::{DateTime, Utc};
use overseer_core::storage::{read_json, write_json_atomic};
use overseer_core::{AgentId, AutonomyLevel, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// The orchestrator's aggregate state as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStateDocument {
    /// Instance that wrote the document.
    pub orchestrator_id: String,
    /// Policy level at the time of the write. Informational; the
    /// autonomy policy document is authoritative.
    pub autonomy_level: AutonomyLevel,
    /// Registered agents.
    #[serde(default)]
    pub agents: BTreeMap<AgentId, AgentSummary>,
    /// Tasks running at the time of the write.
    #[serde(default)]
    pub active_tasks: BTreeMap<TaskId, TaskRecord>,
    /// Retained terminal tasks, oldest first.
    #[serde(default)]
    pub completed_tasks: Vec<TaskRecord>,
    /// Tasks waiting for a decision.
    #[serde(default)]
    pub pending_approval: Vec<TaskRecord>,
    /// Time of the write.
    pub timestamp: DateTime<Utc>,
}

impl OrchestratorStateDocument {
    /// `<workspace>/state/orchestrator_state.json`.
    pub fn path(workspace_dir: &Path) -> PathBuf {
        workspace_dir.join("state").join("orchestrator_state.json")
    }

    /// Read a previous document. Missing or corrupt documents yield `None`.
    pub async fn load(workspace_dir: &Path) -> Option<Self> {
        let path = Self::path(workspace_dir);
        match read_json::<Self>(&path).await {
            Ok(Some(doc)) => {
                debug!(orchestrator_id = %doc.orchestrator_id, "Loaded orchestrator state");
                Some(doc)
            }
            Ok(None) => None,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load orchestrator state, starting fresh");
                None
            }
        }
    }
}

enum WriterMsg {
    Write(Box<OrchestratorStateDocument>),
    Flush(oneshot::Sender<()>),
}

/// Background writer for the orchestrator state document.
///
/// Writes queued while a previous write is in progress are coalesced and
/// only the newest document reaches disk.
#[derive(Clone)]
pub(crate) struct StateWriter {
    tx: mpsc::UnboundedSender<WriterMsg>,
}

impl StateWriter {
    pub(crate) fn spawn(path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterMsg>();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let mut latest = None;
                let mut waiters = Vec::new();
                let mut absorb = |msg: WriterMsg| match msg {
                    WriterMsg::Write(doc) => latest = Some(doc),
                    WriterMsg::Flush(reply) => waiters.push(reply),
                };
                absorb(msg);
                while let Ok(msg) = rx.try_recv() {
                    absorb(msg);
                }

                if let Some(doc) = latest {
                    if let Err(e) = write_json_atomic(&path, &doc).await {
                        error!(path = %path.display(), error = %e, "Failed to persist orchestrator state");
                    }
                }
                for reply in waiters {
                    let _ = reply.send(());
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn write(&self, doc: OrchestratorStateDocument) {
        if self.tx.send(WriterMsg::Write(Box::new(doc))).is_err() {
            warn!("State writer stopped, orchestrator state not persisted");
        }
    }

    /// Wait until every document sent before this call is on disk.
    pub(crate) async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(WriterMsg::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }
}
