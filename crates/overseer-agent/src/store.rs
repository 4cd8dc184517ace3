use crate::record::AgentRecord;
use chrono::Utc;
use overseer_core::storage::{read_json, write_json_atomic};
use overseer_core::{AgentId, OverseerResult};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// JSON persistence for one agent: the current-state document plus an
/// append-only trail of timestamped snapshot documents.
///
/// Layout under the workspace:
/// - `state/<agent_id>/current_state.json`
/// - `backups/<agent_id>/snapshot_<timestamp>_<seq>.json`
pub struct AgentStore {
    state_file: PathBuf,
    backup_dir: PathBuf,
    // Serializes writers and numbers snapshots written within one timestamp tick.
    seq: Mutex<u64>,
}

impl AgentStore {
    /// Paths for `agent_id` under `workspace_dir`. Nothing is created yet.
    pub fn new(workspace_dir: &Path, agent_id: &AgentId) -> Self {
        Self {
            state_file: workspace_dir
                .join("state")
                .join(agent_id.as_str())
                .join("current_state.json"),
            backup_dir: workspace_dir.join("backups").join(agent_id.as_str()),
            seq: Mutex::new(0),
        }
    }

    /// Create the state and backup directories.
    pub async fn ensure_dirs(&self) -> OverseerResult<()> {
        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::create_dir_all(&self.backup_dir).await?;
        Ok(())
    }

    /// `<workspace>/state/<agent_id>/current_state.json`.
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Load the current-state document, if one was written before.
    pub async fn load(&self) -> OverseerResult<Option<AgentRecord>> {
        read_json(&self.state_file).await
    }

    /// Write the current-state document and append a snapshot of it.
    /// Returns the snapshot path.
    pub async fn save(&self, record: &AgentRecord) -> OverseerResult<PathBuf> {
        let mut seq = self.seq.lock().await;
        write_json_atomic(&self.state_file, record).await?;

        *seq += 1;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let snapshot = self
            .backup_dir
            .join(format!("snapshot_{timestamp}_{:04}.json", *seq));
        write_json_atomic(&snapshot, record).await?;
        Ok(snapshot)
    }

    /// Snapshot files, oldest first.
    pub async fn list_snapshots(&self) -> OverseerResult<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.backup_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("snapshot_") && name.ends_with(".json") {
                    entries.push(path);
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    /// First snapshot (oldest first) whose file name contains `fragment`.
    pub async fn find_snapshot(&self, fragment: &str) -> OverseerResult<Option<PathBuf>> {
        let snapshots = self.list_snapshots().await?;
        Ok(snapshots.into_iter().find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.contains(fragment))
        }))
    }

    /// Parse one snapshot file.
    pub async fn load_snapshot(&self, path: &Path) -> OverseerResult<Option<AgentRecord>> {
        read_json(path).await
    }
}
