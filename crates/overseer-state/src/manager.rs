use crate::files::{
    collect_json_files, copy_files, hash_files, remove_dir_if_exists, snapshot_dir_versions,
};
use crate::index::{VersionEntry, VersionIndex};
use crate::report::{
    humanize_seconds, FileCheck, IssueKind, StateValidation, ValidationIssue, VersionDiff,
};
use crate::version::{Increment, Version};
use chrono::Utc;
use overseer_core::storage::{read_json, write_json_atomic};
use overseer_core::{OverseerError, OverseerResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Versioned snapshots of every JSON document under `<workspace>/state/`.
///
/// Snapshots live in `<workspace>/backups/system/v<version>/` and are
/// indexed by `<workspace>/backups/system/versions.json`. The index sits
/// outside the state directory, so it is neither captured nor replaced.
///
/// Restores swap whole directories and assume no other writer is active
/// in the state directory at the time.
pub struct StateManager {
    state_dir: PathBuf,
    backup_dir: PathBuf,
    index_file: PathBuf,
    index: Mutex<VersionIndex>,
}

impl StateManager {
    /// Open the manager for `workspace_dir`, creating the state and backup
    /// directories. An unreadable version index is logged and replaced by an
    /// empty one.
    pub async fn new(workspace_dir: &Path) -> OverseerResult<Self> {
        let state_dir = workspace_dir.join("state");
        let backup_dir = workspace_dir.join("backups").join("system");
        tokio::fs::create_dir_all(&state_dir).await?;
        tokio::fs::create_dir_all(&backup_dir).await?;

        let index_file = backup_dir.join("versions.json");
        let index = match read_json::<VersionIndex>(&index_file).await {
            Ok(Some(index)) => index,
            Ok(None) => VersionIndex::default(),
            Err(e) => {
                warn!(path = %index_file.display(), error = %e, "Version index unreadable, starting empty");
                VersionIndex::default()
            }
        };

        Ok(Self {
            state_dir,
            backup_dir,
            index_file,
            index: Mutex::new(index),
        })
    }

    /// `<workspace>/state/`.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Latest recorded version, or [`Version::INITIAL`].
    pub async fn current_version(&self) -> Version {
        self.index.lock().await.current_version
    }

    /// All recorded versions, oldest first.
    pub async fn version_history(&self) -> Vec<VersionEntry> {
        self.index.lock().await.versions.clone()
    }

    /// Version most recently restored, if any.
    pub async fn restored_from(&self) -> Option<Version> {
        self.index.lock().await.restored_from
    }

    /// Capture the state directory as the next version.
    pub async fn create_snapshot(
        &self,
        label: Option<&str>,
        increment: Increment,
    ) -> OverseerResult<Version> {
        self.create_snapshot_with_metadata(label, increment, BTreeMap::new())
            .await
    }

    /// [`create_snapshot`](Self::create_snapshot) with caller metadata on the entry.
    pub async fn create_snapshot_with_metadata(
        &self,
        label: Option<&str>,
        increment: Increment,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> OverseerResult<Version> {
        let mut index = self.index.lock().await;
        let entry = self
            .snapshot_locked(&mut index, label.map(str::to_string), increment, metadata)
            .await?;
        Ok(entry.version)
    }

    async fn snapshot_locked(
        &self,
        index: &mut VersionIndex,
        label: Option<String>,
        increment: Increment,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> OverseerResult<VersionEntry> {
        // Snapshots are never overwritten: number past anything on disk,
        // even versions a lost index no longer lists.
        let mut base = index.current_version;
        if let Some(highest) = snapshot_dir_versions(&self.backup_dir).await?.pop() {
            if highest > base {
                warn!(%highest, indexed = %base, "Snapshot directories ahead of the version index");
                base = highest;
            }
        }
        let version = base.bump(increment);
        let files = collect_json_files(&self.state_dir).await?;

        let snapshot_dir = self.backup_dir.join(format!("v{version}"));
        if let Err(e) = copy_files(&files, &snapshot_dir).await {
            let _ = remove_dir_if_exists(&snapshot_dir).await;
            return Err(e);
        }
        // Hash the copies so the recorded hash matches what a restore brings back.
        let copied = collect_json_files(&snapshot_dir).await?;
        let state_hash = hash_files(&copied).await?;

        let entry = VersionEntry {
            version,
            label,
            timestamp: Utc::now(),
            increment,
            state_hash,
            file_count: copied.len(),
            metadata,
            snapshot_dir,
        };

        index.versions.push(entry.clone());
        index.current_version = version;
        self.save_index(index).await?;

        info!(
            version = %version,
            files = entry.file_count,
            label = entry.label.as_deref().unwrap_or(""),
            "State snapshot created"
        );
        Ok(entry)
    }

    /// Replace the state directory with the contents of `version`.
    ///
    /// Returns `Ok(false)` without touching anything when the version is
    /// unknown or its snapshot directory is gone. Otherwise a safety
    /// snapshot of the current state is taken first, and the snapshot is
    /// staged next to the state directory and swapped in by rename.
    pub async fn restore_snapshot(&self, version: Version) -> OverseerResult<bool> {
        let mut index = self.index.lock().await;

        let Some(entry) = index.find(version).cloned() else {
            warn!(%version, "Restore requested for unknown version");
            return Ok(false);
        };
        if !entry.snapshot_dir.is_dir() {
            warn!(%version, dir = %entry.snapshot_dir.display(), "Snapshot directory missing");
            return Ok(false);
        }

        let safety = self
            .snapshot_locked(
                &mut index,
                Some(format!("Before restore to v{version}")),
                Increment::Patch,
                BTreeMap::new(),
            )
            .await?;

        let staging = sibling(&self.state_dir, "restore-staging");
        let trash = sibling(&self.state_dir, "restore-trash");
        remove_dir_if_exists(&staging).await?;
        remove_dir_if_exists(&trash).await?;

        let files = collect_json_files(&entry.snapshot_dir).await?;
        if let Err(e) = copy_files(&files, &staging).await {
            error!(%version, error = %e, "Failed to stage snapshot, state left untouched");
            let _ = remove_dir_if_exists(&staging).await;
            return Err(e);
        }

        tokio::fs::rename(&self.state_dir, &trash).await?;
        if let Err(e) = tokio::fs::rename(&staging, &self.state_dir).await {
            error!(%version, error = %e, "Failed to swap in snapshot, rolling back");
            tokio::fs::rename(&trash, &self.state_dir).await?;
            let _ = remove_dir_if_exists(&staging).await;
            return Err(e.into());
        }
        if let Err(e) = remove_dir_if_exists(&trash).await {
            warn!(dir = %trash.display(), error = %e, "Failed to remove replaced state directory");
        }

        index.restored_from = Some(version);
        self.save_index(&mut index).await?;

        info!(%version, safety_version = %safety.version, files = files.len(), "State restored");
        Ok(true)
    }

    /// Hash of the live state directory, computed the same way snapshots are.
    pub async fn current_state_hash(&self) -> OverseerResult<String> {
        let files = collect_json_files(&self.state_dir).await?;
        hash_files(&files).await
    }

    /// Compare two recorded versions file by file.
    pub async fn get_version_diff(&self, v1: Version, v2: Version) -> OverseerResult<VersionDiff> {
        let (e1, e2) = {
            let index = self.index.lock().await;
            let find = |v: Version| {
                index
                    .find(v)
                    .cloned()
                    .ok_or_else(|| OverseerError::UnknownVersion(v.to_string()))
            };
            (find(v1)?, find(v2)?)
        };

        let files1 = collect_json_files(&e1.snapshot_dir).await?;
        let files2 = collect_json_files(&e2.snapshot_dir).await?;

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changed = Vec::new();
        for (rel, path2) in &files2 {
            match files1.get(rel) {
                None => added.push(rel.clone()),
                Some(path1) => {
                    if tokio::fs::read(path1).await? != tokio::fs::read(path2).await? {
                        changed.push(rel.clone());
                    }
                }
            }
        }
        for rel in files1.keys() {
            if !files2.contains_key(rel) {
                removed.push(rel.clone());
            }
        }

        let elapsed_seconds = (e2.timestamp - e1.timestamp).num_seconds().abs();
        Ok(VersionDiff {
            version1: v1,
            version2: v2,
            elapsed_seconds,
            elapsed: humanize_seconds(elapsed_seconds),
            hash_changed: e1.state_hash != e2.state_hash,
            file_count_diff: e2.file_count as i64 - e1.file_count as i64,
            added,
            removed,
            changed,
        })
    }

    /// Check that every state document parses as JSON. Read-only.
    pub async fn validate_state(&self) -> OverseerResult<StateValidation> {
        let files = collect_json_files(&self.state_dir).await?;
        let mut checks = Vec::with_capacity(files.len());
        let mut issues = Vec::new();

        for path in files.values() {
            let issue = match tokio::fs::read(path).await {
                Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes)
                    .err()
                    .map(|e| (IssueKind::InvalidJson, e.to_string())),
                Err(e) => Some((IssueKind::ReadError, e.to_string())),
            };
            checks.push(FileCheck {
                file: path.clone(),
                valid: issue.is_none(),
            });
            if let Some((kind, details)) = issue {
                issues.push(ValidationIssue {
                    file: path.clone(),
                    kind,
                    details,
                });
            }
        }

        Ok(StateValidation {
            valid: issues.is_empty(),
            files_checked: files.len(),
            files: checks,
            issues,
            current_version: self.current_version().await,
        })
    }

    /// Keep the `keep` newest snapshots (plus the current version's) and
    /// delete the rest. Returns the number of snapshots removed.
    pub async fn cleanup_old_snapshots(&self, keep: usize) -> OverseerResult<usize> {
        let mut index = self.index.lock().await;
        if index.versions.len() <= keep {
            return Ok(0);
        }

        let current = index.current_version;
        let mut by_age: Vec<VersionEntry> = index.versions.clone();
        by_age.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.version.cmp(&a.version)));

        let (mut kept, mut dropped): (Vec<_>, Vec<_>) = (Vec::new(), Vec::new());
        for (i, entry) in by_age.into_iter().enumerate() {
            if i < keep || entry.version == current {
                kept.push(entry);
            } else {
                dropped.push(entry);
            }
        }

        for entry in &dropped {
            if let Err(e) = remove_dir_if_exists(&entry.snapshot_dir).await {
                warn!(version = %entry.version, error = %e, "Failed to delete snapshot directory");
            }
        }

        kept.sort_by_key(|e| e.version);
        index.versions = kept;
        self.save_index(&mut index).await?;

        info!(removed = dropped.len(), kept = index.versions.len(), "Old snapshots cleaned up");
        Ok(dropped.len())
    }

    async fn save_index(&self, index: &mut VersionIndex) -> OverseerResult<()> {
        index.last_updated = Some(Utc::now());
        write_json_atomic(&self.index_file, index).await
    }
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    dir.with_file_name(format!("{name}.{suffix}"))
}
