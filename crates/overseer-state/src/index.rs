use crate::version::{Increment, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One snapshot in the version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Version this snapshot was recorded as.
    pub version: Version,
    /// Caller-supplied label.
    pub label: Option<String>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Component bumped to reach `version`.
    pub increment: Increment,
    /// SHA-256 over the path-sorted bytes of every captured file.
    pub state_hash: String,
    /// Number of captured files.
    pub file_count: usize,
    /// Caller metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// `<workspace>/backups/system/v<version>/`.
    pub snapshot_dir: PathBuf,
}

/// The persisted version index document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionIndex {
    /// Latest version recorded.
    pub current_version: Version,
    /// Every retained snapshot, oldest first.
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
    /// Version most recently restored, if any.
    #[serde(default)]
    pub restored_from: Option<Version>,
    /// Time of the last index write.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl VersionIndex {
    /// The entry recorded as `version`.
    pub fn find(&self, version: Version) -> Option<&VersionEntry> {
        self.versions.iter().find(|e| e.version == version)
    }
}
