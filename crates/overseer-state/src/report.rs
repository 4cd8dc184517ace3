use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Comparison of two recorded versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    /// Older side of the comparison.
    pub version1: Version,
    /// Newer side of the comparison.
    pub version2: Version,
    /// Absolute time between the two snapshots.
    pub elapsed_seconds: i64,
    /// `elapsed_seconds` as a coarse human string, e.g. `"3 minutes"`.
    pub elapsed: String,
    /// Whether the state hashes differ.
    pub hash_changed: bool,
    /// `file_count(version2) - file_count(version1)`.
    pub file_count_diff: i64,
    /// Files only in `version2`.
    pub added: Vec<PathBuf>,
    /// Files only in `version1`.
    pub removed: Vec<PathBuf>,
    /// Files in both whose bytes differ.
    pub changed: Vec<PathBuf>,
}

/// Why a state file failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The file does not parse as JSON.
    InvalidJson,
    /// The file could not be read.
    ReadError,
}

/// One problem found by validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path relative to the state directory.
    pub file: PathBuf,
    /// What went wrong.
    pub kind: IssueKind,
    /// Parser or I/O message.
    pub details: String,
}

/// Per-file validation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCheck {
    /// Path relative to the state directory.
    pub file: PathBuf,
    /// True when the file parsed.
    pub valid: bool,
}

/// Result of [`StateManager::validate_state`](crate::StateManager::validate_state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateValidation {
    /// True when every file parsed.
    pub valid: bool,
    /// Number of files inspected.
    pub files_checked: usize,
    /// Verdict per file.
    pub files: Vec<FileCheck>,
    /// Problems found, if any.
    pub issues: Vec<ValidationIssue>,
    /// Latest recorded snapshot version.
    pub current_version: Version,
}

pub(crate) fn humanize_seconds(secs: i64) -> String {
    let secs = secs.abs();
    match secs {
        s if s < 60 => format!("{s} seconds"),
        s if s < 3_600 => format!("{} minutes", s / 60),
        s if s < 86_400 => format!("{} hours", s / 3_600),
        s => format!("{} days", s / 86_400),
    }
}
