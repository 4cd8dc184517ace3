//! Autonomy and operation-risk vocabulary for human-oversight policy.
//!
//! These types live in `overseer-core` so that both `overseer-autonomy`
//! (which decides whether an operation needs approval) and
//! `overseer-orchestrator` (which parks tasks pending approval) can share
//! them without a dependency between the two.

use crate::error::OverseerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// System-wide autonomy tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Every action requires approval.
    Manual,
    /// Pre-approved categories may run; high-risk ones still need approval.
    #[default]
    SemiAuto,
    /// Full autonomy within the always-require-approval boundary.
    FullAuto,
}

impl AutonomyLevel {
    /// All levels, most restrictive first.
    pub const ALL: [AutonomyLevel; 3] = [
        AutonomyLevel::Manual,
        AutonomyLevel::SemiAuto,
        AutonomyLevel::FullAuto,
    ];
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutonomyLevel::Manual => write!(f, "manual"),
            AutonomyLevel::SemiAuto => write!(f, "semi_auto"),
            AutonomyLevel::FullAuto => write!(f, "full_auto"),
        }
    }
}

impl FromStr for AutonomyLevel {
    type Err = OverseerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "manual" => Ok(AutonomyLevel::Manual),
            "semi_auto" => Ok(AutonomyLevel::SemiAuto),
            "full_auto" => Ok(AutonomyLevel::FullAuto),
            other => Err(OverseerError::Config(format!(
                "Invalid autonomy level '{other}' (expected manual, semi_auto or full_auto)"
            ))),
        }
    }
}

/// A classified kind of side-effecting action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    /// Read a file.
    ReadFile,
    /// Create or overwrite a file.
    WriteFile,
    /// Remove a file.
    DeleteFile,
    /// Run a shell command.
    ExecuteCommand,
    /// Talk to a remote host.
    NetworkRequest,
    /// Read-only database access.
    DatabaseQuery,
    /// Database mutation.
    DatabaseWrite,
    /// Record a local commit.
    GitCommit,
    /// Publish commits to a remote.
    GitPush,
    /// Add a dependency or system package.
    InstallPackage,
    /// Change configuration files or settings.
    ModifyConfig,
    /// Take a backup or snapshot.
    CreateBackup,
    /// Overwrite live state from a backup.
    RestoreBackup,
}

impl OperationCategory {
    /// Every known category.
    pub const ALL: [OperationCategory; 13] = [
        OperationCategory::ReadFile,
        OperationCategory::WriteFile,
        OperationCategory::DeleteFile,
        OperationCategory::ExecuteCommand,
        OperationCategory::NetworkRequest,
        OperationCategory::DatabaseQuery,
        OperationCategory::DatabaseWrite,
        OperationCategory::GitCommit,
        OperationCategory::GitPush,
        OperationCategory::InstallPackage,
        OperationCategory::ModifyConfig,
        OperationCategory::CreateBackup,
        OperationCategory::RestoreBackup,
    ];

    /// Wire name, e.g. `write_file`.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationCategory::ReadFile => "read_file",
            OperationCategory::WriteFile => "write_file",
            OperationCategory::DeleteFile => "delete_file",
            OperationCategory::ExecuteCommand => "execute_command",
            OperationCategory::NetworkRequest => "network_request",
            OperationCategory::DatabaseQuery => "database_query",
            OperationCategory::DatabaseWrite => "database_write",
            OperationCategory::GitCommit => "git_commit",
            OperationCategory::GitPush => "git_push",
            OperationCategory::InstallPackage => "install_package",
            OperationCategory::ModifyConfig => "modify_config",
            OperationCategory::CreateBackup => "create_backup",
            OperationCategory::RestoreBackup => "restore_backup",
        }
    }

    /// Static risk classification of the category.
    pub fn risk(self) -> OperationRisk {
        match self {
            OperationCategory::ReadFile
            | OperationCategory::DatabaseQuery
            | OperationCategory::CreateBackup => OperationRisk::Safe,
            OperationCategory::WriteFile | OperationCategory::GitCommit => OperationRisk::Low,
            OperationCategory::ExecuteCommand
            | OperationCategory::NetworkRequest
            | OperationCategory::DatabaseWrite
            | OperationCategory::InstallPackage
            | OperationCategory::ModifyConfig => OperationRisk::Medium,
            OperationCategory::DeleteFile
            | OperationCategory::GitPush
            | OperationCategory::RestoreBackup => OperationRisk::High,
        }
    }

    /// File mutations are subject to protected-path checks.
    pub fn touches_files(self) -> bool {
        matches!(
            self,
            OperationCategory::WriteFile | OperationCategory::DeleteFile
        )
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationCategory {
    type Err = OverseerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase().replace('-', "_");
        OperationCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| OverseerError::Config(format!("Unknown operation category '{s}'")))
    }
}

/// Risk classification for operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationRisk {
    /// Read-only, no side effects.
    Safe,
    /// Reversible.
    Low,
    /// Side effects.
    Medium,
    /// Potentially destructive.
    High,
    /// Highly destructive or sensitive.
    Critical,
}

impl OperationRisk {
    /// Every risk level, safest first.
    pub const ALL: [OperationRisk; 5] = [
        OperationRisk::Safe,
        OperationRisk::Low,
        OperationRisk::Medium,
        OperationRisk::High,
        OperationRisk::Critical,
    ];

    /// Weight used by the safety score.
    pub fn weight(self) -> u32 {
        match self {
            OperationRisk::Safe => 0,
            OperationRisk::Low => 1,
            OperationRisk::Medium => 2,
            OperationRisk::High => 4,
            OperationRisk::Critical => 8,
        }
    }

    /// `high` or `critical`.
    pub fn is_high(self) -> bool {
        matches!(self, OperationRisk::High | OperationRisk::Critical)
    }
}

impl fmt::Display for OperationRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationRisk::Safe => write!(f, "safe"),
            OperationRisk::Low => write!(f, "low"),
            OperationRisk::Medium => write!(f, "medium"),
            OperationRisk::High => write!(f, "high"),
            OperationRisk::Critical => write!(f, "critical"),
        }
    }
}
