use crate::context::OperationContext;
use crate::report::{self, AutonomyStatus, SafetyReport};
use chrono::{DateTime, Utc};
use overseer_core::storage::{read_json, write_json_atomic};
use overseer_core::{AutonomyLevel, OperationCategory, OverseerResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// The persisted autonomy configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyPolicy {
    /// Level the decision procedure runs at.
    pub autonomy_level: AutonomyLevel,
    /// Categories that run without approval, per level.
    pub approved_categories: BTreeMap<AutonomyLevel, BTreeSet<OperationCategory>>,
    /// Categories that need approval at every level.
    pub always_require_approval: BTreeSet<OperationCategory>,
    /// Time of the last mutation.
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for AutonomyPolicy {
    fn default() -> Self {
        use OperationCategory::*;

        let semi_auto: BTreeSet<_> =
            [ReadFile, WriteFile, ExecuteCommand, DatabaseQuery, CreateBackup].into();
        let mut full_auto = semi_auto.clone();
        full_auto.extend([DeleteFile, NetworkRequest, DatabaseWrite, GitCommit, ModifyConfig]);

        Self {
            autonomy_level: AutonomyLevel::SemiAuto,
            approved_categories: BTreeMap::from([
                (AutonomyLevel::Manual, BTreeSet::new()),
                (AutonomyLevel::SemiAuto, semi_auto),
                (AutonomyLevel::FullAuto, full_auto),
            ]),
            always_require_approval: [GitPush, RestoreBackup].into(),
            last_updated: Utc::now(),
        }
    }
}

impl AutonomyPolicy {
    /// Categories approved at the current level.
    pub fn approved(&self) -> BTreeSet<OperationCategory> {
        self.approved_categories
            .get(&self.autonomy_level)
            .cloned()
            .unwrap_or_default()
    }

    /// The approval decision procedure. Context checks only run when a
    /// context is supplied.
    pub fn requires_approval(
        &self,
        operation: OperationCategory,
        context: Option<&OperationContext>,
    ) -> bool {
        if self.always_require_approval.contains(&operation) {
            return true;
        }
        if self.autonomy_level == AutonomyLevel::Manual {
            return true;
        }
        let approved = self
            .approved_categories
            .get(&self.autonomy_level)
            .is_some_and(|set| set.contains(&operation));
        if !approved {
            return true;
        }

        if let Some(ctx) = context {
            if self.autonomy_level == AutonomyLevel::SemiAuto && operation.risk().is_high() {
                return true;
            }
            if ctx.force_approval {
                return true;
            }
            if operation.touches_files() && ctx.touches_protected_path() {
                return true;
            }
        }

        false
    }
}

/// Holds the autonomy policy and answers "does this need a human?".
///
/// Every mutation is written to `<workspace>/state/autonomy_config.json`
/// before the call returns.
pub struct AutonomyController {
    config_file: PathBuf,
    created: bool,
    policy: RwLock<AutonomyPolicy>,
    save_lock: tokio::sync::Mutex<()>,
}

impl AutonomyController {
    /// `<workspace>/state/autonomy_config.json`.
    pub fn config_path(workspace_dir: &Path) -> PathBuf {
        workspace_dir.join("state").join("autonomy_config.json")
    }

    /// Load the policy from the workspace.
    ///
    /// A missing document is created with defaults. A corrupt one is left
    /// on disk and the defaults are used in memory.
    pub async fn load(workspace_dir: &Path) -> OverseerResult<Self> {
        let config_file = Self::config_path(workspace_dir);

        let (policy, write_defaults) = match read_json::<AutonomyPolicy>(&config_file).await {
            Ok(Some(policy)) => {
                debug!(level = %policy.autonomy_level, "Loaded autonomy config");
                (policy, false)
            }
            Ok(None) => (AutonomyPolicy::default(), true),
            Err(e) => {
                error!(path = %config_file.display(), error = %e, "Failed to load autonomy config");
                (AutonomyPolicy::default(), false)
            }
        };

        let controller = Self {
            config_file,
            created: write_defaults,
            policy: RwLock::new(policy),
            save_lock: tokio::sync::Mutex::new(()),
        };
        if write_defaults {
            controller.save().await?;
        }
        Ok(controller)
    }

    /// True when [`load`](Self::load) found no document and wrote the
    /// defaults.
    pub fn created_defaults(&self) -> bool {
        self.created
    }

    /// Re-read the policy document, e.g. after a snapshot restore replaced
    /// it. A missing or unreadable document leaves the in-memory policy as is.
    pub async fn reload(&self) -> OverseerResult<AutonomyLevel> {
        let _guard = self.save_lock.lock().await;
        match read_json::<AutonomyPolicy>(&self.config_file).await {
            Ok(Some(policy)) => {
                let level = policy.autonomy_level;
                *self.policy.write() = policy;
                info!(%level, "Autonomy config reloaded");
            }
            Ok(None) => {
                warn!(path = %self.config_file.display(), "Autonomy config missing on reload");
            }
            Err(e) => {
                error!(path = %self.config_file.display(), error = %e, "Failed to reload autonomy config");
            }
        }
        Ok(self.level())
    }

    /// Current autonomy level.
    pub fn level(&self) -> AutonomyLevel {
        self.policy.read().autonomy_level
    }

    /// A copy of the whole policy.
    pub fn policy(&self) -> AutonomyPolicy {
        self.policy.read().clone()
    }

    /// Whether `operation` needs a human under the current policy.
    /// See [`AutonomyPolicy::requires_approval`].
    pub fn requires_approval(
        &self,
        operation: OperationCategory,
        context: Option<&OperationContext>,
    ) -> bool {
        self.policy.read().requires_approval(operation, context)
    }

    /// Change the level and persist the policy.
    pub async fn set_level(&self, level: AutonomyLevel) -> OverseerResult<()> {
        let old = self.mutate(|p| std::mem::replace(&mut p.autonomy_level, level)).await?;
        info!(from = %old, to = %level, "Autonomy level changed");
        Ok(())
    }

    /// Add `operation` to the current level's approved set. Returns an
    /// approval id for the audit trail.
    pub async fn approve_operation(
        &self,
        operation: OperationCategory,
        reason: &str,
    ) -> OverseerResult<String> {
        let level = self
            .mutate(|p| {
                let level = p.autonomy_level;
                p.approved_categories.entry(level).or_default().insert(operation);
                level
            })
            .await?;

        let approval_id = format!(
            "approval_{}_{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        info!(%approval_id, %operation, %level, reason, "Operation approved");
        Ok(approval_id)
    }

    /// Remove `operation` from the current level's approved set.
    pub async fn revoke_approval(&self, operation: OperationCategory) -> OverseerResult<()> {
        let level = self
            .mutate(|p| {
                let level = p.autonomy_level;
                if let Some(set) = p.approved_categories.get_mut(&level) {
                    set.remove(&operation);
                }
                level
            })
            .await?;
        info!(%operation, %level, "Operation approval revoked");
        Ok(())
    }

    /// Categories approved at the current level.
    pub fn approved_operations(&self) -> Vec<OperationCategory> {
        self.policy.read().approved().into_iter().collect()
    }

    /// Level, approved set and the always-require boundary.
    pub fn status(&self) -> AutonomyStatus {
        let policy = self.policy.read();
        AutonomyStatus {
            autonomy_level: policy.autonomy_level,
            approved_operations: policy.approved().into_iter().collect(),
            always_require_approval: policy.always_require_approval.iter().copied().collect(),
            operation_count_by_risk: report::count_by_risk(),
        }
    }

    /// Score and recommendations for the current approved set.
    pub fn safety_report(&self) -> SafetyReport {
        let policy = self.policy.read();
        let approved = policy.approved();
        SafetyReport {
            autonomy_level: policy.autonomy_level,
            total_approved_operations: approved.len(),
            high_risk_operations: approved
                .iter()
                .copied()
                .filter(|op| op.risk().is_high())
                .collect(),
            safety_score: report::safety_score(&approved),
            recommendations: report::recommendations(policy.autonomy_level, &approved),
            timestamp: Utc::now(),
        }
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut AutonomyPolicy) -> R) -> OverseerResult<R> {
        let _guard = self.save_lock.lock().await;
        let (out, snapshot) = {
            let mut policy = self.policy.write();
            let out = f(&mut policy);
            policy.last_updated = Utc::now();
            (out, policy.clone())
        };
        write_json_atomic(&self.config_file, &snapshot).await?;
        Ok(out)
    }

    async fn save(&self) -> OverseerResult<()> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.policy.read().clone();
        write_json_atomic(&self.config_file, &snapshot).await
    }
}
