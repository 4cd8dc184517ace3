use chrono::{DateTime, Utc};
use overseer_core::{AutonomyLevel, OperationCategory, OperationRisk};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot of the controller's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyStatus {
    /// Current level.
    pub autonomy_level: AutonomyLevel,
    /// Approved at the current level.
    pub approved_operations: Vec<OperationCategory>,
    /// Gated at every level.
    pub always_require_approval: Vec<OperationCategory>,
    /// How many known categories fall under each risk class.
    pub operation_count_by_risk: BTreeMap<OperationRisk, usize>,
}

/// Risk summary of the categories approved at the current level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    /// Level the report was taken at.
    pub autonomy_level: AutonomyLevel,
    /// Size of the approved set.
    pub total_approved_operations: usize,
    /// Approved categories with high or critical risk.
    pub high_risk_operations: Vec<OperationCategory>,
    /// 0 to 100, higher is safer.
    pub safety_score: u32,
    /// Suggested tightening, if any.
    pub recommendations: Vec<String>,
    /// When the report was built.
    pub timestamp: DateTime<Utc>,
}

/// `100 - floor(100 * sum(weights) / (8 * n))`, or 100 for an empty set.
pub fn safety_score(approved: &BTreeSet<OperationCategory>) -> u32 {
    if approved.is_empty() {
        return 100;
    }
    let total: u32 = approved.iter().map(|op| op.risk().weight()).sum();
    let max = approved.len() as u32 * OperationRisk::Critical.weight();
    100u32.saturating_sub(total * 100 / max)
}

pub(crate) fn recommendations(
    level: AutonomyLevel,
    approved: &BTreeSet<OperationCategory>,
) -> Vec<String> {
    let mut out = Vec::new();
    let high_risk = approved.iter().any(|op| op.risk().is_high());

    if high_risk && level == AutonomyLevel::FullAuto {
        out.push("Consider switching to semi_auto mode due to approved high-risk operations".into());
    }
    if approved.contains(&OperationCategory::DeleteFile) {
        out.push("delete_file is approved - ensure the backup system is active".into());
    }
    if approved.contains(&OperationCategory::GitPush) {
        out.push("git_push is approved - ensure proper branch protection is configured".into());
    }
    if out.is_empty() {
        out.push("Current configuration appears safe".into());
    }
    out
}

pub(crate) fn count_by_risk() -> BTreeMap<OperationRisk, usize> {
    let mut counts: BTreeMap<OperationRisk, usize> =
        OperationRisk::ALL.into_iter().map(|r| (r, 0)).collect();
    for op in OperationCategory::ALL {
        *counts.entry(op.risk()).or_default() += 1;
    }
    counts
}
