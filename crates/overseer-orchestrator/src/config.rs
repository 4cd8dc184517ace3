use overseer_core::AutonomyLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator tuning, deserialized from the `[orchestrator]` table of
/// `overseer.toml` or built in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Level written to a workspace that has no autonomy policy yet. An
    /// existing policy document keeps its own level.
    #[serde(default)]
    pub autonomy_level: AutonomyLevel,
    /// Worker pool size.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Seconds between health checks, heartbeats and expiry sweeps.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Terminal tasks kept in memory and in the state document.
    #[serde(default = "default_completed_history_limit")]
    pub completed_history_limit: usize,
    /// Pending approvals older than this are cancelled. Unset means never.
    #[serde(default)]
    pub approval_timeout_secs: Option<u64>,
    /// Give workers' recovery hooks a chance after a failure.
    #[serde(default = "default_auto_recover")]
    pub auto_recover: bool,
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_monitor_interval_secs() -> u64 {
    30
}

fn default_completed_history_limit() -> usize {
    100
}

fn default_auto_recover() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            autonomy_level: AutonomyLevel::default(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            monitor_interval_secs: default_monitor_interval_secs(),
            completed_history_limit: default_completed_history_limit(),
            approval_timeout_secs: None,
            auto_recover: default_auto_recover(),
        }
    }
}

impl OrchestratorConfig {
    /// Set the seed autonomy level.
    pub fn with_autonomy_level(mut self, level: AutonomyLevel) -> Self {
        self.autonomy_level = level;
        self
    }

    /// Set the worker pool size.
    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    /// Set the monitor interval, rounded down to whole seconds (at least one).
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval_secs = interval.as_secs().max(1);
        self
    }

    /// Set the history bound.
    pub fn with_completed_history_limit(mut self, limit: usize) -> Self {
        self.completed_history_limit = limit;
        self
    }

    /// Expire pending approvals after `timeout`.
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Toggle recovery hooks.
    pub fn with_auto_recover(mut self, enabled: bool) -> Self {
        self.auto_recover = enabled;
        self
    }

    /// Worker pool size, never below one.
    pub fn worker_slots(&self) -> usize {
        self.max_concurrent_tasks.max(1)
    }

    /// Monitor interval, never below one second.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    /// Approval timeout, if configured.
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }
}
