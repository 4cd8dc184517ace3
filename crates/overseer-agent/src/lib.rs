//! Agent runtime: lifecycle, bounded histories and persistence around a
//! domain-specific [`Worker`].

/// Task requests, results and the persisted agent record.
pub mod record;
/// The agent lifecycle wrapper.
pub mod runtime;
/// On-disk current state and snapshot trail.
pub mod store;
/// The trait implemented by domain workers.
pub mod worker;

pub use record::{AgentRecord, AgentStatus, HealthReport, ResultStatus, TaskRequest, TaskResult};
pub use runtime::AgentRuntime;
pub use store::AgentStore;
pub use worker::{ProgressReporter, Recovery, Worker};
