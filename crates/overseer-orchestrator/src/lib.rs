//! Task orchestration for the Overseer core.
//!
//! Accepts tasks addressed to named agents, holds them for approval when the
//! autonomy policy asks for a human, releases them once their dependencies
//! have completed, and runs them on a bounded worker pool in priority order.
//! Aggregate state is written to the workspace after every change.
//!
//! # Main types
//!
//! - [`Orchestrator`] - Cloneable handle to the dispatcher actor.
//! - [`OrchestratorConfig`] - Worker pool size, monitor interval, history and approval limits.
//! - [`TaskSubmission`] - Builder for a task to submit.
//! - [`TaskRecord`] - A task's lifecycle as seen by the orchestrator.
//! - [`Scheduler`] - Synchronous queue, dependency and approval bookkeeping.
//! - [`OrchestratorStateDocument`] - The persisted orchestrator document.

/// Orchestrator configuration.
pub mod config;
/// Dispatcher actor and the public handle.
pub mod engine;
mod monitor;
/// The orchestrator state document and its background writer.
pub mod persistence;
/// Task lifecycle bookkeeping.
pub mod scheduler;
/// Ready queue and dependency graph.
pub mod task_queue;
/// Submission, record and status types.
pub mod types;

pub use config::OrchestratorConfig;
pub use engine::Orchestrator;
pub use persistence::OrchestratorStateDocument;
pub use scheduler::{Scheduler, APPROVAL_TIMEOUT_REASON, INTERRUPTED_ERROR};
pub use task_queue::{DependencyGraph, ReadyQueue};
pub use types::{AgentSummary, OrchestratorStatus, TaskCounts, TaskRecord, TaskSubmission};
