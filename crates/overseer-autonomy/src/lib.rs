//! Autonomy policy for the Overseer orchestration core.
//!
//! Decides whether an operation may run unattended under the current
//! autonomy level, and reports how risky the approved set is.
//!
//! # Main types
//!
//! - [`AutonomyController`] - Persisted policy plus the approval decision procedure.
//! - [`AutonomyPolicy`] - Level, per-level approved categories and the always-require boundary.
//! - [`OperationContext`] - Optional per-call facts (target path, forced approval).
//! - [`SafetyReport`] - Risk summary of the currently approved categories.

/// The controller and its persisted policy document.
pub mod controller;
/// Per-call context for approval decisions.
pub mod context;
/// Status and safety reporting.
pub mod report;

pub use context::OperationContext;
pub use controller::{AutonomyController, AutonomyPolicy};
pub use report::{AutonomyStatus, SafetyReport};
